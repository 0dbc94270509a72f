use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use test_env_log::test;

use super::alloc::Heap;
use crate::value::{Builtin, BuiltinPayload, Object, RefTarget, Str, Table, TableKey, Value};
use crate::vm::VmConfig;

fn heap_with_threshold(gc_threshold: usize) -> Heap {
    Heap::new(&VmConfig {
        gc_threshold,
        ..VmConfig::default()
    })
}

fn str_obj(heap: &mut Heap, s: &str) -> Value {
    heap.alloc_str(s)
}

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn test_collect_frees_exactly_unreachable() {
    let mut heap = heap_with_threshold(1024);

    let kept = str_obj(&mut heap, "kept");
    heap.push(kept).unwrap();
    let element = str_obj(&mut heap, "element");
    let array = heap.alloc(Object::Array(vec![element]));
    heap.globals[0] = Value::Object(array);
    for i in 0..5 {
        str_obj(&mut heap, &format!("garbage {}", i));
    }
    assert_eq!(heap.live_count(), 8);

    assert_eq!(heap.collect(), 5);
    assert_eq!(heap.live_count(), 3);
    assert!(heap.contains(kept.as_object().unwrap()));
    assert!(heap.contains(array));
    assert!(heap.contains(element.as_object().unwrap()));

    assert_eq!(heap.collect(), 0, "nothing new became garbage");
    let stats = heap.stats();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.objects_freed, 5);
    assert_eq!(stats.last_freed_count, 0);
    assert_eq!(stats.last_marked_count, 3);
    assert_eq!(stats.live_objects, 3);
}

#[test]
fn test_unreachable_cycle_is_freed() {
    let mut heap = heap_with_threshold(1024);
    let a = heap.alloc(Object::Array(vec![]));
    let b = heap.alloc(Object::Array(vec![Value::Object(a)]));
    if let Object::Array(items) = heap.object_mut(a) {
        items.push(Value::Object(b));
    }

    heap.push(Value::Object(a)).unwrap();
    assert_eq!(heap.collect(), 0);

    heap.stack.clear();
    assert_eq!(heap.collect(), 2);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn test_struct_keys_and_values_are_traced() {
    let mut heap = heap_with_threshold(1024);
    let name = heap.alloc(Object::Str(Str::new("x")));
    let value = str_obj(&mut heap, "value");
    let mut table = Table::new();
    if let Object::Str(s) = heap.object(name) {
        table.set(TableKey::new(name, s), value);
    }
    let st = heap.alloc(Object::Struct(table));
    heap.root(st);

    assert_eq!(heap.collect(), 0);
    assert_eq!(heap.live_count(), 3);

    heap.unroot(1);
    assert_eq!(heap.collect(), 3);
}

#[test]
fn test_element_ref_keeps_array_alive() {
    let mut heap = heap_with_threshold(1024);
    let array = heap.alloc(Object::Array(vec![Value::Number(1.0)]));
    let r = heap.alloc(Object::Ref(RefTarget::Element(array, 0)));
    heap.push(Value::Object(r)).unwrap();

    assert_eq!(heap.collect(), 0);
    assert_eq!(
        heap.actual_value(Value::Object(r)).unwrap(),
        Value::Number(1.0)
    );
}

#[test]
fn test_slot_ref_keeps_slot_value_alive() {
    let mut heap = heap_with_threshold(1024);
    let s = str_obj(&mut heap, "in a global");
    heap.globals[3] = s;
    let r = heap.alloc(Object::Ref(RefTarget::Global(3)));
    heap.root(r);

    assert_eq!(heap.collect(), 0);
    assert_eq!(heap.display(Value::Object(r)), "in a global");
}

#[test]
fn test_native_data_destructor_runs_on_sweep() {
    let mut heap = heap_with_threshold(1024);
    let dropped = Rc::new(Cell::new(false));
    heap.alloc(Object::Builtin(Builtin {
        name: None,
        payload: BuiltinPayload::Data(Box::new(DropFlag(dropped.clone()))),
    }));

    assert!(!dropped.get());
    assert_eq!(heap.collect(), 1);
    assert!(dropped.get());
}

#[test]
fn test_allocation_triggers_collection() {
    let mut heap = heap_with_threshold(4);
    for i in 0..10 {
        str_obj(&mut heap, &format!("{}", i));
    }
    assert_eq!(heap.stats().collections, 2);
    assert_eq!(heap.stats().objects_freed, 8);
    assert_eq!(heap.live_count(), 2);
}

#[test]
fn test_threshold_grows_with_survivors() {
    let mut heap = heap_with_threshold(2);
    for i in 0..6 {
        let s = str_obj(&mut heap, &format!("{}", i));
        heap.push(s).unwrap();
    }
    heap.collect();
    assert_eq!(heap.max_count, 12);
}

#[test]
fn test_shutdown_frees_everything() {
    let mut heap = heap_with_threshold(1024);
    let s = str_obj(&mut heap, "on the stack");
    heap.push(s).unwrap();
    let g = str_obj(&mut heap, "in a global");
    heap.globals[0] = g;
    let pinned = heap.alloc(Object::Array(vec![]));
    heap.root(pinned);

    assert_eq!(heap.shutdown(), 3);
    assert_eq!(heap.live_count(), 0);
    assert!(heap.stack().is_empty());
    assert_eq!(heap.global(0), Some(Value::Nil));
}
