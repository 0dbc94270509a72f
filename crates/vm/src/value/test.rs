use pretty_assertions::assert_eq;
use test_env_log::test;

use super::{ObjectRef, Str, Table, TableKey, Value};

fn key(name: &str) -> TableKey {
    TableKey::new(ObjectRef::default(), &Str::new(name))
}

#[test]
fn test_truthiness() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(!Value::Number(0.0).is_truthy());
    assert!(!Value::Number(-0.0).is_truthy());

    assert!(Value::Bool(true).is_truthy());
    assert!(Value::Number(0.5).is_truthy());
    assert!(Value::Number(f64::NAN).is_truthy());
    assert!(Value::Object(ObjectRef::default()).is_truthy());
}

#[test]
fn test_table_set_get() {
    let mut table = Table::new();
    assert_eq!(table.get(&key("x")), None);

    assert!(table.set(key("x"), Value::Number(1.0)));
    assert!(table.set(key("y"), Value::Bool(true)));
    assert!(!table.set(key("x"), Value::Number(2.0)), "overwrite is not an insert");

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(&key("x")), Some(Value::Number(2.0)));
    assert_eq!(table.get_str("y"), Some(Value::Bool(true)));
    assert!(table.find(&key("y")));
    assert!(!table.find(&key("z")));
}

#[test]
fn test_table_delete_leaves_other_keys_reachable() {
    let mut table = Table::new();
    let names = ["a", "b", "c", "d", "e"];
    for (i, name) in names.iter().enumerate() {
        table.set(key(name), Value::Number(i as f64));
    }

    assert!(table.delete(&key("b")));
    assert!(!table.delete(&key("b")), "already deleted");
    assert_eq!(table.get(&key("b")), None);
    assert_eq!(table.len(), 4);

    for (i, name) in names.iter().enumerate().filter(|(_, n)| **n != "b") {
        assert_eq!(table.get(&key(name)), Some(Value::Number(i as f64)), "{}", name);
    }

    // Reinserting after a delete reuses the tombstone.
    assert!(table.set(key("b"), Value::Nil));
    assert_eq!(table.get(&key("b")), Some(Value::Nil));
    assert_eq!(table.len(), 5);
}

#[test]
fn test_table_growth_keeps_entries() {
    let mut table = Table::new();
    table.set(key("first"), Value::Nil);
    assert_eq!(table.capacity(), 8);

    for i in 0..100 {
        table.set(key(&format!("k{}", i)), Value::Number(i as f64));
        assert!(
            table.len() * 4 <= table.capacity() * 3,
            "load factor exceeded at {} entries",
            table.len()
        );
    }
    assert!(table.capacity().is_power_of_two());
    assert_eq!(table.len(), 101);
    for i in 0..100 {
        assert_eq!(
            table.get(&key(&format!("k{}", i))),
            Some(Value::Number(i as f64))
        );
    }
    assert_eq!(table.iter().count(), 101);
}

#[test]
fn test_table_tombstones_count_towards_load() {
    let mut table = Table::new();
    for i in 0..6 {
        table.set(key(&format!("k{}", i)), Value::Nil);
    }
    for i in 0..6 {
        table.delete(&key(&format!("k{}", i)));
    }
    assert!(table.is_empty());

    // 6 tombstones in 8 slots: the next insert must grow and drop them.
    table.set(key("fresh"), Value::Bool(true));
    assert_eq!(table.capacity(), 16);
    assert_eq!(table.get_str("fresh"), Some(Value::Bool(true)));
    assert_eq!(table.len(), 1);
}
