use slotmap::SlotMap;
use tracing::trace;

use super::GcStats;
use crate::error::RuntimeError;
use crate::value::{Builtin, BuiltinPayload, Object, ObjectRef, RefTarget, Str, Value};
use crate::vm::frame::CallFrame;
use crate::vm::VmConfig;

/// Longest chain of references followed before giving up.
const MAX_REF_HOPS: usize = 64;

/// An object together with its collector metadata.
#[derive(Debug)]
pub struct HeapObject {
    pub(crate) marked: bool,
    pub object: Object,
}

/// Owner of every object and of the VM's root set.
///
/// Objects are stored in a generation-checked arena, so a handle to a freed
/// object is detected instead of aliasing a newer one. The value stack, the
/// call-frame stack and the global slots have fixed capacities; exceeding one
/// is a [`RuntimeError::StackOverflow`].
pub struct Heap {
    pub(crate) objects: SlotMap<ObjectRef, HeapObject>,

    pub(crate) stack: Vec<Value>,
    stack_capacity: usize,
    pub(crate) frames: Vec<CallFrame>,
    frame_capacity: usize,
    pub(crate) globals: Vec<Value>,

    /// Objects pinned while a multi-step allocation is in progress.
    pub(crate) temp_roots: Vec<ObjectRef>,
    /// Objects created for builtins, indexed by builtin index.
    pub(crate) builtin_cache: Vec<Option<ObjectRef>>,

    /// A collection runs before an allocation once this many objects are live.
    pub(crate) max_count: usize,
    pub(crate) initial_threshold: usize,
    pub(crate) stats: GcStats,
}

impl Heap {
    pub fn new(config: &VmConfig) -> Self {
        let initial_threshold = config.gc_threshold.max(1);
        Heap {
            objects: SlotMap::with_key(),
            stack: Vec::with_capacity(config.stack_capacity.min(1024)),
            stack_capacity: config.stack_capacity,
            frames: Vec::new(),
            frame_capacity: config.frame_capacity,
            globals: vec![Value::Nil; config.global_capacity],
            temp_roots: Vec::new(),
            builtin_cache: Vec::new(),
            max_count: initial_threshold,
            initial_threshold,
            stats: GcStats::default(),
        }
    }

    /// Move `object` into the heap, collecting garbage first if the live
    /// object count reached the threshold.
    ///
    /// Everything `object` references must already be reachable from the
    /// root set, or it may be swept by that collection.
    pub fn alloc(&mut self, object: Object) -> ObjectRef {
        if self.objects.len() >= self.max_count {
            trace!(live = self.objects.len(), "allocation threshold reached");
            self.collect();
        }
        self.objects.insert(HeapObject {
            marked: false,
            object,
        })
    }

    pub fn alloc_str(&mut self, text: &str) -> Value {
        Value::Object(self.alloc(Object::Str(Str::new(text))))
    }

    pub fn get(&self, obj: ObjectRef) -> Option<&Object> {
        self.objects.get(obj).map(|e| &e.object)
    }

    pub fn get_mut(&mut self, obj: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(obj).map(|e| &mut e.object)
    }

    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.objects.contains_key(obj)
    }

    /// # Panics
    ///
    /// Panics if the object was already swept. Reachable objects never are.
    pub fn object(&self, obj: ObjectRef) -> &Object {
        match self.objects.get(obj) {
            Some(entry) => &entry.object,
            None => panic!("dangling object handle {:?}: reachable object was swept", obj),
        }
    }

    /// # Panics
    ///
    /// Same as [`Heap::object`].
    pub fn object_mut(&mut self, obj: ObjectRef) -> &mut Object {
        match self.objects.get_mut(obj) {
            Some(entry) => &mut entry.object,
            None => panic!("dangling object handle {:?}: reachable object was swept", obj),
        }
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Pin `obj` until the matching [`Heap::unroot`].
    pub fn root(&mut self, obj: ObjectRef) {
        self.temp_roots.push(obj);
    }

    /// Release the `count` most recently pinned objects.
    pub fn unroot(&mut self, count: usize) {
        let len = self.temp_roots.len().saturating_sub(count);
        self.temp_roots.truncate(len);
    }
}

/// Value stack
impl Heap {
    /// Lowest stack index the current frame may pop: its base plus its locals.
    pub fn floor(&self) -> usize {
        self.frames
            .last()
            .map(|f| f.stack_base + f.local_count)
            .unwrap_or(0)
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.stack_capacity {
            return Err(RuntimeError::StackOverflow("value stack"));
        }
        self.stack.push(v);
        Ok(())
    }

    /// Push `count` nils at once.
    pub fn reserve_nils(&mut self, count: usize) -> Result<(), RuntimeError> {
        if self.stack.len() + count > self.stack_capacity {
            return Err(RuntimeError::StackOverflow("value stack"));
        }
        self.stack.resize(self.stack.len() + count, Value::Nil);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.stack.len() <= self.floor() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop `n` values at once.
    pub fn pop_n(&mut self, n: usize) -> Result<(), RuntimeError> {
        let len = self.stack.len();
        if len < self.floor() + n {
            return Err(RuntimeError::StackUnderflow);
        }
        self.stack.truncate(len - n);
        Ok(())
    }

    /// The value `depth` slots below the top, without popping it.
    pub fn peek(&self, depth: usize) -> Result<Value, RuntimeError> {
        let len = self.stack.len();
        if len < self.floor() + depth + 1 {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack[len - 1 - depth])
    }

    /// The top `n` values, bottom first.
    pub fn peek_n(&self, n: usize) -> Result<&[Value], RuntimeError> {
        let len = self.stack.len();
        if len < self.floor() + n {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(&self.stack[len - n..])
    }

    pub fn truncate_to_floor(&mut self) {
        let floor = self.floor();
        self.stack.truncate(floor);
    }

    pub(crate) fn push_frame(&mut self, frame: CallFrame) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.frame_capacity {
            return Err(RuntimeError::StackOverflow("call frames"));
        }
        self.frames.push(frame);
        Ok(())
    }
}

/// Globals and references
impl Heap {
    pub fn global(&self, slot: usize) -> Option<Value> {
        self.globals.get(slot).copied()
    }

    pub fn global_capacity(&self) -> usize {
        self.globals.len()
    }

    fn check_global(&self, slot: usize) -> Result<(), RuntimeError> {
        if slot < self.globals.len() {
            Ok(())
        } else {
            Err(RuntimeError::StackOverflow("global slots"))
        }
    }

    /// The raw value stored at a reference target.
    pub fn read_target(&self, target: RefTarget) -> Result<Value, RuntimeError> {
        match target {
            RefTarget::Global(slot) => self
                .globals
                .get(slot)
                .copied()
                .ok_or(RuntimeError::DanglingReference("global slot")),
            RefTarget::Stack(slot) => self
                .stack
                .get(slot)
                .copied()
                .ok_or(RuntimeError::DanglingReference("stack slot")),
            RefTarget::Element(array, idx) => match self.get(array) {
                Some(Object::Array(items)) => items
                    .get(idx)
                    .copied()
                    .ok_or(RuntimeError::DanglingReference("array element")),
                _ => Err(RuntimeError::DanglingReference("array element")),
            },
        }
    }

    fn write_target(&mut self, target: RefTarget, v: Value) -> Result<(), RuntimeError> {
        let slot = match target {
            RefTarget::Global(slot) => self.globals.get_mut(slot),
            RefTarget::Stack(slot) => self.stack.get_mut(slot),
            RefTarget::Element(array, idx) => match self.objects.get_mut(array) {
                Some(HeapObject {
                    object: Object::Array(items),
                    ..
                }) => items.get_mut(idx),
                _ => None,
            },
        };
        match slot {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(RuntimeError::DanglingReference("write through reference")),
        }
    }

    fn as_ref_target(&self, v: Value) -> Option<RefTarget> {
        match v {
            Value::Object(r) => match self.get(r) {
                Some(Object::Ref(target)) => Some(*target),
                _ => None,
            },
            _ => None,
        }
    }

    /// Follow references and unwrap builtin values until a plain value is
    /// reached.
    pub fn actual_value(&self, mut v: Value) -> Result<Value, RuntimeError> {
        for _ in 0..MAX_REF_HOPS {
            let obj = match v {
                Value::Object(obj) => obj,
                _ => return Ok(v),
            };
            v = match self.get(obj) {
                Some(Object::Ref(target)) => self.read_target(*target)?,
                Some(Object::Builtin(Builtin {
                    payload: BuiltinPayload::Value(inner),
                    ..
                })) => *inner,
                _ => return Ok(v),
            };
        }
        Err(RuntimeError::DanglingReference("reference chain is cyclic"))
    }

    /// Store into a variable slot. If the slot holds a reference, the
    /// dereferenced value is written to whatever the reference points at.
    pub fn store(&mut self, target: RefTarget, v: Value) -> Result<(), RuntimeError> {
        let mut current = target;
        for _ in 0..MAX_REF_HOPS {
            match self.as_ref_target(self.read_target(current)?) {
                Some(next) => current = next,
                None if current == target => return self.write_target(current, v),
                None => {
                    let v = self.actual_value(v)?;
                    return self.write_target(current, v);
                }
            }
        }
        Err(RuntimeError::DanglingReference("reference chain is cyclic"))
    }

    pub fn set_global(&mut self, slot: usize, v: Value) -> Result<(), RuntimeError> {
        self.check_global(slot)?;
        self.store(RefTarget::Global(slot), v)
    }
}
