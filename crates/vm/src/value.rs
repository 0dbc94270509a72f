mod ops;
mod table;
#[cfg(test)]
mod test;

use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::Hasher;
use std::rc::Rc;

use fnv::FnvHasher;
use smol_str::SmolStr;

use crate::builtin::NativeFn;
use crate::gc::{GcTracer, Trace};

pub use table::{Table, TableKey};

slotmap::new_key_type! {
    /// Handle of an object owned by the [`Heap`](crate::gc::alloc::Heap).
    pub struct ObjectRef;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Number(f64),
    Bool(bool),
    Object(ObjectRef),
}

static_assertions::assert_eq_size!(Value, [u64; 2]);

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl Value {
    /// Returns `true` if the val is [`Nil`].
    ///
    /// [`Nil`]: Value::Nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Convert this value to boolean.
    ///
    /// The only falsy values are `nil`, `false` and `0`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false)) && self.as_number() != Some(0.0)
    }

    pub fn as_number(&self) -> Option<f64> {
        if let Self::Number(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        if let Self::Object(v) = self {
            Some(*v)
        } else {
            None
        }
    }
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn GcTracer) {
        if let Value::Object(r) = self {
            tracer.trace(*r)
        }
    }
}

/// Hash used for string keys.
pub fn hash_str(s: &str) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(s.as_bytes());
    hasher.finish() as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Str {
    pub text: SmolStr,
    pub hash: u32,
}

impl Str {
    pub fn new(text: impl Into<SmolStr>) -> Self {
        let text = text.into();
        let hash = hash_str(&text);
        Str { text, hash }
    }
}

/// A function loaded into the heap.
#[derive(Debug, Clone)]
pub struct FunctionObject {
    pub name: Option<SmolStr>,
    /// The function whose body defines this one. Upvalues live in its frames.
    pub enclosing: Option<ObjectRef>,
    pub code: Rc<[i32]>,
    pub constants: Rc<[Value]>,
    pub param_count: u32,
    pub local_count: u32,
}

/// Where a reference points. A reference never owns its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefTarget {
    Global(usize),
    /// Absolute index into the value stack
    Stack(usize),
    /// An element of an array
    Element(ObjectRef, usize),
}

pub enum BuiltinPayload {
    Function(NativeFn),
    /// Opaque native data. Dropped when the object is swept.
    Data(Box<dyn Any>),
    /// A plain value exposed under a builtin name
    Value(Value),
}

impl Debug for BuiltinPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinPayload::Function(func) => write!(f, "Function({:p})", *func as *const ()),
            BuiltinPayload::Data(_) => f.write_str("Data(..)"),
            BuiltinPayload::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

#[derive(Debug)]
pub struct Builtin {
    pub name: Option<SmolStr>,
    pub payload: BuiltinPayload,
}

#[derive(Debug)]
pub enum Object {
    Str(Str),
    Array(Vec<Value>),
    Struct(Table),
    Ref(RefTarget),
    Function(FunctionObject),
    Builtin(Builtin),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Str(_) => "string",
            Object::Array(_) => "array",
            Object::Struct(_) => "struct",
            Object::Ref(_) => "ref",
            Object::Function(_) => "function",
            Object::Builtin(_) => "builtin",
        }
    }

    pub fn as_str(&self) -> Option<&Str> {
        if let Object::Str(s) = self {
            Some(s)
        } else {
            None
        }
    }
}

impl Trace for Object {
    /// Slot references are traced by the collector, which knows the slots.
    fn trace(&self, tracer: &mut dyn GcTracer) {
        match self {
            Object::Str(_) => {}
            Object::Array(items) => items.iter().for_each(|v| v.trace(tracer)),
            Object::Struct(table) => table.trace(tracer),
            Object::Ref(RefTarget::Element(array, _)) => tracer.trace(*array),
            Object::Ref(_) => {}
            Object::Function(f) => {
                f.constants.iter().for_each(|v| v.trace(tracer));
                if let Some(enclosing) = f.enclosing {
                    tracer.trace(enclosing)
                }
            }
            Object::Builtin(b) => {
                if let BuiltinPayload::Value(v) = &b.payload {
                    v.trace(tracer)
                }
            }
        }
    }
}
