pub mod builtin;
pub mod error;
pub mod gc;
pub mod value;
pub mod vm;

pub use builtin::{BuiltinDef, BuiltinRegistry, LoadError, NativeFn, RegistryError};
pub use error::RuntimeError;
pub use gc::alloc::Heap;
pub use gc::GcStats;
pub use value::{Object, ObjectRef, Value};
pub use vm::{VirtualMachine, VmConfig};
