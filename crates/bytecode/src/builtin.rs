//! The view of the builtin registry the compiler works against.
//!
//! Builtins are addressed by a stable index. The registry behind this trait
//! lives in the VM crate; the compiler only needs names and the ability to
//! pull more names in from an extension library.

use smol_str::SmolStr;

pub type ImportError = Box<dyn std::error::Error + Send + Sync>;

pub trait BuiltinTable {
    /// Names of every registered builtin. A name's position is its index.
    fn builtin_names(&self) -> Vec<SmolStr>;

    /// Load the extension library at `path` and register its builtins.
    /// Loading a library that is already loaded is a no-op.
    fn import_library(&mut self, path: &str) -> Result<(), ImportError>;
}

/// A fixed list of names that refuses imports. Handy for compiling without a VM.
impl BuiltinTable for Vec<SmolStr> {
    fn builtin_names(&self) -> Vec<SmolStr> {
        self.clone()
    }

    fn import_library(&mut self, path: &str) -> Result<(), ImportError> {
        Err(format!("cannot import `{}`: no extension loader available", path).into())
    }
}
