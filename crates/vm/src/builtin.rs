//! Native functions and values exposed to scripts under fixed names.
//!
//! Builtins are addressed by their registration index, which the compiler
//! bakes into `OP_GET_BUILTIN`. Extension libraries add more builtins at
//! import time.
//!
//! An extension is a `cdylib` built against the same version of this crate,
//! exporting
//!
//! ```ignore
//! #[no_mangle]
//! pub extern "C" fn quill_register_builtins(registry: &mut BuiltinRegistry) {
//!     registry.register_fn("double", double).ok();
//! }
//! ```
//!
//! There is no stable ABI; a library built against another version will
//! crash.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use fnv::FnvHashMap;
use itertools::Itertools;
use quill_bytecode::builtin::{BuiltinTable, ImportError};
use quill_bytecode::Constant;
use smol_str::SmolStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::gc::alloc::Heap;
use crate::value::{Object, Value};

/// A native builtin. Receives the arguments and an output slot, and returns
/// whether it wrote a result.
pub type NativeFn = fn(&mut Heap, &mut [Value], &mut Value) -> Result<bool, RuntimeError>;

/// Name of the function an extension library must export.
pub const ENTRY_SYMBOL: &[u8] = b"quill_register_builtins";

/// The function signature extension libraries export.
///
/// `extern "C"` only keeps the symbol unmangled; the argument is a Rust type.
pub type RegisterFn = unsafe extern "C" fn(registry: &mut BuiltinRegistry);

#[derive(Debug, Clone)]
pub enum BuiltinDef {
    Function(NativeFn),
    Constant(Constant),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("builtin `{0}` is already registered")]
    Duplicate(SmolStr),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open extension `{path}`: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("extension `{path}` does not export `quill_register_builtins`: {source}")]
    MissingEntry {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("extension `{path}` registered an invalid builtin: {source}")]
    Registry {
        path: String,
        #[source]
        source: RegistryError,
    },
}

struct LoadedLibrary {
    path: String,
    // Never called into after loading, but must outlive every builtin it
    // registered.
    _library: libloading::Library,
}

#[derive(Default)]
pub struct BuiltinRegistry {
    names: Vec<SmolStr>,
    defs: Vec<BuiltinDef>,
    index: FnvHashMap<SmolStr, usize>,
    libraries: Vec<LoadedLibrary>,
    /// Set while an extension's entry runs
    loading: bool,
    /// Registrations refused while an extension was loading
    rejected: Vec<RegistryError>,
}

impl std::fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("names", &self.names)
            .field(
                "libraries",
                &self.libraries.iter().map(|l| &l.path).collect_vec(),
            )
            .finish()
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard builtins.
    pub fn with_std() -> Self {
        process_start();
        let mut registry = Self::new();
        let std_fns: [(&str, NativeFn); 6] = [
            ("print", print),
            ("println", println),
            ("sizeof", sizeof),
            ("insert", insert),
            ("erase", erase),
            ("clock", clock),
        ];
        for (name, f) in std_fns {
            // Names are distinct, registration into an empty registry cannot fail.
            let _ = registry.register_fn(name, f);
        }
        registry
    }

    /// Register a builtin. Returns its index.
    pub fn register(
        &mut self,
        name: impl Into<SmolStr>,
        def: BuiltinDef,
    ) -> Result<usize, RegistryError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            let e = RegistryError::Duplicate(name);
            if self.loading {
                self.rejected.push(e.clone());
            }
            return Err(e);
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        self.defs.push(def);
        Ok(idx)
    }

    pub fn register_fn(&mut self, name: impl Into<SmolStr>, f: NativeFn) -> Result<usize, RegistryError> {
        self.register(name, BuiltinDef::Function(f))
    }

    pub fn register_constant(
        &mut self,
        name: impl Into<SmolStr>,
        value: Constant,
    ) -> Result<usize, RegistryError> {
        self.register(name, BuiltinDef::Constant(value))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[SmolStr] {
        &self.names
    }

    pub fn get(&self, idx: usize) -> Option<(&SmolStr, &BuiltinDef)> {
        Some((self.names.get(idx)?, self.defs.get(idx)?))
    }

    pub fn is_loaded(&self, path: &str) -> bool {
        self.libraries.iter().any(|l| l.path == path)
    }

    /// Load an extension library and run its registration entry.
    ///
    /// Loading a path that is already loaded does nothing. If the library
    /// registers a name that already exists, none of its builtins are kept.
    pub fn load_library(&mut self, path: &str) -> Result<(), LoadError> {
        if self.is_loaded(path) {
            debug!(path, "extension already loaded");
            return Ok(());
        }

        let library = unsafe { libloading::Library::new(path) }.map_err(|source| {
            LoadError::Open {
                path: path.into(),
                source,
            }
        })?;

        let entry = unsafe { library.get::<RegisterFn>(ENTRY_SYMBOL) }.map_err(|source| {
            LoadError::MissingEntry {
                path: path.into(),
                source,
            }
        })?;

        let before = self.names.len();
        self.rejected.clear();
        self.loading = true;
        unsafe { entry(self) };
        self.loading = false;
        drop(entry);

        if let Some(source) = self.rejected.drain(..).next() {
            warn!(path, error = %source, "extension rejected");
            for name in self.names.drain(before..) {
                self.index.remove(&name);
            }
            self.defs.truncate(before);
            return Err(LoadError::Registry {
                path: path.into(),
                source,
            });
        }

        debug!(
            path,
            added = self.names.len() - before,
            "loaded extension library"
        );
        self.libraries.push(LoadedLibrary {
            path: path.into(),
            _library: library,
        });
        Ok(())
    }
}

impl BuiltinTable for BuiltinRegistry {
    fn builtin_names(&self) -> Vec<SmolStr> {
        self.names.clone()
    }

    fn import_library(&mut self, path: &str) -> Result<(), ImportError> {
        Ok(self.load_library(path)?)
    }
}

fn process_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<(), RuntimeError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(RuntimeError::native(format!(
            "{} expects {} arguments, got {}",
            name,
            count,
            args.len()
        )))
    }
}

/// Resolve every argument to the value it stands for.
fn deref_args(heap: &Heap, args: &mut [Value]) -> Result<(), RuntimeError> {
    for arg in args.iter_mut() {
        *arg = heap.actual_value(*arg)?;
    }
    Ok(())
}

fn array_index(name: &str, v: Value, len: usize) -> Result<usize, RuntimeError> {
    match v {
        Value::Number(n) if n.fract() == 0.0 && n >= 0.0 && (n as usize) <= len => Ok(n as usize),
        Value::Number(n) => Err(RuntimeError::IndexOutOfRange { index: n, len }),
        _ => Err(RuntimeError::native(format!(
            "{} expects a number as index",
            name
        ))),
    }
}

fn write_values(heap: &Heap, args: &[Value], newline: bool) -> Result<(), RuntimeError> {
    let text = args.iter().map(|v| heap.display(*v)).join(" ");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let res = if newline {
        writeln!(out, "{}", text)
    } else {
        write!(out, "{}", text).and_then(|_| out.flush())
    };
    res.map_err(|e| RuntimeError::native(format!("cannot write to stdout: {}", e)))
}

fn print(heap: &mut Heap, args: &mut [Value], _out: &mut Value) -> Result<bool, RuntimeError> {
    write_values(heap, args, false)?;
    Ok(false)
}

fn println(heap: &mut Heap, args: &mut [Value], _out: &mut Value) -> Result<bool, RuntimeError> {
    write_values(heap, args, true)?;
    Ok(false)
}

fn sizeof(heap: &mut Heap, args: &mut [Value], out: &mut Value) -> Result<bool, RuntimeError> {
    expect_args("sizeof", args, 1)?;
    deref_args(heap, args)?;
    let len = match args[0] {
        Value::Object(obj) => match heap.object(obj) {
            Object::Str(s) => s.text.chars().count(),
            Object::Array(items) => items.len(),
            Object::Struct(table) => table.len(),
            other => {
                return Err(RuntimeError::native(format!(
                    "sizeof expects an array, a string or a struct, got {}",
                    other.type_name()
                )))
            }
        },
        v => {
            return Err(RuntimeError::native(format!(
                "sizeof expects an array, a string or a struct, got {}",
                heap.type_name(v)
            )))
        }
    };
    *out = Value::Number(len as f64);
    Ok(true)
}

fn array_arg<'h>(
    name: &str,
    heap: &'h mut Heap,
    v: Value,
) -> Result<&'h mut Vec<Value>, RuntimeError> {
    let type_name = heap.type_name(v);
    match v {
        Value::Object(obj) => match heap.object_mut(obj) {
            Object::Array(items) => Ok(items),
            _ => Err(RuntimeError::native(format!(
                "{} expects an array, got {}",
                name, type_name
            ))),
        },
        _ => Err(RuntimeError::native(format!(
            "{} expects an array, got {}",
            name, type_name
        ))),
    }
}

/// `insert(array, index, value)`. Returns the array.
fn insert(heap: &mut Heap, args: &mut [Value], out: &mut Value) -> Result<bool, RuntimeError> {
    expect_args("insert", args, 3)?;
    let array = heap.actual_value(args[0])?;
    let index = heap.actual_value(args[1])?;
    let value = args[2];
    let items = array_arg("insert", heap, array)?;
    let idx = array_index("insert", index, items.len())?;
    items.insert(idx, value);
    *out = array;
    Ok(true)
}

/// `erase(array, index)`. Returns the removed element.
fn erase(heap: &mut Heap, args: &mut [Value], out: &mut Value) -> Result<bool, RuntimeError> {
    expect_args("erase", args, 2)?;
    deref_args(heap, args)?;
    let items = array_arg("erase", heap, args[0])?;
    let len = items.len();
    let idx = array_index("erase", args[1], len)?;
    if idx == len {
        return Err(RuntimeError::IndexOutOfRange {
            index: idx as f64,
            len,
        });
    }
    *out = items.remove(idx);
    Ok(true)
}

/// Seconds since the process started.
fn clock(_heap: &mut Heap, args: &mut [Value], out: &mut Value) -> Result<bool, RuntimeError> {
    expect_args("clock", args, 0)?;
    *out = Value::Number(process_start().elapsed().as_secs_f64());
    Ok(true)
}
