//! A parse, compile and run session over one virtual machine.
//!
//! A session keeps its compiler's globals and its VM's heap between inputs,
//! so it can be fed a whole file at once or one REPL line at a time.

pub mod diagnostic;

#[cfg(test)]
mod test;

use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

use quill_bytecode::Program;
use quill_codegen::error::CompileError;
use quill_codegen::Compiler;
use quill_syn::ast;
use quill_syn::parse::ParseError;
use quill_vm::{BuiltinRegistry, RuntimeError, Value, VirtualMachine, VmConfig};
use tracing::debug;

/// Exit status for input that fails to parse or compile.
pub const EXIT_COMPILE_ERROR: i32 = 65;
/// Exit status for a program that fails at run time.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Debug)]
pub enum SessionError {
    Parse(Vec<ParseError>),
    Compile(Vec<CompileError>),
    Runtime(RuntimeError),
}

impl SessionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Parse(_) | SessionError::Compile(_) => EXIT_COMPILE_ERROR,
            SessionError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }

    /// Render every error, pointing into `src` where a location is known.
    pub fn render(&self, src: &str, file: &str) -> String {
        let mut out = String::new();
        match self {
            SessionError::Parse(errors) => {
                for e in errors {
                    out += &diagnostic::render(src, file, "error", &e.to_string(), e.span.clone());
                }
            }
            SessionError::Compile(errors) => {
                for e in errors {
                    let message = match &e.message {
                        Some(msg) => format!("{} [{}]", msg, e.id),
                        None => e.id.to_string(),
                    };
                    let level = if e.is_fatal() { "error" } else { "warning" };
                    out += &diagnostic::render(src, file, level, &message, e.span.clone());
                }
            }
            SessionError::Runtime(e) => {
                let _ = writeln!(out, "runtime error: {}", e);
            }
        }
        out
    }
}

impl From<RuntimeError> for SessionError {
    fn from(e: RuntimeError) -> Self {
        SessionError::Runtime(e)
    }
}

pub struct Session {
    registry: Rc<RefCell<BuiltinRegistry>>,
    compiler: Compiler,
    vm: VirtualMachine,
}

impl Session {
    /// A session with the standard builtins.
    pub fn new(config: VmConfig) -> Self {
        Self::with_registry(config, BuiltinRegistry::with_std())
    }

    pub fn with_registry(config: VmConfig, registry: BuiltinRegistry) -> Self {
        let registry = Rc::new(RefCell::new(registry));
        Session {
            vm: VirtualMachine::new(config, registry.clone()),
            registry,
            compiler: Compiler::new(),
        }
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VirtualMachine {
        &mut self.vm
    }

    pub fn parse(&self, src: &str) -> Result<ast::Program, SessionError> {
        let (program, errors) = quill_syn::parse(src);
        if errors.is_empty() {
            Ok(program)
        } else {
            Err(SessionError::Parse(errors))
        }
    }

    pub fn compile(&mut self, src: &str) -> Result<Program, SessionError> {
        let ast = self.parse(src)?;
        self.compiler
            .compile(&ast, &mut *self.registry.borrow_mut())
            .map_err(SessionError::Compile)
    }

    /// Compile and run `src`. Returns the value of a top-level `return`.
    pub fn run(&mut self, src: &str) -> Result<Option<Value>, SessionError> {
        let program = self.compile(src)?;
        debug!(globals = program.globals.len(), "compiled input");
        Ok(self.vm.run(&program)?)
    }

    /// Disassembly of a compiled program, with builtin names resolved.
    pub fn disassemble(&self, program: &Program) -> String {
        program.main.disassemble(self.registry.borrow().names())
    }

    /// The current value of a global, by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        let slot = self.compiler.globals().iter().position(|g| g == name)?;
        self.vm.global(slot)
    }

    pub fn display(&self, v: Value) -> String {
        self.vm.display(v)
    }
}
