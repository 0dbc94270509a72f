pub mod error;
pub mod func;
pub mod scope;


use std::sync::Arc;

use error::CompileError;
use func::{CompileEnv, FunctionCompileCtx};
use quill_bytecode::builtin::BuiltinTable;
use quill_bytecode::Program;
use quill_syn::ast;
use scope::SymbolTable;
use smol_str::SmolStr;
use tracing::debug;

/// Compiles programs against a global scope that survives between calls, so
/// that a REPL can compile one line at a time.
#[derive(Debug, Default)]
pub struct Compiler {
    symbols: SymbolTable,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every global slot defined so far, indexed by slot.
    pub fn globals(&self) -> &[SmolStr] {
        self.symbols.globals()
    }

    /// Compile a program. On failure every error found is returned and the
    /// globals defined by this program are forgotten.
    pub fn compile(
        &mut self,
        program: &ast::Program,
        builtins: &mut dyn BuiltinTable,
    ) -> Result<Program, Vec<CompileError>> {
        let snapshot = self.symbols.snapshot_globals();
        self.symbols.begin_program();

        let mut env = CompileEnv::new(&mut self.symbols, builtins);
        let mut ctx = FunctionCompileCtx::new(&mut env, Some("<main>".into()));
        ctx.compile_stmts(&program.stmts);
        let main = ctx.finish_main();
        let errors = env.errors;

        if errors.iter().any(|e| e.is_fatal()) {
            debug!(errors = errors.len(), "compilation failed");
            self.symbols.restore_globals(snapshot);
            return Err(errors);
        }

        Ok(Program {
            main: Arc::new(main),
            globals: self.symbols.globals().to_vec(),
        })
    }
}

/// Compile a standalone program.
pub fn compile(
    program: &ast::Program,
    builtins: &mut dyn BuiltinTable,
) -> Result<Program, Vec<CompileError>> {
    Compiler::new().compile(program, builtins)
}
