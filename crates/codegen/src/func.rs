use std::sync::Arc;

use fnv::FnvHashMap;
use quill_bytecode::builtin::BuiltinTable;
use quill_bytecode::inst::{Inst, InstContainerMut};
use quill_bytecode::{Constant, Function};
use quill_syn::ast::{
    BinaryOp, Block, Expr, ExprKind, FunctionLiteral, Ident, Stmt, StmtKind, StructMember, UnaryOp,
};
use quill_syn::Span;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::{ids, CompileError};
use crate::scope::{ScopeError, ScopeType, Symbol, SymbolScope, SymbolTable};

/// Hashable identity of a deduplicated constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Nil,
    Number(u64),
    Bool(bool),
    Str(SmolStr),
}

/// Type used to build a constant table
#[derive(Debug, Default)]
pub struct ConstantTableBuilder {
    constants: Vec<Constant>,
    reverse_map: FnvHashMap<ConstantKey, u32>,
}

impl ConstantTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_string(&mut self, s: &str) -> u32 {
        self.insert(Constant::Str(s.into()))
    }

    /// Insert a constant, reusing an equal scalar or string constant if one
    /// exists. Functions are never shared.
    pub fn insert(&mut self, v: Constant) -> u32 {
        let key = match &v {
            Constant::Nil => Some(ConstantKey::Nil),
            Constant::Number(n) => Some(ConstantKey::Number(n.to_bits())),
            Constant::Bool(b) => Some(ConstantKey::Bool(*b)),
            Constant::Str(s) => Some(ConstantKey::Str(s.clone())),
            Constant::Function(_) => None,
        };
        if let Some(&id) = key.as_ref().and_then(|k| self.reverse_map.get(k)) {
            return id;
        }

        let id = self.constants.len();
        assert!(
            id < i32::MAX as usize,
            "Cannot allocate more than 2^31 constants"
        );
        let id = id as u32;
        self.constants.push(v);
        if let Some(key) = key {
            self.reverse_map.insert(key, id);
        }
        id
    }

    pub fn finish(self) -> Vec<Constant> {
        self.constants
    }
}

/// State shared by every function compiled from one program.
pub struct CompileEnv<'a> {
    pub symbols: &'a mut SymbolTable,
    pub builtins: &'a mut dyn BuiltinTable,
    pub errors: Vec<CompileError>,
}

impl<'a> CompileEnv<'a> {
    pub fn new(symbols: &'a mut SymbolTable, builtins: &'a mut dyn BuiltinTable) -> Self {
        symbols.set_builtins(&builtins.builtin_names());
        CompileEnv {
            symbols,
            builtins,
            errors: Vec::new(),
        }
    }
}

/// The context used when building a function
pub struct FunctionCompileCtx<'e, 'a> {
    env: &'e mut CompileEnv<'a>,
    code: Vec<i32>,
    constants: ConstantTableBuilder,

    name: Option<SmolStr>,
    param_count: u32,
}

impl<'e, 'a> FunctionCompileCtx<'e, 'a> {
    pub fn new(env: &'e mut CompileEnv<'a>, name: Option<SmolStr>) -> Self {
        FunctionCompileCtx {
            env,
            code: Vec::new(),
            constants: ConstantTableBuilder::new(),
            name,
            param_count: 0,
        }
    }

    fn emit_error(&mut self, e: CompileError) {
        debug!(id = e.id, span = ?e.span, "compile error");
        self.env.errors.push(e);
    }

    fn emit(&mut self, inst: Inst) {
        self.code.emit(inst);
    }

    fn emit_p(&mut self, inst: Inst, params: &[i32]) {
        self.code.emit_p(inst, params);
    }

    fn emit_constant(&mut self, c: Constant) {
        let idx = self.constants.insert(c);
        self.emit_p(Inst::Constant, &[idx as i32]);
    }

    /// Emit a jump with a placeholder target. Returns the offset of the
    /// target operand, for [`Self::patch_jump_here`].
    fn emit_jump(&mut self, inst: Inst) -> usize {
        self.emit_p(inst, &[-1]);
        self.code.position() - 1
    }

    fn patch_jump_here(&mut self, operand: usize) {
        let here = self.code.position() as i32;
        self.code.patch(operand, here);
    }

    /// Finish the top-level function of a program.
    pub fn finish_main(mut self) -> Function {
        self.emit_p(Inst::Return, &[0]);
        let local_count = self.env.symbols.local_count();
        Function {
            name: self.name,
            code: self.code,
            constants: self.constants.finish(),
            param_count: 0,
            local_count,
        }
    }

    /// Finish a nested function, leaving its function scope.
    fn finish_nested(self, ends_with_return: bool) -> Function {
        let mut code = self.code;
        if !ends_with_return {
            code.emit_p(Inst::Return, &[0]);
        }
        let local_count = self
            .env
            .symbols
            .pop_scope()
            .expect("function context must close a function scope");
        debug!(
            name = ?self.name,
            params = self.param_count,
            locals = local_count,
            words = code.len(),
            "compiled function"
        );
        Function {
            name: self.name,
            code,
            constants: self.constants.finish(),
            param_count: self.param_count,
            local_count,
        }
    }
}

/// Symbol handling
impl<'e, 'a> FunctionCompileCtx<'e, 'a> {
    fn define(&mut self, name: &Ident) -> Option<Symbol> {
        match self.env.symbols.define(&name.name) {
            Ok(sym) => Some(sym),
            Err(ScopeError::Redefinition(n)) => {
                self.emit_error(
                    CompileError::new(ids::REDEFINITION, name.span.clone())
                        .with_message(format!("`{}` is already defined in this scope", n)),
                );
                None
            }
        }
    }

    fn resolve(&mut self, name: &str, span: &Span) -> Option<Symbol> {
        let sym = self.env.symbols.resolve(name);
        if sym.is_none() {
            self.emit_error(
                CompileError::new(ids::UNRESOLVED_NAME, span.clone())
                    .with_message(format!("cannot find `{}` in this scope", name)),
            );
        }
        sym
    }

    fn local_operands(sym: &Symbol) -> [i32; 3] {
        [
            sym.scope_depth as i32,
            sym.index as i32,
            sym.is_upvalue as i32,
        ]
    }

    fn emit_get(&mut self, sym: &Symbol) {
        match sym.scope {
            SymbolScope::Global => self.emit_p(Inst::GetGlobal, &[sym.index as i32]),
            SymbolScope::Local => self.emit_p(Inst::GetLocal, &Self::local_operands(sym)),
            SymbolScope::Builtin => self.emit_p(Inst::GetBuiltin, &[sym.index as i32]),
        }
    }

    /// Store the stack top into `sym`, leaving it on the stack.
    fn emit_set(&mut self, sym: &Symbol, span: &Span) {
        match sym.scope {
            SymbolScope::Global => self.emit_p(Inst::SetGlobal, &[sym.index as i32]),
            SymbolScope::Local => self.emit_p(Inst::SetLocal, &Self::local_operands(sym)),
            SymbolScope::Builtin => self.emit_error(
                CompileError::new(ids::NOT_ASSIGNABLE, span.clone())
                    .with_message(format!("cannot assign to builtin `{}`", sym.name)),
            ),
        }
    }
}

/// Statements
impl<'e, 'a> FunctionCompileCtx<'e, 'a> {
    pub fn compile_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.compile_expr(e);
                self.emit(Inst::Discard);
            }
            StmtKind::Var { name, init } => {
                match init {
                    Some(init) => self.compile_expr(init),
                    None => self.emit_constant(Constant::Nil),
                }
                if let Some(sym) = self.define(name) {
                    self.emit_set(&sym, &name.span);
                }
                self.emit(Inst::Discard);
            }
            StmtKind::Function { name, func } => {
                // Bound before the body is compiled so the body can recurse.
                let sym = self.define(name);
                let f = self.compile_function_literal(func);
                self.emit_constant(Constant::Function(f));
                if let Some(sym) = sym {
                    self.emit_set(&sym, &name.span);
                }
                self.emit(Inst::Discard);
            }
            StmtKind::Struct { name, members } => self.compile_struct_decl(name, members),
            StmtKind::Return(value) => match value {
                Some(v) => {
                    self.compile_expr(v);
                    self.emit_p(Inst::Return, &[1]);
                }
                None => self.emit_p(Inst::Return, &[0]),
            },
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond);
                let jump_to_else = self.emit_jump(Inst::JumpIfFalse);
                self.compile_block(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let jump_to_end = self.emit_jump(Inst::Jump);
                        self.patch_jump_here(jump_to_else);
                        self.compile_stmt(else_branch);
                        self.patch_jump_here(jump_to_end);
                    }
                    None => self.patch_jump_here(jump_to_else),
                }
            }
            StmtKind::While { cond, body } => {
                let loop_start = self.code.position() as i32;
                self.compile_expr(cond);
                let jump_to_end = self.emit_jump(Inst::JumpIfFalse);
                self.compile_block(body);
                self.emit_p(Inst::Jump, &[loop_start]);
                self.patch_jump_here(jump_to_end);
            }
            StmtKind::Block(block) => self.compile_block(block),
            StmtKind::Import(target) => self.compile_import(target),
        }
    }

    fn compile_block(&mut self, block: &Block) {
        self.env.symbols.push_scope(ScopeType::Block);
        self.compile_stmts(&block.stmts);
        self.env.symbols.pop_scope();
    }

    /// `struct Name { ... }` binds `Name` to a function building the literal.
    fn compile_struct_decl(&mut self, name: &Ident, members: &[StructMember]) {
        let sym = self.define(name);

        self.env.symbols.push_scope(ScopeType::Function);
        let mut ctx = FunctionCompileCtx::new(&mut *self.env, Some(name.name.clone()));
        ctx.compile_struct_literal(members);
        ctx.emit_p(Inst::Return, &[1]);
        let f = ctx.finish_nested(true);

        self.emit_constant(Constant::Function(Arc::new(f)));
        if let Some(sym) = sym {
            self.emit_set(&sym, &name.span);
        }
        self.emit(Inst::Discard);
    }

    fn compile_import(&mut self, target: &Expr) {
        let path = match &target.kind {
            ExprKind::Str(path) => path.clone(),
            _ => {
                self.emit_error(
                    CompileError::new(ids::MALFORMED_IMPORT, target.span.clone())
                        .with_message("import target must be a string literal"),
                );
                return;
            }
        };

        match self.env.builtins.import_library(&path) {
            Ok(()) => {
                let names = self.env.builtins.builtin_names();
                debug!(%path, builtins = names.len(), "imported extension library");
                self.env.symbols.set_builtins(&names);
            }
            Err(e) => {
                self.emit_error(
                    CompileError::new(ids::IMPORT_FAILED, target.span.clone())
                        .with_message(format!("failed to import `{}`: {}", path, e)),
                );
                return;
            }
        }

        let idx = self.constants.insert_string(&path);
        self.emit_p(Inst::Import, &[idx as i32]);
    }
}

/// Expressions
impl<'e, 'a> FunctionCompileCtx<'e, 'a> {
    pub fn compile_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Number(n) => self.emit_constant(Constant::Number(*n)),
            ExprKind::Str(s) => self.emit_constant(Constant::Str(s.clone())),
            ExprKind::Bool(b) => self.emit_constant(Constant::Bool(*b)),
            ExprKind::Nil => self.emit_constant(Constant::Nil),
            ExprKind::Ident(name) => {
                if let Some(sym) = self.resolve(name, &expr.span) {
                    self.emit_get(&sym);
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expr(rhs);
                self.compile_expr(lhs);
                self.compile_binary_op(*op);
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand);
                self.emit(match op {
                    UnaryOp::Not => Inst::Not,
                    UnaryOp::Neg => Inst::Minus,
                    UnaryOp::BitNot => Inst::BitNot,
                });
            }
            ExprKind::Assign { target, value } => self.compile_assign(target, value),
            ExprKind::Array(items) => {
                // The first element ends up on the stack top.
                for item in items.iter().rev() {
                    self.compile_expr(item);
                }
                self.emit_p(Inst::Array, &[items.len() as i32]);
            }
            ExprKind::Struct(members) => self.compile_struct_literal(members),
            ExprKind::Index { target, index } => {
                self.compile_expr(index);
                self.compile_expr(target);
                self.emit(Inst::GetIndex);
            }
            ExprKind::Member { target, name } => {
                self.constants_push_name(&name.name);
                self.compile_expr(target);
                self.emit(Inst::GetStruct);
            }
            ExprKind::Call { callee, args } => {
                self.compile_expr(callee);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit_p(Inst::Call, &[args.len() as i32]);
            }
            ExprKind::Function(func) => {
                let f = self.compile_function_literal(func);
                self.emit_constant(Constant::Function(f));
            }
            ExprKind::Ref(target) => self.compile_ref(target, &expr.span),
        }
    }

    fn constants_push_name(&mut self, name: &str) {
        let idx = self.constants.insert_string(name);
        self.emit_p(Inst::Constant, &[idx as i32]);
    }

    fn compile_binary_op(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.emit(Inst::Add),
            BinaryOp::Sub => self.emit(Inst::Sub),
            BinaryOp::Mul => self.emit(Inst::Mul),
            BinaryOp::Div => self.emit(Inst::Div),
            BinaryOp::Lt => self.emit(Inst::Less),
            BinaryOp::Gt => self.emit(Inst::Greater),
            BinaryOp::Le => {
                self.emit(Inst::Greater);
                self.emit(Inst::Not);
            }
            BinaryOp::Ge => {
                self.emit(Inst::Less);
                self.emit(Inst::Not);
            }
            BinaryOp::Eq => self.emit(Inst::Equal),
            BinaryOp::Ne => {
                self.emit(Inst::Equal);
                self.emit(Inst::Not);
            }
            BinaryOp::And => self.emit(Inst::And),
            BinaryOp::Or => self.emit(Inst::Or),
            BinaryOp::BitAnd => self.emit(Inst::BitAnd),
            BinaryOp::BitOr => self.emit(Inst::BitOr),
            BinaryOp::BitXor => self.emit(Inst::BitXor),
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr) {
        match &target.kind {
            ExprKind::Ident(name) => {
                self.compile_expr(value);
                if let Some(sym) = self.resolve(name, &target.span) {
                    self.emit_set(&sym, &target.span);
                }
            }
            ExprKind::Index {
                target: array,
                index,
            } => {
                self.compile_expr(value);
                self.compile_expr(index);
                self.compile_expr(array);
                self.emit(Inst::SetIndex);
            }
            ExprKind::Member {
                target: object,
                name,
            } => {
                self.compile_expr(value);
                self.constants_push_name(&name.name);
                self.compile_expr(object);
                self.emit(Inst::SetStruct);
            }
            _ => self.emit_error(
                CompileError::new(ids::NOT_ASSIGNABLE, target.span.clone())
                    .with_message("left-hand side of an assignment must be a name, an index or a member"),
            ),
        }
    }

    fn compile_struct_literal(&mut self, members: &[StructMember]) {
        for member in members {
            self.compile_expr(&member.value);
            self.constants_push_name(&member.name.name);
        }
        self.emit_p(Inst::Struct, &[members.len() as i32]);
    }

    fn compile_ref(&mut self, target: &Expr, span: &Span) {
        let not_referenceable = |what: &str| {
            CompileError::new(ids::NOT_REFERENCEABLE, span.clone())
                .with_message(format!("cannot take a reference to {}", what))
        };

        match &target.kind {
            ExprKind::Ident(name) => {
                let sym = match self.resolve(name, &target.span) {
                    Some(sym) => sym,
                    None => return,
                };
                match sym.scope {
                    SymbolScope::Global => self.emit_p(Inst::RefGlobal, &[sym.index as i32]),
                    SymbolScope::Local => {
                        self.emit_p(Inst::RefLocal, &Self::local_operands(&sym))
                    }
                    SymbolScope::Builtin => self.emit_error(not_referenceable("a builtin")),
                }
            }
            ExprKind::Index {
                target: array,
                index,
            } => {
                let name = match &array.kind {
                    ExprKind::Ident(name) => name,
                    _ => {
                        self.emit_error(not_referenceable("an element of a temporary"));
                        return;
                    }
                };
                self.compile_expr(index);
                let sym = match self.resolve(name, &array.span) {
                    Some(sym) => sym,
                    None => return,
                };
                match sym.scope {
                    SymbolScope::Global => {
                        self.emit_p(Inst::RefIndexGlobal, &[sym.index as i32])
                    }
                    SymbolScope::Local => {
                        self.emit_p(Inst::RefIndexLocal, &Self::local_operands(&sym))
                    }
                    SymbolScope::Builtin => self.emit_error(not_referenceable("a builtin")),
                }
            }
            _ => self.emit_error(not_referenceable("this expression")),
        }
    }

    fn compile_function_literal(&mut self, func: &FunctionLiteral) -> Arc<Function> {
        self.env.symbols.push_scope(ScopeType::Function);
        let mut ctx = FunctionCompileCtx::new(&mut *self.env, func.name.clone());

        // Parameters are the first locals of the frame.
        for param in &func.params {
            ctx.define(param);
            ctx.param_count += 1;
        }
        ctx.compile_stmts(&func.body.stmts);

        let ends_with_return = matches!(
            func.body.stmts.last(),
            Some(Stmt {
                kind: StmtKind::Return(_),
                ..
            })
        );
        Arc::new(ctx.finish_nested(ends_with_return))
    }
}
