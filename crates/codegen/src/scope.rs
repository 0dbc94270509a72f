//! Compile-time scope chain.
//!
//! The outermost scope holds globals. Every function literal opens a function
//! scope, which starts a new call frame; block scopes inside it share that
//! frame's slot counter. Names from an enclosing function resolve to upvalues
//! addressed by how many frames up they live.

use fnv::FnvHashMap;
use smol_str::SmolStr;
use tracing::debug;
use vec1::Vec1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: SmolStr,
    pub scope: SymbolScope,
    /// Global slot, local slot inside the frame, or builtin index.
    pub index: u32,
    /// For a plain local, the function nesting level that defines it. For an
    /// upvalue, how many lexically enclosing functions out the defining
    /// function is.
    pub scope_depth: u32,
    pub is_upvalue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    /// The outermost scope of a program
    Global,
    /// The top-level scope inside a function
    Function,
    /// A braced block
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    Redefinition(SmolStr),
}

/// A lexical scope and the names bound directly in it.
#[derive(Debug, Clone)]
struct LexicalScope {
    ty: ScopeType,
    /// Function nesting level this scope belongs to.
    depth: u32,
    mapping: FnvHashMap<SmolStr, Symbol>,
}

impl LexicalScope {
    fn new(ty: ScopeType, depth: u32) -> Self {
        LexicalScope {
            ty,
            depth,
            mapping: FnvHashMap::default(),
        }
    }
}

/// Per-frame bookkeeping for the function being compiled.
#[derive(Debug, Default)]
struct FrameScope {
    local_count: u32,
    /// Names captured from enclosing frames
    upvalues: FnvHashMap<SmolStr, Symbol>,
}

/// Saved global bindings, used to undo a failed compilation.
#[derive(Debug, Clone)]
pub struct GlobalsSnapshot {
    mapping: FnvHashMap<SmolStr, Symbol>,
    slot_count: usize,
}

#[derive(Debug)]
pub struct SymbolTable {
    scope_stack: Vec1<LexicalScope>,
    /// One entry per function being compiled. The first one is the top-level
    /// function, which owns the locals of top-level blocks.
    frames: Vec1<FrameScope>,
    globals: Vec<SmolStr>,
    builtins: FnvHashMap<SmolStr, u32>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scope_stack: Vec1::new(LexicalScope::new(ScopeType::Global, 0)),
            frames: Vec1::new(FrameScope::default()),
            globals: Vec::new(),
            builtins: FnvHashMap::default(),
        }
    }

    /// Replace the set of builtin names. A name's position is its index.
    pub fn set_builtins(&mut self, names: &[SmolStr]) {
        self.builtins = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx as u32))
            .collect();
    }

    /// Names of every global slot, indexed by slot.
    pub fn globals(&self) -> &[SmolStr] {
        &self.globals
    }

    /// Current function nesting level. The top level is 0.
    pub fn depth(&self) -> u32 {
        (self.frames.len() - 1) as u32
    }

    pub fn is_global_scope(&self) -> bool {
        self.scope_stack.len() == 1
    }

    pub fn push_scope(&mut self, ty: ScopeType) {
        debug_assert_ne!(ty, ScopeType::Global, "there is only one global scope");
        if ty == ScopeType::Function {
            self.frames.push(FrameScope::default());
        }
        let depth = self.depth();
        self.scope_stack.push(LexicalScope::new(ty, depth));
    }

    /// Leave the innermost scope. Returns the frame's local count when the
    /// scope was a function scope.
    pub fn pop_scope(&mut self) -> Option<u32> {
        let scope = self
            .scope_stack
            .pop()
            .expect("This SymbolTable pops its global scope. what happened?");
        if scope.ty == ScopeType::Function {
            let frame = self
                .frames
                .pop()
                .expect("function scope without a frame. what happened?");
            Some(frame.local_count)
        } else {
            None
        }
    }

    /// Number of local slots allocated so far by the current function.
    pub fn local_count(&self) -> u32 {
        self.frames.last().local_count
    }

    /// Bind `name` in the innermost scope.
    pub fn define(&mut self, name: &SmolStr) -> Result<Symbol, ScopeError> {
        let depth = self.depth();
        let is_global = self.is_global_scope();
        if self.scope_stack.last().mapping.contains_key(name) {
            return Err(ScopeError::Redefinition(name.clone()));
        }

        let symbol = if is_global {
            let index = self.globals.len() as u32;
            self.globals.push(name.clone());
            Symbol {
                name: name.clone(),
                scope: SymbolScope::Global,
                index,
                scope_depth: 0,
                is_upvalue: false,
            }
        } else {
            let frame = self.frames.last_mut();
            let index = frame.local_count;
            frame.local_count += 1;
            Symbol {
                name: name.clone(),
                scope: SymbolScope::Local,
                index,
                scope_depth: depth,
                is_upvalue: false,
            }
        };

        self.scope_stack
            .last_mut()
            .mapping
            .insert(name.clone(), symbol.clone());
        Ok(symbol)
    }

    /// Look a name up, innermost scope first.
    ///
    /// A local of an enclosing function is recorded as an upvalue of the
    /// current function; later lookups hit that record.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let depth = self.depth();
        let mut scopes = self.scope_stack.iter().rev().peekable();

        // Scopes of the current function come first.
        while let Some(scope) = scopes.next_if(|s| s.depth == depth && s.ty != ScopeType::Global) {
            if let Some(sym) = scope.mapping.get(name) {
                return Some(sym.clone());
            }
        }

        if let Some(sym) = self.frames.last().upvalues.get(name) {
            return Some(sym.clone());
        }

        let found = scopes.find_map(|scope| scope.mapping.get(name)).cloned();
        match found {
            Some(sym) if sym.scope == SymbolScope::Local => {
                let upvalue = Symbol {
                    is_upvalue: true,
                    scope_depth: depth - sym.scope_depth,
                    ..sym
                };
                debug!(
                    name,
                    levels_up = upvalue.scope_depth,
                    slot = upvalue.index,
                    "captured upvalue"
                );
                self.frames
                    .last_mut()
                    .upvalues
                    .insert(upvalue.name.clone(), upvalue.clone());
                Some(upvalue)
            }
            Some(sym) => Some(sym),
            None => self.builtins.get(name).map(|&index| Symbol {
                name: name.into(),
                scope: SymbolScope::Builtin,
                index,
                scope_depth: 0,
                is_upvalue: false,
            }),
        }
    }

    /// Reset the top-level frame before compiling another program. Locals of
    /// top-level blocks do not outlive the program that defined them.
    pub fn begin_program(&mut self) {
        debug_assert!(self.is_global_scope());
        *self.frames.first_mut() = FrameScope::default();
    }

    pub fn snapshot_globals(&self) -> GlobalsSnapshot {
        GlobalsSnapshot {
            mapping: self.scope_stack.first().mapping.clone(),
            slot_count: self.globals.len(),
        }
    }

    /// Forget every global defined after `snapshot` was taken.
    pub fn restore_globals(&mut self, snapshot: GlobalsSnapshot) {
        debug_assert!(self.is_global_scope());
        self.scope_stack.first_mut().mapping = snapshot.mapping;
        self.globals.truncate(snapshot.slot_count);
    }
}
