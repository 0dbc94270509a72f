use std::sync::Arc;

use smol_str::SmolStr;

pub mod builtin;
mod disasm;
pub mod inst;

#[cfg(test)]
mod test;

/// A compiled function: its instruction stream plus its constant pool.
#[derive(Debug, Default)]
pub struct Function {
    pub name: Option<SmolStr>,
    pub code: Vec<i32>,
    pub constants: Vec<Constant>,
    /// Number of parameters. Parameters occupy the first local slots.
    pub param_count: u32,
    /// Number of local slots the frame needs, parameters included.
    pub local_count: u32,
}

#[derive(Debug, Clone)]
pub enum Constant {
    Nil,
    Number(f64),
    Bool(bool),
    Str(SmolStr),
    Function(Arc<Function>),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Nil, Constant::Nil) => true,
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Function(a), Constant::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Nil => f.write_str("nil"),
            Constant::Number(n) => f.write_str(&format_number(*n)),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Str(s) => write!(f, "{:?}", s.as_str()),
            Constant::Function(func) => match &func.name {
                Some(name) => write!(f, "<function {}>", name),
                None => f.write_str("<function>"),
            },
        }
    }
}

/// The output of compiling one program (or one REPL line).
#[derive(Debug, Clone)]
pub struct Program {
    /// The synthetic top-level function
    pub main: Arc<Function>,
    /// Names of the global slots known after this compilation, indexed by slot
    pub globals: Vec<SmolStr>,
}

impl Program {
    pub fn global_slot(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g == name)
    }
}

/// Render a number the way the language prints it: integral values print
/// without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
