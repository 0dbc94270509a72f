//! The abstract syntax tree handed to the compiler.
//!
//! Every node owns its children and carries the byte span it was parsed from.

use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::Span;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: SmolStr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `var name = init;`
    Var { name: Ident, init: Option<Expr> },
    /// `function name(params) { body }`
    Function { name: Ident, func: FunctionLiteral },
    /// `struct Name { member: init, ... }`
    Struct {
        name: Ident,
        members: Vec<StructMember>,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Block,
        /// Either a [`StmtKind::Block`] or a nested [`StmtKind::If`]
        else_branch: Option<Box<Stmt>>,
    },
    While { cond: Expr, body: Block },
    Block(Block),
    /// `import(target);`
    Import(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<SmolStr>,
    pub params: Vec<Ident>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(SmolStr),
    Bool(bool),
    Nil,
    Ident(SmolStr),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Array(Vec<Expr>),
    Struct(Vec<StructMember>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: Ident,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Function(FunctionLiteral),
    /// `ref target`
    Ref(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
        }
    }
}

// S-expression rendering, mostly for tests and `--parse-only`.

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in &self.stmts {
            writeln!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(block")?;
        for stmt in &self.stmts {
            write!(f, " {}", stmt)?;
        }
        f.write_str(")")
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expr(e) => write!(f, "{}", e),
            StmtKind::Var { name, init } => match init {
                Some(init) => write!(f, "(var {} {})", name.name, init),
                None => write!(f, "(var {})", name.name),
            },
            StmtKind::Function { func, .. } => write!(f, "{}", func),
            StmtKind::Struct { name, members } => {
                write!(f, "(struct {}", name.name)?;
                for m in members {
                    write!(f, " ({} {})", m.name.name, m.value)?;
                }
                f.write_str(")")
            }
            StmtKind::Return(Some(e)) => write!(f, "(return {})", e),
            StmtKind::Return(None) => f.write_str("(return)"),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                write!(f, "(if {} {}", cond, then_branch)?;
                if let Some(e) = else_branch {
                    write!(f, " {}", e)?;
                }
                f.write_str(")")
            }
            StmtKind::While { cond, body } => write!(f, "(while {} {})", cond, body),
            StmtKind::Block(b) => write!(f, "{}", b),
            StmtKind::Import(e) => write!(f, "(import {})", e),
        }
    }
}

impl Display for FunctionLiteral {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(function")?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        f.write_str(" (")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&p.name)?;
        }
        write!(f, ") {})", self.body)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => write!(f, "{}", n),
            ExprKind::Str(s) => write!(f, "{:?}", s.as_str()),
            ExprKind::Bool(b) => write!(f, "{}", b),
            ExprKind::Nil => f.write_str("nil"),
            ExprKind::Ident(name) => f.write_str(name),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({} {} {})", op.as_str(), lhs, rhs),
            ExprKind::Unary { op, operand } => write!(f, "({} {})", op.as_str(), operand),
            ExprKind::Assign { target, value } => write!(f, "(= {} {})", target, value),
            ExprKind::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            ExprKind::Struct(members) => {
                f.write_str("{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}: {}", m.name.name, m.value)?;
                }
                f.write_str("}")
            }
            ExprKind::Index { target, index } => write!(f, "(index {} {})", target, index),
            ExprKind::Member { target, name } => write!(f, "(. {} {})", target, name.name),
            ExprKind::Call { callee, args } => {
                write!(f, "(call {}", callee)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                f.write_str(")")
            }
            ExprKind::Function(func) => write!(f, "{}", func),
            ExprKind::Ref(target) => write!(f, "(ref {})", target),
        }
    }
}
