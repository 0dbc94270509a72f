use smol_str::SmolStr;
use thiserror::Error;

use crate::builtin::LoadError;

/// An error raised while executing bytecode.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot apply `{op}` to {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: f64, len: usize },

    #[error("{0} cannot be used as an index")]
    InvalidIndex(&'static str),

    #[error("{0} cannot be indexed")]
    NotIndexable(&'static str),

    #[error("{0} is not a struct")]
    NotAStruct(&'static str),

    #[error("struct has no member `{0}`")]
    NoSuchMember(SmolStr),

    #[error("{0} is not callable")]
    NotCallable(&'static str),

    #[error("function expects {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("{0} overflowed")]
    StackOverflow(&'static str),

    #[error("stack underflow: an expression produced no value")]
    StackUnderflow,

    #[error("dangling reference: {0}")]
    DanglingReference(&'static str),

    #[error(transparent)]
    Import(#[from] LoadError),

    /// Raised by native builtins.
    #[error("{0}")]
    Native(String),
}

impl RuntimeError {
    pub fn native(msg: impl Into<String>) -> Self {
        RuntimeError::Native(msg.into())
    }
}
