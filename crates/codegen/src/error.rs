use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use quill_syn::Span;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ErrorLevel {
    Allow,
    Note,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub level: ErrorLevel,
    /// Stable identifier of the error kind, e.g. `unresolved-name`.
    pub id: &'static str,
    pub span: Span,
    pub message: Option<Cow<'static, str>>,
}

impl CompileError {
    pub fn new(id: &'static str, span: Span) -> CompileError {
        CompileError {
            level: ErrorLevel::Error,
            id,
            span,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.level >= ErrorLevel::Error
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.id, msg),
            None => f.write_str(self.id),
        }
    }
}

/// Error ids emitted by the compiler.
pub mod ids {
    pub const UNRESOLVED_NAME: &str = "unresolved-name";
    pub const REDEFINITION: &str = "redefinition";
    pub const NOT_ASSIGNABLE: &str = "not-assignable";
    pub const NOT_REFERENCEABLE: &str = "not-referenceable";
    pub const MALFORMED_IMPORT: &str = "malformed-import";
    pub const IMPORT_FAILED: &str = "import-failed";
}
