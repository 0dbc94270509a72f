use std::fmt::{self, Display, Formatter};

use crate::{Span, SynTag};

#[derive(Debug, Clone, Copy)]
pub struct ParseErrorSignal;
pub type Result<T> = std::result::Result<T, ParseErrorSignal>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
    pub level: ParseErrorLevel,
}

impl ParseError {
    pub fn new(span: Span, kind: ParseErrorKind, level: ParseErrorLevel) -> Self {
        Self { span, kind, level }
    }

    pub fn error(span: Span, kind: ParseErrorKind) -> Self {
        Self {
            span,
            kind,
            level: ParseErrorLevel::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    Unexpected(SynTag),
    ExpectExpr { got: Option<SynTag> },
    Expected {
        expected: SynTag,
        got: Option<SynTag>,
    },
    InvalidEscape(char),
    InvalidNumber,
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, PartialOrd, Ord)]
pub enum ParseErrorLevel {
    Info,
    Warning,
    Error,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Unexpected(tag) => write!(f, "unexpected {}", tag.describe()),
            ParseErrorKind::ExpectExpr { got } => {
                write!(f, "expected an expression, found {}", describe_opt(*got))
            }
            ParseErrorKind::Expected { expected, got } => write!(
                f,
                "expected {}, found {}",
                expected.describe(),
                describe_opt(*got)
            ),
            ParseErrorKind::InvalidEscape(c) => write!(f, "invalid escape sequence `\\{}`", c),
            ParseErrorKind::InvalidNumber => f.write_str("invalid number literal"),
            ParseErrorKind::InvalidToken => f.write_str("invalid token"),
        }
    }
}

fn describe_opt(tag: Option<SynTag>) -> &'static str {
    tag.map_or("end of input", SynTag::describe)
}
