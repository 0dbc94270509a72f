use logos::Logos;

pub mod ast;
pub mod parse;
pub mod token;

pub use logos::Span;
pub use parse::{parse, Parser};
pub use token::SynTag;

/// The main lexer used in Quill.
pub struct Lexer<'lex> {
    /// The actual lexer that does the job.
    inner: logos::Lexer<'lex, SynTag>,
    /// The span of the last token
    span: Span,
    /// A token that has been peeked but not consumed yet.
    pending: Option<(SynTag, Span)>,
}

impl<'lex> Lexer<'lex> {
    /// Create a new lexer from string.
    pub fn new(s: &'lex str) -> Lexer<'lex> {
        Lexer {
            inner: SynTag::lexer(s),
            span: 0..0,
            pending: None,
        }
    }

    /// The underlying source code
    pub fn source(&self) -> &'lex str {
        self.inner.source()
    }

    /// The span of the last consumed token.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// The slice of string of the last consumed token.
    pub fn slice(&self) -> &'lex str {
        &self.inner.source()[self.span()]
    }

    /// The span of the next token, or an empty span at the end of input.
    pub fn peek_span(&mut self) -> Span {
        self.peek();
        match &self.pending {
            Some((_, span)) => span.clone(),
            None => {
                let end = self.inner.source().len();
                end..end
            }
        }
    }

    /// Return a copy of the current front token without really consuming it.
    pub fn peek(&mut self) -> Option<SynTag> {
        if self.pending.is_none() {
            let next = self.inner.next()?;
            self.pending = Some((next, self.inner.span()));
        }
        self.pending.as_ref().map(|(tag, _)| *tag)
    }
}

impl<'lex> Iterator for Lexer<'lex> {
    type Item = SynTag;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((tok, span)) = self.pending.take() {
            self.span = span;
            Some(tok)
        } else {
            let tok = self.inner.next();
            self.span = self.inner.span();
            tok
        }
    }
}
