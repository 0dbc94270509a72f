use smol_str::SmolStr;
use tracing::debug;

pub mod error_report;
mod pratt_util;
mod tag_util;
#[cfg(test)]
mod test;

use crate::ast::{
    self, Block, Expr, ExprKind, FunctionLiteral, Program, Stmt, StmtKind, StructMember,
};
use crate::SynTag::{self, *};
use crate::{Lexer, Span};

pub use error_report::{ParseError, ParseErrorKind, ParseErrorLevel};
use error_report::{ParseErrorSignal, Result};
use pratt_util::*;

/// Parse a whole source file. Errors are collected; the returned program
/// contains every statement that parsed successfully.
pub fn parse(src: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::new(src);
    parser.parse();
    parser.finish()
}

pub struct Parser<'src> {
    /// The lexer that does the job.
    lexer: Lexer<'src>,

    /// Statements parsed at the top level.
    stmts: Vec<Stmt>,

    errors: Vec<ParseError>,

    /// Number of tokens consumed so far, used to detect progress while
    /// recovering from errors.
    consumed: usize,
}

impl<'src> Parser<'src> {
    pub fn new(s: &'src str) -> Self {
        Parser {
            lexer: Lexer::new(s),
            stmts: Vec::new(),
            errors: Vec::new(),
            consumed: 0,
        }
    }

    pub fn parse(&mut self) {
        self.parse_root()
    }

    pub fn finish(self) -> (Program, Vec<ParseError>) {
        (Program { stmts: self.stmts }, self.errors)
    }

    fn log_err(&mut self, err: ParseError) {
        debug!(?err, "parse error");
        self.errors.push(err)
    }

    /// Record an error at the next token and return the signal to unwind.
    fn err_at_peek(&mut self, kind: ParseErrorKind) -> ParseErrorSignal {
        let span = self.lexer.peek_span();
        self.log_err(ParseError::error(span, kind));
        ParseErrorSignal
    }

    fn bump(&mut self) -> Option<SynTag> {
        let tok = self.lexer.next()?;
        self.consumed += 1;
        Some(tok)
    }

    fn peek(&mut self) -> Option<SynTag> {
        self.lexer.peek()
    }

    fn peek_is(&mut self, s: SynTag) -> bool {
        self.peek() == Some(s)
    }

    fn eat_if_is(&mut self, s: SynTag) -> bool {
        if self.peek_is(s) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume a token of the given kind, or report what was found instead.
    fn expect(&mut self, expected: SynTag) -> Result<Span> {
        if self.peek_is(expected) {
            self.bump();
            Ok(self.lexer.span())
        } else {
            let got = self.peek();
            Err(self.err_at_peek(ParseErrorKind::Expected { expected, got }))
        }
    }

    fn expect_ident(&mut self) -> Result<ast::Ident> {
        let span = self.expect(Ident)?;
        Ok(ast::Ident {
            name: SmolStr::new(self.lexer.slice()),
            span,
        })
    }

    /// Byte offset where the next token starts.
    fn start(&mut self) -> usize {
        self.lexer.peek_span().start
    }

    /// Span from `start` up to the end of the last consumed token.
    fn span_from(&self, start: usize) -> Span {
        start..self.lexer.span().end.max(start)
    }

    /// Skip tokens until a point where a new statement can begin.
    fn synchronize(&mut self, consumed_at_start: usize) {
        while let Some(tok) = self.peek() {
            match tok {
                Semicolon => {
                    self.bump();
                    return;
                }
                RBrace => return,
                t if t.is_stmt_parsing_sync_token() && self.consumed > consumed_at_start => {
                    return
                }
                _ => {
                    self.bump();
                }
            }
        }
    }
}

/// Statements.
impl<'src> Parser<'src> {
    fn parse_root(&mut self) {
        while let Some(tok) = self.peek() {
            if tok == RBrace {
                // A closing brace with nothing to close.
                self.err_at_peek(ParseErrorKind::Unexpected(RBrace));
                self.bump();
                continue;
            }
            if let Some(stmt) = self.parse_stmt_recovering() {
                self.stmts.push(stmt);
            }
        }
    }

    fn parse_stmt_recovering(&mut self) -> Option<Stmt> {
        let consumed_at_start = self.consumed;
        match self.parse_stmt() {
            Ok(stmt) => Some(stmt),
            Err(ParseErrorSignal) => {
                self.synchronize(consumed_at_start);
                None
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.start();
        let kind = match self.peek() {
            Some(VarKw) => self.parse_var_stmt()?,
            Some(FunctionKw) => return self.parse_function_stmt(),
            Some(StructKw) => self.parse_struct_stmt()?,
            Some(IfKw) => self.parse_if_stmt()?,
            Some(WhileKw) => {
                self.bump();
                let cond = self.parse_paren_expr()?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            Some(ReturnKw) => {
                self.bump();
                let value = if self.peek_is(Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(Semicolon)?;
                StmtKind::Return(value)
            }
            Some(ImportKw) => {
                self.bump();
                let target = self.parse_paren_expr()?;
                self.expect(Semicolon)?;
                StmtKind::Import(target)
            }
            Some(LBrace) => StmtKind::Block(self.parse_block()?),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(Semicolon)?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_var_stmt(&mut self) -> Result<StmtKind> {
        self.expect(VarKw)?;
        let name = self.expect_ident()?;
        let init = if self.eat_if_is(Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(Semicolon)?;
        Ok(StmtKind::Var { name, init })
    }

    /// Either a named function declaration, or an expression statement that
    /// starts with an anonymous function literal.
    fn parse_function_stmt(&mut self) -> Result<Stmt> {
        let start = self.start();
        self.expect(FunctionKw)?;
        let (name, func) = self.parse_function_rest()?;
        let kind = match name {
            Some(name) => StmtKind::Function { name, func },
            None => {
                let lhs = Expr::new(ExprKind::Function(func), self.span_from(start));
                let expr = self.parse_expr_rest(lhs, 0)?;
                self.expect(Semicolon)?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_struct_stmt(&mut self) -> Result<StmtKind> {
        self.expect(StructKw)?;
        let name = self.expect_ident()?;
        self.expect(LBrace)?;
        let members = self.parse_struct_members()?;
        self.eat_if_is(Semicolon);
        Ok(StmtKind::Struct { name, members })
    }

    fn parse_if_stmt(&mut self) -> Result<StmtKind> {
        self.expect(IfKw)?;
        let cond = self.parse_paren_expr()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat_if_is(ElseKw) {
            let start = self.start();
            let kind = if self.peek_is(IfKw) {
                self.parse_if_stmt()?
            } else {
                StmtKind::Block(self.parse_block()?)
            };
            Some(Box::new(Stmt {
                kind,
                span: self.span_from(start),
            }))
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.start();
        self.expect(LBrace)?;
        let mut stmts = Vec::new();
        while !self.peek_is(RBrace) && self.peek().is_some() {
            if let Some(stmt) = self.parse_stmt_recovering() {
                stmts.push(stmt);
            }
        }
        self.expect(RBrace)?;
        Ok(Block {
            stmts,
            span: self.span_from(start),
        })
    }
}

/// Expressions.
impl<'src> Parser<'src> {
    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_paren_expr(&mut self) -> Result<Expr> {
        self.expect(LParen)?;
        let expr = self.parse_expr()?;
        self.expect(RParen)?;
        Ok(expr)
    }

    fn parse_expr_bp(&mut self, min_bp: i32) -> Result<Expr> {
        let start = self.start();
        let prefix = self
            .peek()
            .and_then(|tok| prefix_binding_power(tok).map(|bp| (tok, bp)));
        let lhs = match prefix {
            Some((tok, bp)) => {
                self.bump();
                let operand = Box::new(self.parse_expr_bp(bp)?);
                let kind = match prefix_op(tok) {
                    Some(op) => ExprKind::Unary { op, operand },
                    None => ExprKind::Ref(operand),
                };
                Expr::new(kind, self.span_from(start))
            }
            None => self.parse_primary()?,
        };
        self.parse_expr_rest(lhs, min_bp)
    }

    /// Continue an expression whose leftmost operand is already parsed.
    fn parse_expr_rest(&mut self, mut lhs: Expr, min_bp: i32) -> Result<Expr> {
        let start = lhs.span.start;
        while let Some(tok) = self.peek() {
            if let Some(bp) = postfix_binding_power(tok) {
                if bp < min_bp {
                    break;
                }
                self.bump();
                let kind = match tok {
                    LParen => {
                        let args = self.parse_delimited(RParen)?;
                        ExprKind::Call {
                            callee: Box::new(lhs),
                            args,
                        }
                    }
                    LBracket => {
                        let index = self.parse_expr()?;
                        self.expect(RBracket)?;
                        ExprKind::Index {
                            target: Box::new(lhs),
                            index: Box::new(index),
                        }
                    }
                    _ => {
                        let name = self.expect_ident()?;
                        ExprKind::Member {
                            target: Box::new(lhs),
                            name,
                        }
                    }
                };
                lhs = Expr::new(kind, self.span_from(start));
                continue;
            }

            let (l_bp, r_bp) = match infix_binding_power(tok) {
                Some(infix) => infix.binding_power(),
                None => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = Box::new(self.parse_expr_bp(r_bp)?);
            let kind = match binary_op(tok) {
                Some(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs,
                },
                None => ExprKind::Assign {
                    target: Box::new(lhs),
                    value: rhs,
                },
            };
            lhs = Expr::new(kind, self.span_from(start));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.start();
        let tok = match self.peek() {
            Some(Error) => {
                self.bump();
                let span = self.lexer.span();
                self.log_err(ParseError::error(span, ParseErrorKind::InvalidToken));
                return Err(ParseErrorSignal);
            }
            Some(tok) if tok.can_start_expr() => tok,
            got => return Err(self.err_at_peek(ParseErrorKind::ExpectExpr { got })),
        };
        self.bump();
        let kind = match tok {
            Number => match self.lexer.slice().parse::<f64>() {
                Ok(n) => ExprKind::Number(n),
                Err(_) => {
                    let span = self.lexer.span();
                    self.log_err(ParseError::error(span, ParseErrorKind::InvalidNumber));
                    return Err(ParseErrorSignal);
                }
            },
            StringLiteral => {
                let raw = self.lexer.slice();
                let span = self.lexer.span();
                match unescape(&raw[1..raw.len() - 1]) {
                    Ok(s) => ExprKind::Str(s),
                    Err(c) => {
                        self.log_err(ParseError::error(span, ParseErrorKind::InvalidEscape(c)));
                        return Err(ParseErrorSignal);
                    }
                }
            }
            TrueKw => ExprKind::Bool(true),
            FalseKw => ExprKind::Bool(false),
            NilKw => ExprKind::Nil,
            Ident => ExprKind::Ident(SmolStr::new(self.lexer.slice())),
            LParen => {
                let inner = self.parse_expr()?;
                self.expect(RParen)?;
                return Ok(Expr::new(inner.kind, self.span_from(start)));
            }
            LBracket => ExprKind::Array(self.parse_delimited(RBracket)?),
            LBrace => ExprKind::Struct(self.parse_struct_members()?),
            FunctionKw => {
                let (_, func) = self.parse_function_rest()?;
                ExprKind::Function(func)
            }
            _ => unreachable!("token {:?} was checked to start an expression", tok),
        };
        Ok(Expr::new(kind, self.span_from(start)))
    }

    /// Comma separated expressions up to `close`, which is consumed. The
    /// opening token must already be consumed. A trailing comma is allowed.
    fn parse_delimited(&mut self, close: SynTag) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.peek_is(close) {
            items.push(self.parse_expr()?);
            if !self.eat_if_is(Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    /// `name: value, ...}` with the opening brace already consumed.
    fn parse_struct_members(&mut self) -> Result<Vec<StructMember>> {
        let mut members = Vec::new();
        while !self.peek_is(RBrace) {
            let name = self.expect_ident()?;
            self.expect(Colon)?;
            let value = self.parse_expr()?;
            members.push(StructMember { name, value });
            if !self.eat_if_is(Comma) {
                break;
            }
        }
        self.expect(RBrace)?;
        Ok(members)
    }

    /// Parameters and body of a function, with `function` already consumed.
    fn parse_function_rest(&mut self) -> Result<(Option<ast::Ident>, FunctionLiteral)> {
        let name = if self.peek_is(Ident) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(LParen)?;
        let mut params = Vec::new();
        while !self.peek_is(RParen) {
            params.push(self.expect_ident()?);
            if !self.eat_if_is(Comma) {
                break;
            }
        }
        self.expect(RParen)?;
        let body = self.parse_block()?;
        let func = FunctionLiteral {
            name: name.as_ref().map(|n| n.name.clone()),
            params,
            body,
        };
        Ok((name, func))
    }
}

/// Resolve escape sequences in the body of a string literal. Returns the
/// offending character on an unknown escape.
fn unescape(raw: &str) -> std::result::Result<SmolStr, char> {
    if !raw.contains('\\') {
        return Ok(SmolStr::new(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        // The lexer guarantees a character after every backslash.
        let escaped = chars.next().unwrap_or('\\');
        out.push(match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '"' => '"',
            '\\' => '\\',
            other => return Err(other),
        });
    }
    Ok(SmolStr::new(out))
}
