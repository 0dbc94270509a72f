//! Pratt parsing utilities and definitions.
//!
//! This module contains utilities for pratt-parsing Quill's expressions.

use crate::ast::{BinaryOp, UnaryOp};
use crate::SynTag;

/*
   Precedence from high to low:

       - Primary Expr: Var, Literal, Array, Struct, Function literals
       - Call/Dot/Subscript Expr `f(x)` `x.a` `x[a]`

       - Unary Op `!x` `-x` `~x` `ref x`
       - Multiplicative Op `x * y` `x / y`
       - Additive Op `x + y` `x - y`

       - Comparison Op `x < y` `x > y` `x <= y` `x >= y`
       - Equality Op `x == y` `x != y`
       - Bitwise Op `x & y`, then `x ^ y`, then `x | y`
       - Binary And Op `x && y`
       - Binary Or Op `x || y`
       - Assignment Op `x = y`

   Binding power are precedence combined with associativity. The basic unit in
   precedence is 10, and every left/right associativity alternate this by 1.
*/

use SynTag::*;

#[derive(Debug, Clone, Copy)]
pub enum Infix {
    Left(i32),
    Right(i32),
}

impl Infix {
    /// Returns `(left binding power, right binding power)`.
    pub fn binding_power(self) -> (i32, i32) {
        match self {
            Infix::Left(i) => (i, i + 1),
            Infix::Right(i) => (i + 1, i),
        }
    }
}

pub fn prefix_binding_power(op: SynTag) -> Option<i32> {
    match op {
        Not | Sub | Tilde | RefKw => Some(110),
        _ => None,
    }
}

pub fn prefix_op(op: SynTag) -> Option<UnaryOp> {
    match op {
        Not => Some(UnaryOp::Not),
        Sub => Some(UnaryOp::Neg),
        Tilde => Some(UnaryOp::BitNot),
        _ => None,
    }
}

/// Call, subscript and member access.
pub fn postfix_binding_power(op: SynTag) -> Option<i32> {
    match op {
        LParen | LBracket | Dot => Some(120),
        _ => None,
    }
}

pub fn infix_binding_power(op: SynTag) -> Option<Infix> {
    match op {
        Assign => Infix::Right(10).into(),
        Or => Infix::Left(20).into(),
        And => Infix::Left(30).into(),
        Bar => Infix::Left(40).into(),
        BitXor => Infix::Left(50).into(),
        Amp => Infix::Left(60).into(),

        Eq | Neq => Infix::Left(70).into(),
        Lt | Gt | Le | Ge => Infix::Left(80).into(),

        Add | Sub => Infix::Left(90).into(),
        Mul | Div => Infix::Left(100).into(),

        _ => None,
    }
}

pub fn binary_op(op: SynTag) -> Option<BinaryOp> {
    let op = match op {
        Add => BinaryOp::Add,
        Sub => BinaryOp::Sub,
        Mul => BinaryOp::Mul,
        Div => BinaryOp::Div,
        Lt => BinaryOp::Lt,
        Gt => BinaryOp::Gt,
        Le => BinaryOp::Le,
        Ge => BinaryOp::Ge,
        Eq => BinaryOp::Eq,
        Neq => BinaryOp::Ne,
        And => BinaryOp::And,
        Or => BinaryOp::Or,
        Amp => BinaryOp::BitAnd,
        Bar => BinaryOp::BitOr,
        BitXor => BinaryOp::BitXor,
        _ => return None,
    };
    Some(op)
}
