use crate::SynTag;

use SynTag::*;

impl SynTag {
    pub fn can_start_expr(self) -> bool {
        matches!(
            self,
            // keywords
            FunctionKw | RefKw | TrueKw | FalseKw | NilKw
            // prefix operators
            | Sub | Not | Tilde
            // literals
            | Ident | Number | StringLiteral
            | LParen | LBracket | LBrace
        )
    }

    /// Tokens the parser skips to when recovering from a broken statement.
    pub fn is_stmt_parsing_sync_token(self) -> bool {
        matches!(
            self,
            Semicolon | RBrace | VarKw | FunctionKw | StructKw | IfKw | WhileKw | ReturnKw | ImportKw
        )
    }

    /// Human readable name used in diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            Error => "invalid token",
            VarKw => "`var`",
            FunctionKw => "`function`",
            StructKw => "`struct`",
            IfKw => "`if`",
            ElseKw => "`else`",
            WhileKw => "`while`",
            ReturnKw => "`return`",
            RefKw => "`ref`",
            ImportKw => "`import`",
            TrueKw => "`true`",
            FalseKw => "`false`",
            NilKw => "`nil`",
            Ident => "identifier",
            Number => "number",
            StringLiteral => "string",
            Add => "`+`",
            Sub => "`-`",
            Mul => "`*`",
            Div => "`/`",
            Gt => "`>`",
            Ge => "`>=`",
            Lt => "`<`",
            Le => "`<=`",
            Eq => "`==`",
            Neq => "`!=`",
            Assign => "`=`",
            And => "`&&`",
            Or => "`||`",
            Amp => "`&`",
            Bar => "`|`",
            BitXor => "`^`",
            Tilde => "`~`",
            Not => "`!`",
            Colon => "`:`",
            Semicolon => "`;`",
            Dot => "`.`",
            Comma => "`,`",
            LParen => "`(`",
            RParen => "`)`",
            LBracket => "`[`",
            RBracket => "`]`",
            LBrace => "`{`",
            RBrace => "`}`",
        }
    }
}
