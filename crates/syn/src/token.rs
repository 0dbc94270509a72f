use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynTag {
    // === Aux Tokens ===
    /// Anything that doesn't match
    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,

    // === Keywords ===
    #[token("var")]
    VarKw,
    #[token("function")]
    FunctionKw,
    #[token("struct")]
    StructKw,
    #[token("if")]
    IfKw,
    #[token("else")]
    ElseKw,
    #[token("while")]
    WhileKw,
    #[token("return")]
    ReturnKw,
    #[token("ref")]
    RefKw,
    #[token("import")]
    ImportKw,
    #[token("true")]
    TrueKw,
    #[token("false")]
    FalseKw,
    #[token("nil")]
    NilKw,

    // === Identifiers ====
    #[regex(r"[a-zA-Z_][0-9a-zA-Z_]*")]
    Ident,

    // === Literal Tokens ===
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,
    /// A string literal. Escapes are checked by the parser.
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,

    // === Operators ===
    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("=")]
    Assign,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("&")]
    Amp,
    #[token("|")]
    Bar,
    #[token("^")]
    BitXor,
    #[token("~")]
    Tilde,
    #[token("!")]
    Not,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
}
