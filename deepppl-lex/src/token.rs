#![forbid(unsafe_code)]

use deepppl_ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwFor,
    KwIn,
    KwWhile,
    KwIf,
    KwElse,
    KwBreak,
    KwContinue,

    // Operators / punctuation
    Tilde,
    PlusEq,
    Eq,
    EqEq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,

    Plus,
    Minus,
    Star,
    Slash,
    DotStar,
    DotSlash,
    Caret,
    Percent,

    AndAnd,
    OrOr,
    Bang,
    Dot,
    Dollar,
    Comma,
    Colon,
    Semi,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,

    // Literals / identifiers
    Ident(String),
    Int(i64),
    Real(f64),
    String(String),
}

impl TokenKind {
    /// Human-readable form used in parse errors.
    pub fn describe(&self) -> String {
        let s = match self {
            TokenKind::KwFor => "'for'",
            TokenKind::KwIn => "'in'",
            TokenKind::KwWhile => "'while'",
            TokenKind::KwIf => "'if'",
            TokenKind::KwElse => "'else'",
            TokenKind::KwBreak => "'break'",
            TokenKind::KwContinue => "'continue'",
            TokenKind::Tilde => "'~'",
            TokenKind::PlusEq => "'+='",
            TokenKind::Eq => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::Neq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Le => "'<='",
            TokenKind::Ge => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::DotStar => "'.*'",
            TokenKind::DotSlash => "'./'",
            TokenKind::Caret => "'^'",
            TokenKind::Percent => "'%'",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Dot => "'.'",
            TokenKind::Dollar => "'$'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semi => "';'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Eof => "end of input",
            TokenKind::Ident(name) => return format!("identifier '{name}'"),
            TokenKind::Int(n) => return format!("integer {n}"),
            TokenKind::Real(v) => return format!("real {v}"),
            TokenKind::String(_) => "string literal",
        };
        s.to_string()
    }
}
