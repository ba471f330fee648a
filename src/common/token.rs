use crate::common::span::Spanned;

/// A reserved type name usable after `let ident : T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Int,
    Str,
}

/// The kind of a lexed token. Literal payloads (numbers, strings,
/// identifiers) are carried inline rather than re-sliced from the source,
/// since the lexer already has to scan past them to find the token's length.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(i32),
    String(String),
    Identifier(String),
    Type(TypeName),

    Let,
    If,
    Define,

    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Eq,

    OpenParen,
    CloseParen,
    Colon,

    Eof,

    /// An operator the lexer recognizes (matching the original scanner's
    /// greedy-longest-match rules) but that the grammar does not yet wire up.
    /// Kept separate from a hard lex error so that adding the operator later
    /// only touches the parser.
    Unsupported(String),
}

impl TokenKind {
    pub fn is_binary_op(&self) -> bool {
        matches!(
            self,
            TokenKind::Add
                | TokenKind::Sub
                | TokenKind::Mul
                | TokenKind::Div
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::Eq
        )
    }

    /// A short human-readable label, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number '{}'", n),
            TokenKind::String(s) => format!("string {:?}", s),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Type(TypeName::Int) => "type 'int'".to_string(),
            TokenKind::Type(TypeName::Str) => "type 'string'".to_string(),
            TokenKind::Let => "'let'".to_string(),
            TokenKind::If => "'if'".to_string(),
            TokenKind::Define => "'define'".to_string(),
            TokenKind::Add => "'+'".to_string(),
            TokenKind::Sub => "'-'".to_string(),
            TokenKind::Mul => "'*'".to_string(),
            TokenKind::Div => "'/'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Eq => "'=='".to_string(),
            TokenKind::OpenParen => "'('".to_string(),
            TokenKind::CloseParen => "')'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Unsupported(op) => format!("operator '{}'", op),
        }
    }
}

pub type Token = Spanned<TokenKind>;
