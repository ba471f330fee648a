//! Character-level tokenization. Deliberately small: per the language's
//! design notes, the lexer is "trivial scanning producing a token stream" -
//! the interesting design decisions live in the parser and compiler.

use std::rc::Rc;

use crate::common::source::Source;
use crate::common::span::{Span, Spanned};
use crate::common::token::{Token, TokenKind, TypeName};
use crate::compiler::error::Syntax;

struct Lexer {
    source: Rc<Source>,
    offset: usize,
}

impl Lexer {
    fn new(source: Rc<Source>) -> Lexer {
        Lexer { source, offset: 0 }
    }

    fn remaining(&self) -> &str {
        &self.source.contents[self.offset..]
    }

    fn span(&self, start: usize) -> Span {
        Span::new(&self.source, start, self.offset - start)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let before = self.offset;
            let rest = self.remaining();

            let ws_bytes: usize = rest.chars().take_while(|c| c.is_whitespace()).map(|c| c.len_utf8()).sum();
            self.offset += ws_bytes;

            let rest = self.remaining();
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.offset += len;
            } else if rest.starts_with("/*") {
                if let Some(end) = rest[2..].find("*/") {
                    self.offset += end + 4;
                } else {
                    // unterminated block comment: consume to EOF, the lexer
                    // loop will then report a clean EOF/unterminated-string
                    // style error if something was actually expected here.
                    self.offset = self.source.contents.len();
                }
            }

            if self.offset == before {
                break;
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token, Syntax> {
        let start = self.offset;
        self.offset += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.remaining().chars().next() {
                None => return Err(Syntax::lex(self.span(start), "Unterminated string literal")),
                Some('"') => {
                    self.offset += 1;
                    break;
                }
                Some('\\') => {
                    self.offset += 1;
                    let escaped = self.remaining().chars().next().ok_or_else(|| {
                        Syntax::lex(self.span(start), "Unterminated string literal")
                    })?;
                    value.push(match escaped {
                        '"' => '"',
                        '\\' => '\\',
                        'n' => '\n',
                        't' => '\t',
                        other => {
                            return Err(Syntax::lex(
                                self.span(start),
                                format!("Unknown escape code '\\{}'", other),
                            ))
                        }
                    });
                    self.offset += escaped.len_utf8();
                }
                Some(c) => {
                    value.push(c);
                    self.offset += c.len_utf8();
                }
            }
        }
        Ok(Spanned::new(TokenKind::String(value), self.span(start)))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.offset;
        let len = self.remaining().chars().take_while(|c| c.is_ascii_digit()).count();
        self.offset += len;
        let text = &self.source.contents[start..self.offset];
        let value: i32 = text.parse().unwrap_or(0);
        Spanned::new(TokenKind::Number(value), self.span(start))
    }

    fn lex_symbol(&mut self) -> Token {
        let start = self.offset;
        let len = self
            .remaining()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        self.offset += len;
        let text = &self.source.contents[start..self.offset];
        let kind = match text {
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "define" => TokenKind::Define,
            "int" => TokenKind::Type(TypeName::Int),
            "string" => TokenKind::Type(TypeName::Str),
            _ => TokenKind::Identifier(text.to_string()),
        };
        Spanned::new(kind, self.span(start))
    }

    /// Recognizes an operator, preferring the longest match (e.g. `==` over
    /// `=`), matching the original scanner's greedy strategy. Operators the
    /// grammar doesn't wire up yet lex as `Unsupported` rather than a hard
    /// error, so adding one later only touches the parser.
    fn lex_operator(&mut self) -> Option<Token> {
        const TWO_CHAR: &[(&str, TokenKind)] = &[("==", TokenKind::Eq)];
        const ONE_CHAR: &[(char, TokenKind)] = &[
            ('+', TokenKind::Add),
            ('-', TokenKind::Sub),
            ('*', TokenKind::Mul),
            ('/', TokenKind::Div),
            ('<', TokenKind::Lt),
            ('>', TokenKind::Gt),
            ('(', TokenKind::OpenParen),
            (')', TokenKind::CloseParen),
            (':', TokenKind::Colon),
        ];
        const FUTURE: &[&str] =
            &["!=", "<=", ">=", "&&", "||", "++", "--", "%", "&", "|", "^", "~", "!", "="];

        let start = self.offset;
        let rest = self.remaining();

        for (lit, kind) in TWO_CHAR {
            if rest.starts_with(lit) {
                self.offset += lit.len();
                return Some(Spanned::new(kind.clone(), self.span(start)));
            }
        }
        for lit in FUTURE {
            if rest.starts_with(lit) {
                self.offset += lit.len();
                return Some(Spanned::new(
                    TokenKind::Unsupported(lit.to_string()),
                    self.span(start),
                ));
            }
        }
        for (lit, kind) in ONE_CHAR {
            if rest.starts_with(*lit) {
                self.offset += lit.len_utf8();
                return Some(Spanned::new(kind.clone(), self.span(start)));
            }
        }
        None
    }

    fn next(&mut self) -> Result<Token, Syntax> {
        self.skip_whitespace_and_comments();

        let start = self.offset;
        match self.remaining().chars().next() {
            None => Ok(Spanned::new(TokenKind::Eof, Span::point(&self.source, start))),
            Some('"') => self.lex_string(),
            Some(c) if c.is_ascii_digit() => Ok(self.lex_number()),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => Ok(self.lex_symbol()),
            Some(_) => self.lex_operator().ok_or_else(|| {
                Syntax::lex(Span::point(&self.source, start), "Unrecognized character")
            }),
        }
    }
}

/// Lexes a whole source into a token stream, always ending in exactly one
/// `Eof` token.
pub fn lex(source: Rc<Source>) -> Result<Vec<Token>, Syntax> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next()?;
        log::trace!("lexed {:?}", token.item);
        let done = matches!(token.item, TokenKind::Eof);
        tokens.push(token);
        if done {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(Source::source(source)).unwrap().into_iter().map(|t| t.item).collect()
    }

    #[test]
    fn lexes_a_simple_call() {
        assert_eq!(
            kinds("(+ 2 3)"),
            vec![
                TokenKind::OpenParen,
                TokenKind::Add,
                TokenKind::Number(2),
                TokenKind::Number(3),
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(
            kinds("(+ 1 /* two */ 2) // trailing"),
            vec![
                TokenKind::OpenParen,
                TokenKind::Add,
                TokenKind::Number(1),
                TokenKind::Number(2),
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#"("a\nb")"#),
            vec![
                TokenKind::OpenParen,
                TokenKind::String("a\nb".to_string()),
                TokenKind::CloseParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        assert!(lex(Source::source("(\"unterminated")).is_err());
    }

    #[test]
    fn reserved_words_and_types() {
        assert_eq!(
            kinds("let a : int"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("a".to_string()),
                TokenKind::Colon,
                TokenKind::Type(TypeName::Int),
                TokenKind::Eof,
            ]
        );
    }
}
