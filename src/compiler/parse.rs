//! Recursive-descent parser. Builds the [`Ast`] shapes documented on
//! [`crate::compiler::ast::Ast`] out of a token stream produced by
//! [`crate::compiler::lex::lex`].
//!
//! ```text
//! program        := simple_expr_one*
//! expression     := '(' simple_expr ')'
//! simple_expr    := (let | if | define | op_expr | atom | expression)*
//! let            := 'let' IDENT (':' typename)? simple_expr
//! if             := 'if' expression expression expression?
//! define         := 'define' IDENT '(' IDENT* ')' simple_expr
//! op_expr        := OP simple_expr
//! atom           := NUMBER | STRING | IDENT
//! ```

use crate::common::span::{Span, Spanned};
use crate::common::token::{Token, TokenKind};
use crate::compiler::ast::Ast;
use crate::compiler::error::Syntax;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().item, TokenKind::Eof)
    }

    fn at_close_paren(&self) -> bool {
        matches!(self.peek().item, TokenKind::CloseParen)
    }

    fn expect_identifier(&mut self) -> Result<Spanned<String>, Syntax> {
        match self.peek().item.clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok(Spanned::new(name, span))
            }
            other => Err(Syntax::parse(
                self.peek().span.clone(),
                format!("Expected identifier, found {}", other.describe()),
            )),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, Syntax> {
        if &self.peek().item == kind {
            Ok(self.advance())
        } else {
            Err(Syntax::parse(
                self.peek().span.clone(),
                format!("Expected {}, found {}", what, self.peek().item.describe()),
            ))
        }
    }

    /// Parses zero or more identifiers up to (but not consuming) the closing
    /// paren of a `define`'s parameter list.
    fn func_args(&mut self) -> Result<Vec<Ast>, Syntax> {
        let mut args = Vec::new();
        loop {
            if matches!(self.peek().item, TokenKind::CloseParen) {
                return Ok(args);
            }
            let ident = self.expect_identifier()?;
            args.push(Ast::leaf(Spanned::new(TokenKind::Identifier(ident.item), ident.span)));
        }
    }

    /// `'(' simple_expr ')'`
    fn expression(&mut self) -> Result<Ast, Syntax> {
        let open = self.peek().span.clone();
        if !matches!(self.peek().item, TokenKind::OpenParen) {
            return Err(Syntax::parse(
                self.peek().span.clone(),
                format!("Expected expression, found {}", self.peek().item.describe()),
            ));
        }
        self.advance();

        let children = self.simple_expr()?;

        if !self.at_close_paren() {
            return Err(Syntax::parse(
                Span::combine(&open, &self.peek().span),
                "Missing closing ')' parenthesis in expression",
            ));
        }
        let close = self.advance().span;
        Ok(Ast::new(Spanned::new(TokenKind::OpenParen, Span::combine(&open, &close)), children))
    }

    /// An `EXPR` branch that must contain exactly one child - used for a
    /// `let`'s value and an `if`'s branches, so the compiler can address
    /// them by fixed index even when a branch is conceptually absent. The
    /// one child can be a bare atom, an operator form, or a fully
    /// parenthesized sub-expression - a `let`'s value and an `if`'s
    /// then-branch are both seen written either way.
    fn expr_branch(&mut self) -> Result<Ast, Syntax> {
        let item = self.simple_expr_one()?;
        Ok(Ast::new(item.token.clone(), vec![item]))
    }

    fn empty_expr_branch(span: Span) -> Ast {
        Ast::new(Spanned::new(TokenKind::OpenParen, span), Vec::new())
    }

    fn simple_expr(&mut self) -> Result<Vec<Ast>, Syntax> {
        let mut children = Vec::new();
        while !self.at_eof() && !self.at_close_paren() {
            let token = self.peek().clone();
            match token.item {
                ref op if op.is_binary_op() => {
                    self.advance();
                    let mut operands = Vec::new();
                    // Operands are whatever the next simple_expr parses;
                    // exactly two are required.
                    while !self.at_eof() && !self.at_close_paren() && operands.len() < 2 {
                        operands.push(self.simple_expr_one()?);
                    }
                    if operands.len() != 2 {
                        return Err(Syntax::parse(
                            token.span,
                            format!(
                                "Invalid number of parameters (got {}, should be 2)",
                                operands.len()
                            ),
                        ));
                    }
                    children.push(Ast::new(token, operands));
                }
                TokenKind::Let => {
                    children.push(self.parse_let(token)?);
                }
                TokenKind::If => {
                    children.push(self.parse_if(token)?);
                }
                TokenKind::Define => {
                    children.push(self.parse_define(token)?);
                }
                TokenKind::Number(_) | TokenKind::String(_) | TokenKind::Identifier(_) => {
                    self.advance();
                    children.push(Ast::leaf(token));
                }
                TokenKind::OpenParen => {
                    children.push(self.expression()?);
                }
                _ => {
                    let span = self.advance().span;
                    log::warn!("unexpected token {} consumed to regain sync", token.item.describe());
                    return Err(Syntax::parse(
                        span,
                        format!("Unrecognized token '{}'", token.item.describe()),
                    ));
                }
            }
        }
        Ok(children)
    }

    /// Parses exactly one "thing" inside a `simple_expr` sequence, used when
    /// an operator needs exactly two sibling operands rather than a whole
    /// run of them. Shares every case with `simple_expr` but consumes only
    /// one node.
    fn simple_expr_one(&mut self) -> Result<Ast, Syntax> {
        let token = self.peek().clone();
        match token.item {
            ref op if op.is_binary_op() => {
                self.advance();
                let mut operands = Vec::new();
                while !self.at_eof() && !self.at_close_paren() && operands.len() < 2 {
                    operands.push(self.simple_expr_one()?);
                }
                if operands.len() != 2 {
                    return Err(Syntax::parse(
                        token.span,
                        format!(
                            "Invalid number of parameters (got {}, should be 2)",
                            operands.len()
                        ),
                    ));
                }
                Ok(Ast::new(token, operands))
            }
            TokenKind::Let => self.parse_let(token),
            TokenKind::If => self.parse_if(token),
            TokenKind::Define => self.parse_define(token),
            TokenKind::Number(_) | TokenKind::String(_) | TokenKind::Identifier(_) => {
                self.advance();
                Ok(Ast::leaf(token))
            }
            TokenKind::OpenParen => self.expression(),
            _ => {
                let span = self.advance().span;
                log::warn!("unexpected token {} consumed to regain sync", token.item.describe());
                Err(Syntax::parse(span, format!("Unrecognized token '{}'", token.item.describe())))
            }
        }
    }

    /// `'let' IDENT (':' typename)? simple_expr` - the value branch holds
    /// exactly one child.
    fn parse_let(&mut self, let_token: Token) -> Result<Ast, Syntax> {
        self.advance(); // 'let'
        let ident = self.expect_identifier()?;
        let mut ident_children = Vec::new();

        if matches!(self.peek().item, TokenKind::Colon) {
            self.advance();
            match self.peek().item.clone() {
                TokenKind::Type(_) | TokenKind::Identifier(_) => {
                    let type_token = self.advance();
                    ident_children.push(Ast::leaf(type_token));
                }
                other => {
                    return Err(Syntax::parse(
                        self.peek().span.clone(),
                        format!("The type '{}' is not defined", other.describe()),
                    ));
                }
            }
        }

        let ident_node =
            Ast::new(Spanned::new(TokenKind::Identifier(ident.item), ident.span), ident_children);

        let value_node = self.expr_branch()?;
        if value_node.child_count() != 1 {
            return Err(Syntax::parse(
                let_token.span,
                "Invalid number of expressions given in value definition",
            ));
        }

        Ok(Ast::new(let_token, vec![ident_node, value_node]))
    }

    /// `'if' expression expression expression?` - all three branches are
    /// always allocated, with zero children when the else branch is absent,
    /// so the compiler can index them fixedly.
    fn parse_if(&mut self, if_token: Token) -> Result<Ast, Syntax> {
        self.advance(); // 'if'

        let cond = self.expr_branch().map_err(|_| {
            Syntax::parse(if_token.span.clone(), "Missing condition in if expression")
        })?;
        let then_branch = self.expr_branch().map_err(|_| {
            Syntax::parse(if_token.span.clone(), "Missing if body")
        })?;

        let else_branch = if !self.at_eof() && !self.at_close_paren() {
            self.expr_branch()?
        } else {
            Self::empty_expr_branch(self.peek().span.clone())
        };

        Ok(Ast::new(if_token, vec![cond, then_branch, else_branch]))
    }

    /// `'define' IDENT '(' IDENT* ')' simple_expr`
    fn parse_define(&mut self, define_token: Token) -> Result<Ast, Syntax> {
        self.advance(); // 'define'
        let ident = self.expect_identifier()?;
        let ident_node =
            Ast::leaf(Spanned::new(TokenKind::Identifier(ident.item), ident.span));

        self.expect(&TokenKind::OpenParen, "'(' to begin parameter list")?;
        let params = self.func_args()?;
        self.expect(&TokenKind::CloseParen, "')' to end parameter list")?;
        let args_node = Ast::new(Spanned::new(TokenKind::OpenParen, define_token.span.clone()), params);

        let body_children = self.simple_expr()?;
        let body_node = Ast::new(
            Spanned::new(TokenKind::OpenParen, define_token.span.clone()),
            body_children,
        );

        Ok(Ast::new(define_token, vec![ident_node, args_node, body_node]))
    }
}

/// Parses a whole token stream into one top-level expression forest. Each
/// element is usually a parenthesized form, but - matching `expr_branch`'s
/// own leniency - a bare atom or operator form is accepted too, since a
/// top-level input reading back a previous binding by name (`r`) is legal.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Ast>, Syntax> {
    let mut parser = Parser::new(tokens);
    let mut expressions = Vec::new();
    while !parser.at_eof() {
        expressions.push(parser.simple_expr_one()?);
    }
    Ok(expressions)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;
    use crate::compiler::lex::lex;

    fn parse_src(src: &str) -> Result<Vec<Ast>, Syntax> {
        parse(lex(Source::source(src)).unwrap())
    }

    #[test]
    fn parses_a_binary_op() {
        let forest = parse_src("(+ 2 3)").unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].child_count(), 1);
        assert_eq!(forest[0].children[0].child_count(), 2);
    }

    #[test]
    fn binary_op_requires_two_operands() {
        assert!(parse_src("(+ 1)").is_err());
    }

    #[test]
    fn let_requires_exactly_one_value_expression() {
        assert!(parse_src("(let a)").is_err());
    }

    #[test]
    fn if_without_else_allocates_an_empty_branch() {
        let forest = parse_src("(if (== n 5) (let r 1))").unwrap();
        let if_node = &forest[0].children[0];
        assert_eq!(if_node.child_count(), 3);
        assert_eq!(if_node.children[2].child_count(), 0);
    }

    #[test]
    fn define_parses_params_and_body() {
        let forest = parse_src("(define add (x y) (+ x y))").unwrap();
        let define_node = &forest[0].children[0];
        assert_eq!(define_node.children[1].child_count(), 2); // params
        assert_eq!(define_node.children[2].child_count(), 1); // body
    }

    #[test]
    fn let_with_bad_type_fails() {
        assert!(parse_src("(let a:what 1)").is_err());
    }
}
