use crate::common::token::Token;

/// An AST node: a tagged token with an ordered sequence of child branches.
/// Every shape in the grammar (`let`, `if`, `define`, binary operators,
/// generic expression groups, and leaves) is this same generic node -
/// there's no enum per shape, since the compiler dispatches purely on the
/// node's token kind, matching the source language's own minimal grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub token: Token,
    pub children: Vec<Ast>,
}

impl Ast {
    pub fn leaf(token: Token) -> Ast {
        Ast { token, children: Vec::new() }
    }

    pub fn new(token: Token, children: Vec<Ast>) -> Ast {
        Ast { token, children }
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Option<&Ast> {
        self.children.get(index)
    }
}
