//! The Finch compiler: lexer, parser, and bytecode emitter.
//!
//! Source text flows through three stages, each of which can fail with a
//! [`error::Syntax`] error:
//!
//! 1. [`lex::lex`] turns a [`crate::common::Source`] into a token stream.
//! 2. [`parse::parse`] builds an [`ast::Ast`] forest (one tree per top-level
//!    expression) out of that stream.
//! 3. [`emit::compile_pass`] walks the forest, resolving symbols against the
//!    running [`crate::vm::Vm`]'s global state and a stack of compile-time
//!    [`function_state::FunctionState`]s, and appends instructions and values
//!    to the VM. A failed pass rolls back everything it emitted.

pub mod ast;
pub mod disasm;
pub mod emit;
pub mod error;
pub mod function_state;
pub mod lex;
pub mod opcode;
pub mod parse;
pub mod symbol;
pub mod value;

pub use error::{Syntax, SyntaxKind};
