//! Datastructures shared between the compiler and the VM: source text,
//! source-location tracking (`Span`), and tokens.

pub mod source;
pub mod span;
pub mod token;

pub use source::Source;
pub use span::{Span, Spanned};
pub use token::{Token, TokenKind, TypeName};
