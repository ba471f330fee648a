//! A small Lisp-style expression language: a recursive-descent parser, a
//! single-pass bytecode compiler with transactional rollback, and a
//! stack-based virtual machine. Supports incremental, REPL-style
//! compilation: each entry is parsed and compiled onto the end of an
//! existing program, then run from where the last entry left off.

pub mod common;
pub mod compiler;
pub mod core;
pub mod repl;
pub mod vm;
