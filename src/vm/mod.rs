//! The stack-based virtual machine: bytecode interpreter, call protocol,
//! and runtime error reporting.

pub mod trace;
pub mod vm;

pub use trace::Trace;
pub use vm::Vm;
