//! Interactive incremental execution: each entry is parsed, compiled onto
//! the end of the existing program (with rollback on failure), then run
//! from the saved instruction pointer up to the trailing `RETURN`, letting
//! successive entries share earlier `let`/`define` bindings.

use std::fmt;

use crate::compiler::disasm;
use crate::compiler::emit::compile_pass;
use crate::compiler::error::Syntax;
use crate::compiler::lex::lex;
use crate::compiler::opcode::Instruction;
use crate::compiler::parse::parse;
use crate::common::source::Source;
use crate::vm::trace::Trace;
use crate::vm::vm::Vm;

#[derive(Debug)]
pub enum ExecError {
    Syntax(Syntax),
    Runtime(Trace),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Syntax(e) => write!(f, "{}", e),
            ExecError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl From<Syntax> for ExecError {
    fn from(e: Syntax) -> ExecError {
        ExecError::Syntax(e)
    }
}

impl From<Trace> for ExecError {
    fn from(e: Trace) -> ExecError {
        ExecError::Runtime(e)
    }
}

/// Runs one REPL/file entry's worth of source against `vm`. Returns the
/// values left on the stack after the new code ran, for the caller to print
/// as diagnostics. Writes `bytecode.txt` after every successful compile,
/// matching the non-interactive debug dump.
pub fn vm_exec(vm: &mut Vm, source: &str) -> Result<Vec<crate::compiler::value::Value>, ExecError> {
    let tokens = lex(Source::source(source))?;
    let forest = parse(tokens)?;

    compile_pass(vm, &forest)?;
    // A successful pass always appends at least a trailing RETURN, so the
    // program strictly grew; the REPL always has something to run here.
    log::info!("pass compiled, program grew to {} words from ip {}", vm.program.len(), vm.saved_ip);

    std::fs::write("bytecode.txt", disasm::disassemble(vm)).ok();

    vm.execute_from(vm.saved_ip, 0)?;
    let result = vm.stack_values().to_vec();

    // The pass just run ends in a RETURN; shrink it off so the next pass's
    // instructions append directly where this one's body left off.
    debug_assert_eq!(vm.program.last().copied(), Some(Instruction::Return.into()));
    vm.program.pop();
    vm.saved_ip = vm.program.len();
    vm.clear_stack();

    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::value::Value;
    use crate::core::install_natives;

    #[test]
    fn successive_entries_share_bindings() {
        let mut vm = Vm::new();
        install_natives(&mut vm);

        vm_exec(&mut vm, "(let a 10)").unwrap();
        vm_exec(&mut vm, "(let b (+ a 5))").unwrap();
        let result = vm_exec(&mut vm, "(+ a b)").unwrap();
        assert_eq!(result, vec![Value::Number(25)]);
    }

    #[test]
    fn a_failed_entry_does_not_disturb_later_entries() {
        let mut vm = Vm::new();
        install_natives(&mut vm);

        assert!(vm_exec(&mut vm, "(let a)").is_err());
        let result = vm_exec(&mut vm, "(+ 1 2)").unwrap();
        assert_eq!(result, vec![Value::Number(3)]);
    }
}
