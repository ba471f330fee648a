//! Renders the program as a human-readable listing, written to
//! `bytecode.txt` after each successful compile pass. One line per word:
//! `NNNN opcode [operand [(value = …)]]`.

use std::convert::TryFrom;
use std::fmt::Write as _;

use crate::compiler::opcode::Instruction;
use crate::compiler::value::Value;
use crate::vm::vm::Vm;

fn describe_value(vm: &Vm, addr: i32) -> Option<String> {
    let value = vm.values.get(addr as usize)?;
    Some(match value {
        Value::Number(n) => format!("{}", n),
        Value::String(slice) => format!("{:?}", vm.strings.get(*slice)),
        Value::Function(f) => format!("function@{} argc={}", f.address, f.argc),
        Value::Native(n) => format!("native argc={}", n.argc),
        Value::Unknown => "unknown".to_string(),
    })
}

/// Disassembles `vm.program` into the `bytecode.txt` listing format.
pub fn disassemble(vm: &Vm) -> String {
    let mut out = String::new();
    let mut ip = 0usize;
    while ip < vm.program.len() {
        let word = vm.program[ip];
        let Ok(op) = Instruction::try_from(word) else {
            writeln!(out, "{:04} <bad opcode {}>", ip, word).unwrap();
            ip += 1;
            continue;
        };

        if op.has_operand() {
            let operand = vm.program.get(ip + 1).copied().unwrap_or(0);
            match describe_value(vm, operand) {
                Some(desc) if matches!(op, Instruction::Push | Instruction::Call | Instruction::Assign) => {
                    writeln!(out, "{:04} {:<10} {:<6} (value = {})", ip, op.mnemonic(), operand, desc)
                        .unwrap();
                }
                _ => {
                    writeln!(out, "{:04} {:<10} {}", ip, op.mnemonic(), operand).unwrap();
                }
            }
            ip += 2;
        } else {
            writeln!(out, "{:04} {}", ip, op.mnemonic()).unwrap();
            ip += 1;
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::value::Value;

    #[test]
    fn disassembles_a_push_with_its_value() {
        let mut vm = Vm::new();
        let addr = vm.values.push(Value::Number(7));
        vm.program = vec![Instruction::Push.into(), addr as i32, Instruction::Return.into()];
        let text = disassemble(&vm);
        assert!(text.contains("PUSH"));
        assert!(text.contains("(value = 7)"));
        assert!(text.contains("0002 RETURN"));
    }
}
