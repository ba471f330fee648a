//! The bytecode instruction set. The program is a flat vector of 32-bit
//! words; most opcodes consume one following word as an immediate operand.

use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Exit,
    Nop,
    Push,
    PushArg,
    Pop,
    Assign,
    CondJump,
    Jump,
    Call,
    LocalCall,
    Return,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Eq,
}

impl Instruction {
    /// Whether this opcode consumes one immediate operand word.
    pub fn has_operand(&self) -> bool {
        matches!(
            self,
            Instruction::Push
                | Instruction::PushArg
                | Instruction::Assign
                | Instruction::CondJump
                | Instruction::Jump
                | Instruction::Call
                | Instruction::LocalCall
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Exit => "EXIT",
            Instruction::Nop => "NOP",
            Instruction::Push => "PUSH",
            Instruction::PushArg => "PUSH_ARG",
            Instruction::Pop => "POP",
            Instruction::Assign => "ASSIGN",
            Instruction::CondJump => "COND_JUMP",
            Instruction::Jump => "JUMP",
            Instruction::Call => "CALL",
            Instruction::LocalCall => "LOCAL_CALL",
            Instruction::Return => "RETURN",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::Mul => "MUL",
            Instruction::Div => "DIV",
            Instruction::Lt => "LT",
            Instruction::Gt => "GT",
            Instruction::Eq => "EQ",
        }
    }
}

impl From<Instruction> for i32 {
    fn from(op: Instruction) -> i32 {
        op as i32
    }
}

/// Decoding a raw word back into an opcode is a checked conversion rather
/// than a pointer-cast, so a corrupted program word is a clean panic at the
/// point of decode instead of undefined behavior - the caller treats it as
/// fatal, the same as an invalid value-pool address.
impl TryFrom<i32> for Instruction {
    type Error = ();

    fn try_from(word: i32) -> Result<Instruction, ()> {
        Ok(match word {
            0 => Instruction::Exit,
            1 => Instruction::Nop,
            2 => Instruction::Push,
            3 => Instruction::PushArg,
            4 => Instruction::Pop,
            5 => Instruction::Assign,
            6 => Instruction::CondJump,
            7 => Instruction::Jump,
            8 => Instruction::Call,
            9 => Instruction::LocalCall,
            10 => Instruction::Return,
            11 => Instruction::Add,
            12 => Instruction::Sub,
            13 => Instruction::Mul,
            14 => Instruction::Div,
            15 => Instruction::Lt,
            16 => Instruction::Gt,
            17 => Instruction::Eq,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_every_opcode() {
        let ops = [
            Instruction::Exit,
            Instruction::Nop,
            Instruction::Push,
            Instruction::PushArg,
            Instruction::Pop,
            Instruction::Assign,
            Instruction::CondJump,
            Instruction::Jump,
            Instruction::Call,
            Instruction::LocalCall,
            Instruction::Return,
            Instruction::Add,
            Instruction::Sub,
            Instruction::Mul,
            Instruction::Div,
            Instruction::Lt,
            Instruction::Gt,
            Instruction::Eq,
        ];
        for op in ops {
            let word: i32 = op.into();
            assert_eq!(Instruction::try_from(word), Ok(op));
        }
    }

    #[test]
    fn bad_opcode_word_fails_to_decode() {
        assert!(Instruction::try_from(999).is_err());
    }

    #[test]
    fn operand_bearing_opcodes_are_flagged() {
        assert!(Instruction::Push.has_operand());
        assert!(Instruction::Jump.has_operand());
        assert!(!Instruction::Return.has_operand());
        assert!(!Instruction::Add.has_operand());
    }
}
