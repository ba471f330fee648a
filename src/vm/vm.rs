//! The stack-based interpreter. A [`Vm`] owns everything that persists
//! across interactive entries: the program, the value pool, the string
//! arena, and the global symbol table. Call frames live only on the Rust
//! call stack - a nested bytecode call recurses into [`Vm::execute_from`]
//! rather than maintaining an explicit frame list.

use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;

use crate::common::span::Span;
use crate::compiler::emit::ValueType;
use crate::compiler::opcode::Instruction;
use crate::compiler::symbol::SymbolTable;
use crate::compiler::value::{Function, Native, StringArena, Value, ValuePool};
use crate::vm::trace::Trace;

/// Fixed operand-stack capacity. Pushing past this is a stack overflow,
/// not a reallocation - a generous bound on call depth that also makes
/// runaway recursion fail predictably rather than growing unboundedly.
pub const STACK_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Error(String),
}

pub struct Vm {
    stack: Vec<Value>,
    stack_top: usize,

    pub program: Vec<i32>,
    ip: usize,
    /// Where the next `vm_exec` pass should resume execution from; advanced
    /// past the trailing `RETURN` of each successful pass.
    pub saved_ip: usize,

    pub values: ValuePool,
    pub strings: StringArena,
    pub global_symbols: SymbolTable,

    /// Tracks the inferred/declared type of each value-pool address that a
    /// `let` or `define` has bound, so a later pass's identifier lookups
    /// can still type-check against it. Persists across passes like
    /// `global_symbols` does; a per-pass `Emitter` only ever adds entries
    /// here, never removes them (rollback removing the backing value slot
    /// makes an orphaned entry harmless - it is never looked up again since
    /// its address is never reused).
    pub declared_types: HashMap<usize, ValueType>,

    /// Maps a program address to the span of the AST node whose compiled
    /// code starts there, tagged once per node at
    /// [`crate::compiler::emit::Emitter::generate`]'s entry. A runtime fault
    /// looks up the nearest address at or before the faulting `ip` to find
    /// the span to blame - instructions mid-expression share their node's
    /// span rather than each getting their own entry.
    pub spans: BTreeMap<usize, Span>,

    pub status: Status,
}

impl Vm {
    pub fn new() -> Vm {
        Vm {
            stack: vec![Value::Unknown; STACK_CAPACITY],
            stack_top: 0,
            program: Vec::new(),
            ip: 0,
            saved_ip: 0,
            values: ValuePool::new(),
            strings: StringArena::new(),
            global_symbols: SymbolTable::new(),
            declared_types: HashMap::new(),
            spans: BTreeMap::new(),
            status: Status::Ready,
        }
    }

    /// The span of the node whose code contains `ip`, found by walking
    /// backward from `ip` to the nearest tagged address. Empty if nothing
    /// was ever tagged at or before `ip` (only possible before any code has
    /// been compiled).
    pub fn span_at(&self, ip: usize) -> Span {
        self.spans.range(..=ip).next_back().map(|(_, span)| span.clone()).unwrap_or_else(Span::empty)
    }

    /// Builds a [`Trace`] carrying the span of the instruction at the
    /// current `ip` as its innermost frame. Used by natives as well as the
    /// interpreter loop itself, so a failing native reports the same way a
    /// failing opcode does.
    pub fn error(&self, message: impl Into<String>) -> Trace {
        let span = self.span_at(self.ip.saturating_sub(1));
        Trace { message: message.into(), spans: vec![span] }
    }

    pub fn stack_top(&self) -> usize {
        self.stack_top
    }

    /// Leaves bound values untouched; only the operand stack is cleared,
    /// matching the interactive driver's "clear the stack top" step between
    /// passes.
    pub fn clear_stack(&mut self) {
        self.stack_top = 0;
    }

    pub fn stack_values(&self) -> &[Value] {
        &self.stack[..self.stack_top]
    }

    fn push(&mut self, value: Value) -> Result<(), Trace> {
        if self.stack_top == STACK_CAPACITY {
            self.status = Status::Error("Stack overflow".to_string());
            return Err(self.error("Stack overflow"));
        }
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        debug_assert!(self.stack_top > 0, "popped an empty operand stack");
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    fn fetch(&mut self) -> i32 {
        let word = self.program[self.ip];
        self.ip += 1;
        word
    }

    fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => self.strings.get(x) == self.strings.get(y),
            (Value::Function(x), Value::Function(y)) => x.address == y.address,
            (Value::Native(x), Value::Native(y)) => {
                std::ptr::eq(x.func as *const (), y.func as *const ())
            }
            _ => false,
        }
    }

    fn binary_numeric(&mut self, op: Instruction) -> Result<(), Trace> {
        let rhs = self.pop();
        let lhs = self.pop();
        let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
            self.status = Status::Error("Invalid types in arithmetic operation".to_string());
            return Err(self.error("Invalid types in arithmetic operation"));
        };
        let result = match op {
            Instruction::Add => Value::Number(a.wrapping_add(b)),
            Instruction::Sub => Value::Number(a.wrapping_sub(b)),
            Instruction::Mul => Value::Number(a.wrapping_mul(b)),
            Instruction::Div => {
                if b == 0 {
                    self.status = Status::Error("Division by zero".to_string());
                    return Err(self.error("Division by zero"));
                }
                Value::Number(a.wrapping_div(b))
            }
            Instruction::Lt => Value::Number((a < b) as i32),
            Instruction::Gt => Value::Number((a > b) as i32),
            _ => unreachable!("binary_numeric called with a non-arithmetic opcode"),
        };
        self.push(result)
    }

    /// Invokes a callee value with `argc` arguments already sitting on top
    /// of the stack, implementing the call protocol shared by `CALL` and
    /// `LOCAL_CALL`.
    ///
    /// Resolves this crate's version of an open question left in the
    /// source design: rather than the ambiguous `stack_top = base - 2`
    /// branch for a zero-result native call, the frame collapses to
    /// exactly `base` - consuming only the arguments that were pushed,
    /// with no sentinel words assumed.
    fn invoke(&mut self, callee: Value, declared_argc: usize) -> Result<(), Trace> {
        // Taken before any nested frame runs, so it names this call site
        // (the CALL/LOCAL_CALL instruction itself), not wherever the callee
        // later faults.
        let call_site = self.span_at(self.ip.saturating_sub(1));

        if self.stack_top < declared_argc {
            self.status = Status::Error("Invalid number of arguments".to_string());
            return Err(self.error("Invalid number of arguments"));
        }
        let base = self.stack_top - declared_argc;

        match callee {
            Value::Native(Native { func, .. }) => {
                let args = self.stack[base..self.stack_top].to_vec();
                let produced = func(self, &args)?;
                match produced {
                    Some(value) => {
                        self.stack[base] = value;
                        self.stack_top = base + 1;
                    }
                    None => self.stack_top = base,
                }
                Ok(())
            }
            Value::Function(Function { address, .. }) => {
                let saved_ip = self.ip;
                let old_stack_top = self.stack_top;
                match self.execute_from(address, base) {
                    Ok(()) => {
                        let ret_count = self.stack_top - old_stack_top;
                        if ret_count >= 1 {
                            let top = self.stack[self.stack_top - 1];
                            self.stack[base] = top;
                            self.stack_top = base + 1;
                        } else {
                            self.stack_top = base;
                        }
                        self.ip = saved_ip;
                        Ok(())
                    }
                    Err(mut trace) => {
                        trace.spans.push(call_site);
                        Err(trace)
                    }
                }
            }
            _ => {
                self.status = Status::Error("Cannot call a non-function value".to_string());
                Err(self.error("Cannot call a non-function value"))
            }
        }
    }

    /// Runs instructions starting at `start_ip` until a `RETURN` or `EXIT`
    /// at this nesting level; `base` is this frame's `PUSH_ARG` origin.
    /// Nested calls recurse through [`Vm::invoke`], so a `RETURN` inside a
    /// callee is consumed by that callee's own call to this function and
    /// never escapes to an outer frame.
    pub fn execute_from(&mut self, start_ip: usize, base: usize) -> Result<(), Trace> {
        self.ip = start_ip;
        loop {
            let word = self.fetch();
            let op = Instruction::try_from(word)
                .unwrap_or_else(|_| panic!("corrupted opcode word {} at address {}", word, self.ip - 1));

            log::trace!("{:04} {}", self.ip - 1, op.mnemonic());

            match op {
                Instruction::Exit => return Ok(()),
                Instruction::Nop => {}
                Instruction::Push => {
                    let addr = self.fetch() as usize;
                    let value = *self
                        .values
                        .get(addr)
                        .unwrap_or_else(|| panic!("PUSH referenced an invalid address {}", addr));
                    self.push(value)?;
                }
                Instruction::PushArg => {
                    let slot = self.fetch() as usize;
                    let value = self.stack[base + slot];
                    self.push(value)?;
                }
                Instruction::Pop => {
                    self.pop();
                }
                Instruction::Assign => {
                    let addr = self.fetch() as usize;
                    let value = self.pop();
                    self.values.set(addr, value);
                }
                Instruction::CondJump => {
                    let offset = self.fetch();
                    let value = self.pop();
                    if !value.is_truthy() {
                        self.ip = (self.ip as i32 + offset) as usize;
                    }
                }
                Instruction::Jump => {
                    let offset = self.fetch();
                    self.ip = (self.ip as i32 + offset) as usize;
                }
                Instruction::Call => {
                    let addr = self.fetch() as usize;
                    let callee = *self
                        .values
                        .get(addr)
                        .unwrap_or_else(|| panic!("CALL referenced an invalid address {}", addr));
                    let argc = match callee {
                        Value::Function(f) => f.argc,
                        Value::Native(n) => n.argc,
                        _ => {
                            self.status =
                                Status::Error("Cannot call a non-function value".to_string());
                            return Err(self.error("Cannot call a non-function value"));
                        }
                    };
                    self.invoke(callee, argc)?;
                }
                Instruction::LocalCall => {
                    let argc = self.fetch() as usize;
                    let callee = self.pop();
                    self.invoke(callee, argc)?;
                }
                Instruction::Return => return Ok(()),
                Instruction::Add
                | Instruction::Sub
                | Instruction::Mul
                | Instruction::Div
                | Instruction::Lt
                | Instruction::Gt => self.binary_numeric(op)?,
                Instruction::Eq => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let equal = self.values_equal(lhs, rhs);
                    self.push(Value::Number(equal as i32))?;
                }
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::opcode::Instruction;

    fn prog(words: &[i32]) -> Vec<i32> {
        words.to_vec()
    }

    #[test]
    fn add_pushes_the_sum() {
        let mut vm = Vm::new();
        let a = vm.values.push(Value::Number(2));
        let b = vm.values.push(Value::Number(3));
        vm.program = prog(&[
            Instruction::Push.into(),
            a as i32,
            Instruction::Push.into(),
            b as i32,
            Instruction::Add.into(),
            Instruction::Return.into(),
        ]);
        vm.execute_from(0, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(5)]);
    }

    #[test]
    fn cond_jump_skips_the_then_branch_when_falsy() {
        let mut vm = Vm::new();
        let zero = vm.values.push(Value::Number(0));
        let skipped = vm.values.push(Value::Number(111));
        let landed = vm.values.push(Value::Number(222));
        vm.program = prog(&[
            Instruction::Push.into(),
            zero as i32,
            Instruction::CondJump.into(),
            2, // skip the PUSH of `skipped`
            Instruction::Push.into(),
            skipped as i32,
            Instruction::Push.into(),
            landed as i32,
            Instruction::Return.into(),
        ]);
        vm.execute_from(0, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(222)]);
    }

    #[test]
    fn stack_overflow_is_reported_cleanly() {
        let mut vm = Vm::new();
        let one = vm.values.push(Value::Number(1));
        let mut words = Vec::new();
        for _ in 0..STACK_CAPACITY + 1 {
            words.push(Instruction::Push.into());
            words.push(one as i32);
        }
        words.push(Instruction::Return.into());
        vm.program = words;
        let err = vm.execute_from(0, 0).unwrap_err();
        assert_eq!(err.message, "Stack overflow");
    }

    #[test]
    fn equality_compares_string_contents_not_slice_identity() {
        let mut vm = Vm::new();
        let hi_a = vm.strings.intern("hi");
        let hi_b = vm.strings.intern("hi");
        assert!(vm.values_equal(Value::String(hi_a), Value::String(hi_b)));
    }

    #[test]
    #[should_panic(expected = "corrupted opcode")]
    fn a_corrupted_opcode_word_aborts_rather_than_returning_an_error() {
        let mut vm = Vm::new();
        vm.program = prog(&[9999]);
        let _ = vm.execute_from(0, 0);
    }

    #[test]
    fn division_by_zero_is_a_clean_runtime_error() {
        let mut vm = Vm::new();
        let ten = vm.values.push(Value::Number(10));
        let zero = vm.values.push(Value::Number(0));
        vm.program = prog(&[
            Instruction::Push.into(),
            ten as i32,
            Instruction::Push.into(),
            zero as i32,
            Instruction::Div.into(),
            Instruction::Return.into(),
        ]);
        let err = vm.execute_from(0, 0).unwrap_err();
        assert_eq!(err.message, "Division by zero");
    }
}
