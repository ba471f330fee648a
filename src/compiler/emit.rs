//! The bytecode emitter: walks an [`Ast`] forest in the context of a
//! [`FunctionStateStack`], resolving names and appending instructions and
//! values to a [`Vm`]. A failed [`compile_pass`] rolls back everything it
//! emitted, so an erroneous REPL entry leaves no trace.

use std::collections::HashSet;

use crate::common::span::Span;
use crate::common::token::{TokenKind, TypeName};
use crate::compiler::ast::Ast;
use crate::compiler::error::Syntax;
use crate::compiler::function_state::{FunctionState, FunctionStateStack};
use crate::compiler::opcode::Instruction;
use crate::compiler::value::{Function, Value};
use crate::vm::vm::Vm;

/// The statically-known type of whatever a compiled branch leaves on the
/// stack, used only to check `let`'s optional `:T` annotation. `Unknown`
/// covers anything the emitter can't pin down without real inference -
/// parameters, call results, and bare function values - and simply skips
/// the check rather than rejecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Str,
    Function,
    Unknown,
}

impl ValueType {
    pub fn describe(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Str => "string",
            ValueType::Function => "function",
            ValueType::Unknown => "unknown",
        }
    }
}

/// Whether compiling a form left a value on top of the stack. `let` and
/// `define` never do - they bind a name and fall through - while every
/// other form leaves exactly one. Threading this explicitly (rather than
/// inferring it from a form's token kind) is what lets a sequence of
/// sibling forms pop each discarded intermediate result instead of
/// silently piling them up underneath the sequence's real result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emitted {
    Value(ValueType),
    Nothing,
}

impl Emitted {
    fn value_type(self) -> ValueType {
        match self {
            Emitted::Value(t) => t,
            Emitted::Nothing => ValueType::Unknown,
        }
    }

    fn produced_value(self) -> bool {
        matches!(self, Emitted::Value(_))
    }
}

pub struct Emitter {
    scopes: FunctionStateStack,
    new_globals: HashSet<String>,
    values_added: usize,
}

impl Emitter {
    fn new() -> Emitter {
        Emitter { scopes: FunctionStateStack::new(), new_globals: HashSet::new(), values_added: 0 }
    }

    fn emit(&mut self, vm: &mut Vm, op: Instruction) {
        vm.program.push(op.into());
    }

    fn emit_imm(&mut self, vm: &mut Vm, word: i32) {
        vm.program.push(word);
    }

    fn value_add(&mut self, vm: &mut Vm, value: Value) -> usize {
        self.values_added += 1;
        vm.values.push(value)
    }

    /// Binds `name` in the innermost open function state, or in the VM's
    /// global table when no function body is currently being emitted.
    /// Global bindings are also tracked in `new_globals` for rollback.
    fn define(
        &mut self,
        vm: &mut Vm,
        name: &str,
        address: usize,
        kind: ValueType,
        span: &Span,
    ) -> Result<(), Syntax> {
        if self.scopes.is_empty() {
            if vm.global_symbols.contains(name) {
                return Err(Syntax::compile(span.clone(), format!("'{}' is already defined", name)));
            }
            vm.global_symbols.define(name, address);
            self.new_globals.insert(name.to_string());
        } else {
            self.scopes
                .current_mut()
                .unwrap()
                .define(name, address)
                .map_err(|msg| Syntax::compile(span.clone(), msg))?;
        }
        vm.declared_types.insert(address, kind);
        Ok(())
    }

    fn define_param(&mut self, name: &str, span: &Span) -> Result<usize, Syntax> {
        self.scopes
            .current_mut()
            .expect("define_param called outside a function body")
            .define_param(name)
            .map_err(|msg| Syntax::compile(span.clone(), msg))
    }

    fn lookup_param(&self, name: &str) -> Option<usize> {
        self.scopes.current().and_then(|scope| scope.lookup_param(name))
    }

    /// Walks the function-state chain toward the global scope, returning
    /// the nearest binding.
    fn lookup_value(&self, vm: &Vm, name: &str) -> Option<usize> {
        self.scopes.lookup_local_chain(name).or_else(|| vm.global_symbols.lookup(name))
    }

    fn type_of(&self, vm: &Vm, address: usize) -> ValueType {
        vm.declared_types.get(&address).copied().unwrap_or(ValueType::Unknown)
    }

    /// Compiles a single node with no awareness of its siblings - used for
    /// binary-operator operands, call arguments, and anywhere else exactly
    /// one value is expected. A bare identifier here never triggers call
    /// sugar, since it has no visibility into what follows it.
    fn generate(&mut self, vm: &mut Vm, node: &Ast) -> Result<Emitted, Syntax> {
        vm.spans.insert(vm.program.len(), node.token.span.clone());
        match &node.token.item {
            TokenKind::Number(n) => {
                let addr = self.value_add(vm, Value::Number(*n));
                self.emit(vm, Instruction::Push);
                self.emit_imm(vm, addr as i32);
                Ok(Emitted::Value(ValueType::Int))
            }
            TokenKind::String(s) => {
                let slice = vm.strings.intern(s);
                let addr = self.value_add(vm, Value::String(slice));
                self.emit(vm, Instruction::Push);
                self.emit_imm(vm, addr as i32);
                Ok(Emitted::Value(ValueType::Str))
            }
            TokenKind::Identifier(name) => self.generate_identifier(vm, name, &node.token.span),
            TokenKind::OpenParen => self.compile_sequence(vm, &node.children),
            TokenKind::Let => self.generate_let(vm, node),
            TokenKind::If => self.generate_if(vm, node),
            TokenKind::Define => self.generate_define(vm, node),
            op if op.is_binary_op() => self.generate_binary(vm, node),
            other => {
                Err(Syntax::compile(node.token.span.clone(), format!("Cannot compile {}", other.describe())))
            }
        }
    }

    fn generate_identifier(&mut self, vm: &mut Vm, name: &str, span: &Span) -> Result<Emitted, Syntax> {
        if let Some(slot) = self.lookup_param(name) {
            self.emit(vm, Instruction::PushArg);
            self.emit_imm(vm, slot as i32);
            Ok(Emitted::Value(ValueType::Unknown))
        } else if let Some(addr) = self.lookup_value(vm, name) {
            self.emit(vm, Instruction::Push);
            self.emit_imm(vm, addr as i32);
            Ok(Emitted::Value(self.type_of(vm, addr)))
        } else {
            Err(Syntax::compile(span.clone(), format!("No such value '{}'", name)))
        }
    }

    fn generate_binary(&mut self, vm: &mut Vm, node: &Ast) -> Result<Emitted, Syntax> {
        if node.children.len() != 2 {
            return Err(Syntax::compile(
                node.token.span.clone(),
                format!("Invalid number of parameters (got {}, should be 2)", node.children.len()),
            ));
        }
        self.generate(vm, &node.children[0])?;
        self.generate(vm, &node.children[1])?;
        let op = match node.token.item {
            TokenKind::Add => Instruction::Add,
            TokenKind::Sub => Instruction::Sub,
            TokenKind::Mul => Instruction::Mul,
            TokenKind::Div => Instruction::Div,
            TokenKind::Lt => Instruction::Lt,
            TokenKind::Gt => Instruction::Gt,
            TokenKind::Eq => Instruction::Eq,
            _ => unreachable!("generate_binary called with a non-binary token"),
        };
        self.emit(vm, op);
        Ok(Emitted::Value(ValueType::Int))
    }

    /// Compiles an `(EXPR …)` branch produced by the parser's `expr_branch`
    /// helper: a wrapper whose single child (if present) is the real
    /// expression - a bare atom, an operator form, or a parenthesized
    /// sub-expression. Absent entirely (an `if` with no else) yields
    /// `Nothing` and emits nothing. Dispatches through `generate` rather
    /// than unwrapping further, since a bare atom has no children of its
    /// own to recurse into.
    fn compile_branch(&mut self, vm: &mut Vm, branch: &Ast) -> Result<Emitted, Syntax> {
        match branch.children.first() {
            Some(expr) => self.generate(vm, expr),
            None => Ok(Emitted::Nothing),
        }
    }

    fn resolve_type_annotation(&mut self, vm: &Vm, type_node: &Ast) -> Result<ValueType, Syntax> {
        match &type_node.token.item {
            TokenKind::Type(TypeName::Int) => Ok(ValueType::Int),
            TokenKind::Type(TypeName::Str) => Ok(ValueType::Str),
            TokenKind::Identifier(name) => self.lookup_value(vm, name).map(|addr| self.type_of(vm, addr)).ok_or_else(
                || Syntax::compile(type_node.token.span.clone(), format!("type '{}' not defined", name)),
            ),
            other => Err(Syntax::compile(
                type_node.token.span.clone(),
                format!("type '{}' not defined", other.describe()),
            )),
        }
    }

    /// `let ident [:T] expr`: allocates the binding's storage slot and
    /// defines its name before compiling the value expression, so a
    /// `define`'d function of the same name could (in principle) see it -
    /// though with no closures, only `define` itself exploits this for
    /// recursion.
    fn generate_let(&mut self, vm: &mut Vm, node: &Ast) -> Result<Emitted, Syntax> {
        let ident_node = &node.children[0];
        let name = match &ident_node.token.item {
            TokenKind::Identifier(n) => n.clone(),
            _ => unreachable!("let's first child is always an identifier"),
        };

        let declared_type = match ident_node.children.first() {
            Some(type_node) => Some(self.resolve_type_annotation(vm, type_node)?),
            None => None,
        };

        let addr = self.value_add(vm, Value::Unknown);
        self.define(vm, &name, addr, declared_type.unwrap_or(ValueType::Unknown), &node.token.span)?;

        self.generate_let_assign(vm, node, addr, declared_type)
    }

    /// Compiles a `let`'s value expression and its `Assign` into a slot
    /// that's already been allocated and named. Split out of
    /// [`Emitter::generate_let`] so `if`'s two arms can share one slot when
    /// they bind the same name, rather than each calling `define` and
    /// colliding even though only one of them ever runs.
    fn generate_let_assign(
        &mut self,
        vm: &mut Vm,
        node: &Ast,
        addr: usize,
        declared_type: Option<ValueType>,
    ) -> Result<Emitted, Syntax> {
        let value_branch = &node.children[1];

        let value_emitted = self.compile_branch(vm, value_branch)?;
        if !value_emitted.produced_value() {
            return Err(Syntax::compile(
                node.token.span.clone(),
                "Invalid number of expressions given in value definition",
            ));
        }
        let value_type = value_emitted.value_type();

        if let Some(declared) = declared_type {
            if value_type != ValueType::Unknown && value_type != declared {
                return Err(Syntax::compile(
                    node.token.span.clone(),
                    format!("expected type {}", declared.describe()),
                ));
            }
            vm.declared_types.insert(addr, declared);
        } else {
            vm.declared_types.insert(addr, value_type);
        }

        self.emit(vm, Instruction::Assign);
        self.emit_imm(vm, addr as i32);
        Ok(Emitted::Nothing)
    }

    /// `if cond then else?`. Jumps are relative, forward, and patched after
    /// the branch they skip has been emitted; the placeholder operand `0`
    /// is only ever read before being overwritten.
    ///
    /// Both arms are compiled unconditionally (only one runs at runtime),
    /// so when they're both a `let` binding the same name, they must share
    /// one value-pool slot rather than each allocating and `define`-ing
    /// their own - the second `define` would otherwise collide with the
    /// first even though the two bindings never coexist.
    fn generate_if(&mut self, vm: &mut Vm, node: &Ast) -> Result<Emitted, Syntax> {
        let cond = &node.children[0];
        let then_branch = &node.children[1];
        let else_branch = &node.children[2];

        let cond_emitted = self.compile_branch(vm, cond)?;
        if !cond_emitted.produced_value() {
            return Err(Syntax::compile(node.token.span.clone(), "Missing condition in if expression"));
        }

        self.emit(vm, Instruction::CondJump);
        let cond_jump_operand = vm.program.len();
        self.emit_imm(vm, 0);

        let shared = shared_branch_let(then_branch, else_branch);
        let shared_slot = match shared {
            Some((name, then_let, _)) => {
                let declared_type = match then_let.children[0].children.first() {
                    Some(type_node) => Some(self.resolve_type_annotation(vm, type_node)?),
                    None => None,
                };
                let addr = self.value_add(vm, Value::Unknown);
                self.define(vm, name, addr, declared_type.unwrap_or(ValueType::Unknown), &node.token.span)?;
                Some((addr, declared_type))
            }
            None => None,
        };

        let then_emitted = match (shared, shared_slot) {
            (Some((_, then_let, _)), Some((addr, declared_type))) => {
                self.generate_let_assign(vm, then_let, addr, declared_type)?
            }
            _ => self.compile_branch(vm, then_branch)?,
        };

        let result = if else_branch.children.first().is_some() {
            self.emit(vm, Instruction::Jump);
            let jump_operand = vm.program.len();
            self.emit_imm(vm, 0);

            let after_then = vm.program.len();
            vm.program[cond_jump_operand] = (after_then - (cond_jump_operand + 1)) as i32;
            log::debug!("patched CondJump at {} to {}", cond_jump_operand, after_then);

            let else_emitted = match (shared, shared_slot) {
                (Some((_, _, else_let)), Some((addr, declared_type))) => {
                    self.generate_let_assign(vm, else_let, addr, declared_type)?
                }
                _ => self.compile_branch(vm, else_branch)?,
            };

            let after_else = vm.program.len();
            vm.program[jump_operand] = (after_else - (jump_operand + 1)) as i32;
            log::debug!("patched Jump at {} to {}", jump_operand, after_else);

            // Both arms are expected to agree on whether they leave a
            // value; if they don't, treat the result conservatively as
            // "nothing" rather than mis-reporting a type that only one
            // branch actually produces.
            if then_emitted.produced_value() && else_emitted.produced_value() {
                Emitted::Value(then_emitted.value_type())
            } else {
                Emitted::Nothing
            }
        } else {
            let after_then = vm.program.len();
            vm.program[cond_jump_operand] = (after_then - (cond_jump_operand + 1)) as i32;
            log::debug!("patched CondJump at {} to {}", cond_jump_operand, after_then);
            Emitted::Nothing
        };

        Ok(result)
    }

    /// `define name (params) body`. The skip-over jump lets the defining
    /// site fall straight past the body at top level; `address` is fixed
    /// once as the body's first instruction, after that jump.
    fn generate_define(&mut self, vm: &mut Vm, node: &Ast) -> Result<Emitted, Syntax> {
        let ident_node = &node.children[0];
        let params_node = &node.children[1];
        let body_node = &node.children[2];
        let name = match &ident_node.token.item {
            TokenKind::Identifier(n) => n.clone(),
            _ => unreachable!("define's first child is always an identifier"),
        };

        self.emit(vm, Instruction::Jump);
        let skip_operand = vm.program.len();
        self.emit_imm(vm, 0);

        let entry = vm.program.len();
        let argc = params_node.children.len();
        let addr = self.value_add(vm, Value::Function(Function { address: entry, argc }));
        self.define(vm, &name, addr, ValueType::Function, &node.token.span)?;

        self.scopes.push(FunctionState::new());
        let params_result: Result<(), Syntax> = (|| {
            for param in &params_node.children {
                let pname = match &param.token.item {
                    TokenKind::Identifier(n) => n.clone(),
                    _ => unreachable!("define's parameters are always identifiers"),
                };
                self.define_param(&pname, &param.token.span)?;
            }
            Ok(())
        })();
        let body_result = params_result.and_then(|()| self.compile_sequence(vm, &body_node.children));
        self.scopes.pop();
        body_result?;

        self.emit(vm, Instruction::Return);

        let after_body = vm.program.len();
        vm.program[skip_operand] = (after_body - (skip_operand + 1)) as i32;
        log::debug!("patched Jump at {} to {}", skip_operand, after_body);

        Ok(Emitted::Nothing)
    }

    /// Compiles a run of sibling forms inside one `(...)`. Each `let`, `if`,
    /// `define`, or operator form is self-contained. A bare identifier is
    /// special: if it resolves to a function/native (or to a parameter,
    /// whose value is unknown until runtime) and forms remain after it,
    /// those remaining forms are consumed whole as its call arguments -
    /// this is the only place call syntax is recognized, since `(f a b)`
    /// parses as three flat siblings rather than a dedicated call node.
    ///
    /// Every non-final form that leaves a value on the stack is popped
    /// immediately after, so only the sequence's last form's value (if
    /// any) survives - the same discipline a function body relies on to
    /// leave exactly one value behind for its caller to collect.
    fn compile_sequence(&mut self, vm: &mut Vm, children: &[Ast]) -> Result<Emitted, Syntax> {
        let mut last = Emitted::Nothing;
        let mut i = 0;
        while i < children.len() {
            let node = &children[i];
            let name = match &node.token.item {
                TokenKind::Identifier(name) => Some(name.clone()),
                _ => None,
            };

            let Some(name) = name else {
                last = self.generate(vm, node)?;
                i += 1;
                if i < children.len() && last.produced_value() {
                    self.emit(vm, Instruction::Pop);
                }
                continue;
            };

            if let Some(slot) = self.lookup_param(&name) {
                let rest = &children[i + 1..];
                if rest.is_empty() {
                    self.emit(vm, Instruction::PushArg);
                    self.emit_imm(vm, slot as i32);
                    last = Emitted::Value(ValueType::Unknown);
                    i += 1;
                    if i < children.len() {
                        self.emit(vm, Instruction::Pop);
                    }
                } else {
                    let argc = rest.len();
                    for arg in rest {
                        self.generate(vm, arg)?;
                    }
                    self.emit(vm, Instruction::PushArg);
                    self.emit_imm(vm, slot as i32);
                    self.emit(vm, Instruction::LocalCall);
                    self.emit_imm(vm, argc as i32);
                    last = Emitted::Value(ValueType::Unknown);
                    i = children.len();
                }
            } else if let Some(addr) = self.lookup_value(vm, &name) {
                let kind = self.type_of(vm, addr);
                let rest = &children[i + 1..];
                if kind == ValueType::Function && !rest.is_empty() {
                    for arg in rest {
                        self.generate(vm, arg)?;
                    }
                    self.emit(vm, Instruction::Call);
                    self.emit_imm(vm, addr as i32);
                    last = Emitted::Value(ValueType::Unknown);
                    i = children.len();
                } else {
                    self.emit(vm, Instruction::Push);
                    self.emit_imm(vm, addr as i32);
                    last = Emitted::Value(kind);
                    i += 1;
                    if i < children.len() {
                        self.emit(vm, Instruction::Pop);
                    }
                }
            } else {
                return Err(Syntax::compile(node.token.span.clone(), format!("No such value '{}'", name)));
            }
        }
        Ok(last)
    }
}

/// If an `if`'s two arms are each a bare `let` binding the same name,
/// returns that name along with both `let` nodes. `compile_branch` is not
/// used here since this needs to see the `let` node itself, before either
/// arm is compiled, to decide whether they should share a slot.
fn shared_branch_let<'ast>(
    then_branch: &'ast Ast,
    else_branch: &'ast Ast,
) -> Option<(&'ast str, &'ast Ast, &'ast Ast)> {
    let then_let = then_branch.children.first()?;
    let else_let = else_branch.children.first()?;
    if then_let.token.item != TokenKind::Let || else_let.token.item != TokenKind::Let {
        return None;
    }
    let then_name = match &then_let.children[0].token.item {
        TokenKind::Identifier(n) => n.as_str(),
        _ => return None,
    };
    let else_name = match &else_let.children[0].token.item {
        TokenKind::Identifier(n) => n.as_str(),
        _ => return None,
    };
    (then_name == else_name).then_some((then_name, then_let, else_let))
}

/// Compiles a parsed top-level forest into `vm`, appending to its program,
/// value pool, and global symbol table. On failure, every instruction,
/// value, and new global binding this pass contributed is rolled back and
/// `vm` is left exactly as it was found.
pub fn compile_pass(vm: &mut Vm, forest: &[Ast]) -> Result<(), Syntax> {
    let mut emitter = Emitter::new();
    let program_snapshot = vm.program.len();
    let values_snapshot = vm.values.len();

    let result: Result<(), Syntax> = (|| {
        for top in forest {
            // Most top-level forms are `(...)` groups, compiled as a
            // sequence; a bare atom/op-form (e.g. reading back a binding
            // by name) dispatches through `generate` like any other node.
            emitter.generate(vm, top)?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            emitter.emit(vm, Instruction::Return);
            Ok(())
        }
        Err(err) => {
            log::debug!(
                "rolling back pass: program {} -> {}, values +{} -> {}",
                vm.program.len(),
                program_snapshot,
                emitter.values_added,
                values_snapshot
            );
            vm.program.truncate(program_snapshot);
            debug_assert_eq!(vm.values.len(), values_snapshot + emitter.values_added);
            vm.values.truncate(values_snapshot);
            vm.spans.retain(|addr, _| *addr < program_snapshot);
            for name in &emitter.new_globals {
                vm.global_symbols.remove(name);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;
    use crate::compiler::lex::lex;
    use crate::compiler::parse::parse;

    fn compile_src(vm: &mut Vm, src: &str) -> Result<(), Syntax> {
        let forest = parse(lex(Source::source(src)).unwrap()).unwrap();
        compile_pass(vm, &forest)
    }

    #[test]
    fn addition_compiles_and_runs() {
        let mut vm = Vm::new();
        compile_src(&mut vm, "(+ 2 3)").unwrap();
        vm.execute_from(vm.saved_ip, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(5)]);
    }

    #[test]
    fn let_bindings_accumulate_across_passes() {
        let mut vm = Vm::new();
        compile_src(&mut vm, "(let a 10)").unwrap();
        vm.execute_from(0, 0).unwrap();
        vm.saved_ip = vm.program.len() - 1; // drop the trailing RETURN
        vm.program.truncate(vm.saved_ip);
        vm.clear_stack();

        compile_src(&mut vm, "(let b (+ a 5)) (+ a b)").unwrap();
        vm.execute_from(vm.saved_ip, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(25)]);
    }

    #[test]
    fn recursive_function_calls_itself() {
        let mut vm = Vm::new();
        compile_src(&mut vm, "(define fact (n) (if (< n 2) 1 (* n (fact (- n 1))))) (fact 5)").unwrap();
        vm.execute_from(0, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(120)]);
    }

    #[test]
    fn a_failed_pass_leaves_no_trace() {
        let mut vm = Vm::new();
        let program_before = vm.program.clone();
        let values_before = vm.values.len();
        assert!(compile_src(&mut vm, "(let a)").is_err());
        assert_eq!(vm.program, program_before);
        assert_eq!(vm.values.len(), values_before);
        assert!(!vm.global_symbols.contains("a"));
    }

    #[test]
    fn undefined_identifier_is_a_compile_error() {
        let mut vm = Vm::new();
        assert!(compile_src(&mut vm, "(foo 1)").is_err());
    }

    #[test]
    fn let_type_mismatch_is_rejected() {
        let mut vm = Vm::new();
        assert!(compile_src(&mut vm, r#"(let a:int "hi")"#).is_err());
    }

    #[test]
    fn non_final_statements_in_a_sequence_do_not_leak_onto_the_stack() {
        // Two sibling forms share one set of parens; only the last (99)
        // should survive on the stack, not the discarded `(+ 1 2)`.
        let mut vm = Vm::new();
        compile_src(&mut vm, "((+ 1 2) 99)").unwrap();
        vm.execute_from(0, 0).unwrap();
        assert_eq!(vm.stack_values(), &[Value::Number(99)]);
    }
}
