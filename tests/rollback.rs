use finch::common::source::Source;
use finch::compiler::emit::compile_pass;
use finch::compiler::lex::lex;
use finch::compiler::parse::parse;
use finch::vm::vm::Vm;

fn try_compile(vm: &mut Vm, source: &str) -> bool {
    let forest = match parse(lex(Source::source(source)).unwrap()) {
        Ok(forest) => forest,
        Err(_) => return false,
    };
    compile_pass(vm, &forest).is_ok()
}

#[test]
fn failed_pass_reverts_the_program_to_its_snapshot() {
    let mut vm = Vm::new();
    assert!(try_compile(&mut vm, "(let good 1)"));
    let program_snapshot = vm.program.clone();

    assert!(!try_compile(&mut vm, "(undefined_name)"));
    assert_eq!(vm.program, program_snapshot);
}

#[test]
fn failed_pass_truncates_the_value_pool_by_values_added() {
    let mut vm = Vm::new();
    assert!(try_compile(&mut vm, "(let good 1)"));
    let values_snapshot = vm.values.len();

    // The literal 1 gets pushed before the undefined-name error is hit.
    assert!(!try_compile(&mut vm, "(let bad (+ 1 undefined))"));
    assert_eq!(vm.values.len(), values_snapshot);
}

#[test]
fn failed_pass_removes_new_globals_it_introduced() {
    let mut vm = Vm::new();
    assert!(!try_compile(&mut vm, "(let a undefined_name)"));
    assert!(!vm.global_symbols.contains("a"));
}

#[test]
fn a_name_already_bound_by_an_earlier_pass_survives_a_later_failure() {
    let mut vm = Vm::new();
    assert!(try_compile(&mut vm, "(let a 1)"));
    assert!(!try_compile(&mut vm, "(let a 2)")); // duplicate global definition
    assert!(vm.global_symbols.contains("a"));
    assert_eq!(vm.global_symbols.lookup("a"), Some(vm.global_symbols.lookup("a").unwrap()));
}

#[test]
fn rollback_leaves_the_vm_usable_for_the_next_pass() {
    let mut vm = Vm::new();
    assert!(!try_compile(&mut vm, "(foo 1)"));
    assert!(try_compile(&mut vm, "(let x 1)"));
    assert!(vm.global_symbols.contains("x"));
}
