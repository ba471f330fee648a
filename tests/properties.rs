use finch::common::source::Source;
use finch::compiler::emit::compile_pass;
use finch::compiler::lex::lex;
use finch::compiler::parse::parse;
use finch::compiler::value::Value;
use finch::vm::vm::Vm;
use proptest::prelude::*;

fn compile_src(vm: &mut Vm, source: &str) -> Result<(), ()> {
    let forest = parse(lex(Source::source(source)).unwrap()).unwrap();
    compile_pass(vm, &forest).map_err(|_| ())
}

/// A single `let` binding's literal, generated directly rather than through
/// a bare range strategy so the intent ("one arbitrary binding") reads the
/// same way the literal type it generates does.
#[derive(Debug, Clone, proptest_derive::Arbitrary)]
struct ArbBinding {
    #[proptest(strategy = "0i32..1_000_000")]
    value: i32,
}

proptest! {
    /// Every `(let vK literal)` in a run of sequential top-level bindings
    /// ends up holding exactly its literal, regardless of how many there are
    /// or what the literals are.
    #[test]
    fn sequential_let_bindings_hold_their_literal_values(
        bindings in prop::collection::vec(any::<ArbBinding>(), 1..8)
    ) {
        let mut vm = Vm::new();
        let mut source = String::new();
        for (i, b) in bindings.iter().enumerate() {
            source.push_str(&format!("(let v{} {})", i, b.value));
        }
        compile_src(&mut vm, &source).unwrap();
        vm.execute_from(0, 0).unwrap();

        for (i, b) in bindings.iter().enumerate() {
            let name = format!("v{}", i);
            let addr = vm.global_symbols.lookup(&name).expect("binding should exist");
            prop_assert_eq!(vm.values.get(addr), Some(&Value::Number(b.value)));
        }
    }

    /// A failing pass never changes what an arbitrary number of earlier,
    /// successful passes already committed - the program, the value pool
    /// length, and the global symbol count are all exactly as they were.
    #[test]
    fn a_trailing_failure_never_disturbs_state_set_up_before_it(count in 0usize..6) {
        let mut vm = Vm::new();
        for i in 0..count {
            compile_src(&mut vm, &format!("(let g{} {})", i, i)).unwrap();
        }

        let program_before = vm.program.clone();
        let values_before = vm.values.len();
        let globals_before = vm.global_symbols.len();

        let result = compile_src(&mut vm, "(totally_undefined_name)");

        prop_assert!(result.is_err());
        prop_assert_eq!(&vm.program, &program_before);
        prop_assert_eq!(vm.values.len(), values_before);
        prop_assert_eq!(vm.global_symbols.len(), globals_before);
    }

    /// `if`'s two jump patches (the conditional skip over the then-branch,
    /// and the unconditional skip over the else-branch) land correctly no
    /// matter which arm a given pair of operands takes at runtime.
    #[test]
    fn if_selects_the_correct_arm_for_any_operand_pair(a in 0i32..10_000, b in 0i32..10_000) {
        let mut vm = Vm::new();
        let source = format!(
            "(define choose (x y) (if (< x y) x y)) (choose {} {})",
            a, b
        );
        compile_src(&mut vm, &source).unwrap();
        vm.execute_from(0, 0).unwrap();
        prop_assert_eq!(vm.stack_values(), &[Value::Number(a.min(b))]);
    }
}
