//! The native ("host") function registry: Rust-implemented callables
//! installed into the VM's global scope before any user source compiles,
//! so they resolve through the same `CALL`/`LOCAL_CALL` machinery as a
//! bytecode-defined function.

use crate::compiler::emit::ValueType;
use crate::compiler::value::{Native, Value};
use crate::vm::trace::Trace;
use crate::vm::vm::Vm;

fn native_print(vm: &mut Vm, args: &[Value]) -> Result<Option<Value>, Trace> {
    let value = args[0];
    match value {
        Value::Number(n) => println!("{}", n),
        Value::String(slice) => println!("{}", vm.strings.get(slice)),
        Value::Function(f) => println!("function@{}", f.address),
        Value::Native(_) => println!("native function"),
        Value::Unknown => println!("unknown"),
    }
    Ok(Some(value))
}

fn native_assert(vm: &mut Vm, args: &[Value]) -> Result<Option<Value>, Trace> {
    if args[0].is_truthy() {
        Ok(None)
    } else {
        Err(vm.error("assertion failed"))
    }
}

fn install(vm: &mut Vm, name: &str, argc: usize, func: crate::compiler::value::NativeFn) {
    let addr = vm.values.push(Value::Native(Native { func, argc }));
    vm.global_symbols.define(name, addr);
    vm.declared_types.insert(addr, ValueType::Function);
}

/// Populates `vm`'s global scope with every native function this crate
/// ships. Called once, before the first compile pass.
pub fn install_natives(vm: &mut Vm) {
    install(vm, "print", 1, native_print);
    install(vm, "assert", 1, native_assert);
}
