//! Compile-time symbol tables. The open-addressing hash table the original
//! implementation used to back this is out of scope here; a [`HashMap`]
//! gives the same name-to-address mapping without reimplementing it, while
//! keeping the fixed-width truncated key the original format relied on.

use std::collections::HashMap;

/// The original table's keys were a fixed 28-byte buffer (`32 -
/// sizeof(i32)`, the value slot in a 32-byte bucket). Names longer than that
/// collide on truncation here exactly as they did there - this type exists
/// to keep that constraint visible rather than silently allowing unbounded
/// identifiers.
pub const KEY_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolKey([u8; KEY_SIZE]);

impl SymbolKey {
    pub fn new(name: &str) -> SymbolKey {
        let mut bytes = [0u8; KEY_SIZE];
        let truncated = &name.as_bytes()[..name.len().min(KEY_SIZE)];
        bytes[..truncated.len()].copy_from_slice(truncated);
        SymbolKey(bytes)
    }
}

/// Maps identifiers to value-pool addresses. Used both for the VM's
/// long-lived global scope and for each function's local scope during
/// compilation.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<SymbolKey, usize>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable { entries: HashMap::new() }
    }

    /// Binds `name` to `address`, returning the previous address if this
    /// name was already bound (re-`define`-ing a name rebinds it rather than
    /// erroring, matching the global scope's top-level semantics).
    pub fn define(&mut self, name: &str, address: usize) -> Option<usize> {
        self.entries.insert(SymbolKey::new(name), address)
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries.get(&SymbolKey::new(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&SymbolKey::new(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.entries.remove(&SymbolKey::new(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn define_and_lookup_roundtrip() {
        let mut table = SymbolTable::new();
        table.define("x", 3);
        assert_eq!(table.lookup("x"), Some(3));
        assert_eq!(table.lookup("y"), None);
    }

    #[test]
    fn redefining_rebinds() {
        let mut table = SymbolTable::new();
        table.define("x", 1);
        table.define("x", 2);
        assert_eq!(table.lookup("x"), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn names_beyond_key_size_collide_on_truncation() {
        let long_a = "a".repeat(KEY_SIZE + 4);
        let long_b = format!("{}zzzz", "a".repeat(KEY_SIZE));
        assert_eq!(SymbolKey::new(&long_a), SymbolKey::new(&long_b));
    }

    #[test]
    fn remove_forgets_a_binding() {
        let mut table = SymbolTable::new();
        table.define("x", 5);
        assert_eq!(table.remove("x"), Some(5));
        assert_eq!(table.lookup("x"), None);
    }
}
