//! Symbol interning.
//!
//! Symbols are small copyable ids for interned strings. Global bindings,
//! instance variables and method tables are all keyed by symbol so that
//! lookup never compares string contents.

use rustc_hash::FxHashMap;

/// An interned symbol id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// The raw id of this symbol.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// Interner mapping names to [`Symbol`] ids and back.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<Box<str>>,
    ids: FxHashMap<Box<str>, u32>,
}

impl SymbolTable {
    /// Create an empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name, returning its symbol (stable across repeated calls).
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&id) = self.ids.get(name) {
            return Symbol(id);
        }
        let id = self.names.len() as u32;
        let boxed: Box<str> = name.into();
        self.names.push(boxed.clone());
        self.ids.insert(boxed, id);
        Symbol(id)
    }

    /// Resolve a symbol back to its name.
    pub fn name(&self, sym: Symbol) -> Option<&str> {
        self.names.get(sym.0 as usize).map(|s| &**s)
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no symbols have been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
