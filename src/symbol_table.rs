//! Two-scope symbol table for the Jack compiler.
//!
//! The symbol table maintains two scopes:
//! - **Class scope**: `static` and `field` variables, persists for the class
//! - **Subroutine scope**: arguments and locals, reset per subroutine
//!
//! Lookup is subroutine-first, so locals shadow class-level names.

use std::collections::HashMap;

/// The kind of symbol, determining its VM segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Class-level static variable → `static` segment
    Static,
    /// Class-level field variable → `this` segment
    Field,
    /// Subroutine argument → `argument` segment
    Arg,
    /// Subroutine local variable → `local` segment
    Var,
}

impl SymbolKind {
    /// Convert to VM segment name.
    #[inline]
    pub fn to_segment(self) -> &'static str {
        match self {
            SymbolKind::Static => "static",
            SymbolKind::Field => "this",
            SymbolKind::Arg => "argument",
            SymbolKind::Var => "local",
        }
    }

    /// Check if this is a class-level symbol.
    #[inline]
    pub fn is_class_level(self) -> bool {
        matches!(self, SymbolKind::Static | SymbolKind::Field)
    }
}

/// A symbol entry in the symbol table.
///
/// The type slot holds the raw type lexeme: `int`, `char`, `boolean`, or a
/// class name. For object variables it is the class the method-call lowering
/// dispatches on.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: String,
    pub kind: SymbolKind,
    /// The index within the symbol's segment.
    pub index: u16,
}

impl Symbol {
    /// Get the VM segment for this symbol.
    #[inline]
    pub fn segment(&self) -> &'static str {
        self.kind.to_segment()
    }
}

/// Two-scope symbol table with per-kind running indices.
///
/// `define` performs no duplicate check: the Jack language forbids
/// redefinition, and the engine takes that on faith, so a redefinition
/// silently overwrites.
#[derive(Debug, Default)]
pub struct SymbolTable {
    class_scope: HashMap<String, Symbol>,
    subroutine_scope: HashMap<String, Symbol>,
    static_count: u16,
    field_count: u16,
    arg_count: u16,
    var_count: u16,
}

impl SymbolTable {
    /// Create a new empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start compiling a new subroutine.
    ///
    /// Clears subroutine-level symbols and resets the Arg/Var counters.
    /// Class-level symbols and counters are untouched.
    pub fn start_subroutine(&mut self) {
        self.subroutine_scope.clear();
        self.arg_count = 0;
        self.var_count = 0;
    }

    /// Define a new symbol, assigning it the next running index of its kind.
    pub fn define(&mut self, name: &str, ty: &str, kind: SymbolKind) {
        let counter = match kind {
            SymbolKind::Static => &mut self.static_count,
            SymbolKind::Field => &mut self.field_count,
            SymbolKind::Arg => &mut self.arg_count,
            SymbolKind::Var => &mut self.var_count,
        };
        let index = *counter;
        *counter += 1;

        let symbol = Symbol {
            name: name.to_string(),
            ty: ty.to_string(),
            kind,
            index,
        };

        if kind.is_class_level() {
            self.class_scope.insert(name.to_string(), symbol);
        } else {
            self.subroutine_scope.insert(name.to_string(), symbol);
        }
    }

    /// Look up a symbol by name, subroutine scope first.
    ///
    /// `None` is the "undefined" sentinel: the engine uses it to route
    /// qualified calls to the class-name branch.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.subroutine_scope
            .get(name)
            .or_else(|| self.class_scope.get(name))
    }

    /// Get the count of symbols of a given kind.
    ///
    /// Static/Field counts cover the whole class; Arg/Var counts cover the
    /// current subroutine.
    pub fn var_count(&self, kind: SymbolKind) -> u16 {
        match kind {
            SymbolKind::Static => self.static_count,
            SymbolKind::Field => self.field_count,
            SymbolKind::Arg => self.arg_count,
            SymbolKind::Var => self.var_count,
        }
    }

    /// Get the number of field variables (the constructor's allocation size).
    #[inline]
    pub fn field_count(&self) -> u16 {
        self.field_count
    }
}
