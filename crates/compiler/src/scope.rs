//! Lexical scope and symbol tracking
//!
//! Scopes form a stack mirroring the block structure of the module being
//! analyzed. The arena keeps popped scopes alive so whole-module symbol
//! statistics stay available after analysis; the active stack decides
//! what `lookup` can see.
//!
//! Lua scoping rules implemented here:
//! - local variables have block scope and shadow outer bindings
//! - globals live in the outermost scope, which is never popped
//! - function names are defined in the surrounding scope before the body
//!   is entered, so recursive references resolve

use crate::types::{TableShape, Type};

/// Index of a scope in the arena.
pub type ScopeId = usize;

/// A variable, function, or parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope_id: ScopeId,
    pub is_global: bool,
    pub is_function: bool,
    pub is_parameter: bool,
    pub param_index: Option<usize>,
    pub inferred_type: Option<Type>,
    pub table_info: Option<TableShape>,
}

impl Symbol {
    fn new(name: &str, scope_id: ScopeId) -> Self {
        Symbol {
            name: name.to_string(),
            scope_id,
            is_global: false,
            is_function: false,
            is_parameter: false,
            param_index: None,
            inferred_type: None,
            table_info: None,
        }
    }
}

#[derive(Debug)]
struct ScopeData {
    parent: Option<ScopeId>,
    /// Symbols in definition order (names are unique within one scope).
    symbols: Vec<Symbol>,
}

impl ScopeData {
    fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }
}

/// The scope stack used by inference and code generation.
///
/// The global scope is created at construction and can never be popped.
#[derive(Debug)]
pub struct ScopeStack {
    arena: Vec<ScopeData>,
    stack: Vec<ScopeId>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            arena: vec![ScopeData {
                parent: None,
                symbols: Vec::new(),
            }],
            stack: vec![0],
        }
    }

    pub const GLOBAL: ScopeId = 0;

    pub fn current(&self) -> ScopeId {
        *self.stack.last().expect("scope stack is never empty")
    }

    /// Nesting depth of the current scope (0 = global).
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Enter a new scope nested in the current one.
    pub fn push(&mut self) -> ScopeId {
        let id = self.arena.len();
        self.arena.push(ScopeData {
            parent: Some(self.current()),
            symbols: Vec::new(),
        });
        self.stack.push(id);
        id
    }

    /// Leave the current scope. Popping the global scope is an error.
    pub fn pop(&mut self) -> Result<ScopeId, String> {
        if self.stack.len() == 1 {
            return Err("cannot pop the global scope".to_string());
        }
        Ok(self.stack.pop().expect("checked above"))
    }

    fn define_in(&mut self, scope: ScopeId, symbol: Symbol) -> Result<&mut Symbol, String> {
        if self.arena[scope].find(&symbol.name).is_some() {
            return Err(format!(
                "symbol '{}' already defined in scope",
                symbol.name
            ));
        }
        self.arena[scope].symbols.push(symbol);
        Ok(self.arena[scope].symbols.last_mut().expect("just pushed"))
    }

    /// Define a local in the current scope. Shadowing an outer binding is
    /// legal; redefining within the same scope is not.
    pub fn define_local(&mut self, name: &str) -> Result<&mut Symbol, String> {
        let scope = self.current();
        self.define_in(scope, Symbol::new(name, scope))
    }

    /// Define a global in the outermost scope, regardless of the current
    /// nesting.
    pub fn define_global(&mut self, name: &str) -> Result<&mut Symbol, String> {
        let mut symbol = Symbol::new(name, Self::GLOBAL);
        symbol.is_global = true;
        self.define_in(Self::GLOBAL, symbol)
    }

    /// Define a function name. Local functions land in the current scope
    /// (before the body is visited), global ones in the global scope.
    pub fn define_function(&mut self, name: &str, is_global: bool) -> Result<&mut Symbol, String> {
        let symbol = if is_global {
            self.define_global(name)?
        } else {
            self.define_local(name)?
        };
        symbol.is_function = true;
        Ok(symbol)
    }

    /// Define a parameter in the current (function body) scope.
    pub fn define_parameter(
        &mut self,
        name: &str,
        param_index: usize,
    ) -> Result<&mut Symbol, String> {
        let symbol = self.define_local(name)?;
        symbol.is_parameter = true;
        symbol.param_index = Some(param_index);
        Ok(symbol)
    }

    /// Walk the parent chain from the current scope; innermost match wins.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut scope = Some(self.current());
        while let Some(id) = scope {
            if let Some(idx) = self.arena[id].find(name) {
                return Some(&self.arena[id].symbols[idx]);
            }
            scope = self.arena[id].parent;
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let mut scope = Some(self.current());
        while let Some(id) = scope {
            if let Some(idx) = self.arena[id].find(name) {
                return Some(&mut self.arena[id].symbols[idx]);
            }
            scope = self.arena[id].parent;
        }
        None
    }

    /// Current scope only.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        let id = self.current();
        self.arena[id].find(name).map(|idx| &self.arena[id].symbols[idx])
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.lookup(name).map(|s| !s.is_global).unwrap_or(false)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.lookup(name).map(|s| s.is_global).unwrap_or(false)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.lookup(name).map(|s| s.is_function).unwrap_or(false)
    }

    /// Every symbol ever defined, in definition order across the arena.
    /// Includes symbols of popped scopes.
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.arena.iter().flat_map(|scope| scope.symbols.iter())
    }

    /// Symbols of the global scope, in definition order.
    pub fn global_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.arena[Self::GLOBAL].symbols.iter()
    }

    /// Mutable access to every symbol in the arena, including symbols of
    /// popped scopes. Used when finalized analysis results are copied
    /// back onto the symbols.
    pub fn all_symbols_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.arena
            .iter_mut()
            .flat_map(|scope| scope.symbols.iter_mut())
    }
}
