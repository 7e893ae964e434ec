//! Variable scopes used while building expression trees.

use crate::types::Type;
use std::collections::HashMap;

/// A stack of lexical scopes mapping variable names to their static types.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    /// Stack of scopes, innermost last. The first scope holds free variables.
    scopes: Vec<HashMap<String, Type>>,
}

impl TypeEnv {
    /// Create an environment with an empty outermost scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    /// Enter a new scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Exit the current scope. The outermost scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind a variable in the current scope.
    pub fn bind(&mut self, name: impl Into<String>, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    /// Look up a variable, searching from the innermost scope.
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Number of open scopes, including the outermost one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}
