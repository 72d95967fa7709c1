//! Lexical scopes: the identifier sets attached to scope-introducing
//! constructs, with nearest-enclosing lookup handled by the tree.

/// Identifiers assigned at one lexical level. The parent-scope link is the
/// owning node's parent chain; scopes themselves hold no tree references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    bindings: Vec<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identifier. Re-registering is a no-op so repeated edits
    /// to the same assignment token don't duplicate entries.
    pub fn register(&mut self, name: &str) {
        if !name.is_empty() && !self.bindings.iter().any(|b| b == name) {
            self.bindings.push(name.to_string());
        }
    }

    pub fn unregister(&mut self, name: &str) {
        self.bindings.retain(|b| b != name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.iter().any(|b| b == name)
    }

    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }
}
