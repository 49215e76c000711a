//! The environment: list names and the expressions bound to them

use std::collections::HashMap;

use crate::expr::Expression;

/// Mapping from lowercase list name to its current definition.
///
/// Bindings are replaced, never removed. There is no locking here; see
/// [`SharedEnvironment`](crate::SharedEnvironment) for the serialized handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    bindings: HashMap<String, Expression>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.bindings.get(name.to_lowercase().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name.to_lowercase().as_str())
    }

    /// Bind `name`, returning the previous definition if there was one.
    pub fn set(&mut self, name: &str, value: Expression) -> Option<Expression> {
        self.bindings.insert(name.to_lowercase(), value)
    }

    /// Bind `name` to the empty list unless it is already bound.
    /// Returns true if a new binding was created.
    pub fn declare(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        if self.bindings.contains_key(&key) {
            return false;
        }
        self.bindings.insert(key, Expression::Empty);
        true
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Bindings ordered by name
    pub fn sorted(&self) -> Vec<(&str, &Expression)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
