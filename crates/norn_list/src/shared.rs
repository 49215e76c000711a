//! Environment shared between the console, the web server and file loading

use std::sync::Arc;

use parking_lot::Mutex;

use crate::env::Environment;
use crate::expr::{Expression, Recipients};
use crate::resolve::EvalResult;

/// Result of one evaluation: the expression and the addresses it denoted at
/// the moment it was evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub expression: Expression,
    pub recipients: Recipients,
}

/// Cloneable handle to a single environment.
///
/// Every operation holds the lock for its whole duration, so an evaluation
/// and the recipients computed from it always see the same bindings.
#[derive(Debug, Clone, Default)]
pub struct SharedEnvironment {
    inner: Arc<Mutex<Environment>>,
}

impl SharedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `input` and compute its recipients under one lock.
    pub fn evaluate(&self, input: &str) -> EvalResult<Evaluation> {
        let mut env = self.inner.lock();
        let expression = crate::evaluate(input, &mut env)?;
        let recipients = expression.recipients(&env);
        Ok(Evaluation { expression, recipients })
    }

    /// Run `f` with exclusive access to the environment.
    pub fn with<R>(&self, f: impl FnOnce(&mut Environment) -> R) -> R {
        let mut env = self.inner.lock();
        f(&mut env)
    }

    /// Copy of every binding, ordered by name
    pub fn snapshot(&self) -> Vec<(String, Expression)> {
        self.inner
            .lock()
            .sorted()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}
