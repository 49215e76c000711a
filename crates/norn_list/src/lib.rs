//! Mailing list expressions and their evaluation
//!
//! This crate turns parsed expressions into list values by:
//! 1. Resolving list names against a mutable environment
//! 2. Binding assigned names, rejecting recursive definitions
//! 3. Evaluating expressions to sets of recipients

mod env;
mod expr;
mod resolve;
mod shared;

pub use env::Environment;
pub use expr::{Address, Expression, ListError, ListName, Recipients};
pub use resolve::{EvalError, EvalResult, Resolver};
pub use shared::{Evaluation, SharedEnvironment};

use norn_parser::Parser;

/// Evaluate `input` against `env`.
///
/// The whole input is parsed before anything is resolved, so a syntax error
/// leaves `env` untouched. Statements of a `;` sequence take effect one by
/// one: if a later statement is rejected, earlier ones stay applied.
#[tracing::instrument(level = "debug", skip(env))]
pub fn evaluate(input: &str, env: &mut Environment) -> EvalResult<Expression> {
    let tree = Parser::parse(input)?;
    Resolver::new(env).resolve(&tree)
}
