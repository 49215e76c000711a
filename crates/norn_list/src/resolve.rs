//! Name resolution - turns a syntax tree into a list expression
//!
//! Resolution runs against a live environment and mutates it as it goes:
//! assignments bind names, and referencing an unknown name binds it to the
//! empty list so that it can be defined later.

use std::rc::Rc;

use norn_ast::*;
use norn_lexer::Span;
use norn_parser::ParseError;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::env::Environment;
use crate::expr::{Expression, ListError, ListName};

/// Errors from evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The text does not match the grammar
    #[error("invalid expression: {0}")]
    Parse(#[from] ParseError),
    /// A leaf failed its shape check.
    ///
    /// The lexer only produces well formed addresses and names, so this
    /// guards trees built by hand rather than parsed text.
    #[error("invalid expression: {source} at {}..{}", .span.start, .span.end)]
    InvalidLiteral { source: ListError, span: Span },
    /// Binding `name` would make it depend on itself
    #[error("recursive list definition: '{name}' would depend on itself through '{through}'")]
    RecursiveDefinition { name: String, through: String, span: Span },
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::Parse(e) => e.span,
            EvalError::InvalidLiteral { span, .. } => *span,
            EvalError::RecursiveDefinition { span, .. } => *span,
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(self, EvalError::RecursiveDefinition { .. })
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Pending work while resolving a tree
enum Task<'t> {
    /// Resolve a node; the name is the assignment it sits under, if any
    Resolve(&'t Expr, Option<Rc<str>>),
    Combine(BinOp),
    /// Drop the value of a statement that is not last in its sequence
    Discard,
    Bind(ListName, Span),
}

/// Name resolver
pub struct Resolver<'env> {
    env: &'env mut Environment,
}

impl<'env> Resolver<'env> {
    pub fn new(env: &'env mut Environment) -> Self {
        Self { env }
    }

    /// Resolve a parsed input. For a sequence, every statement is applied in
    /// order and the last one's value is returned.
    ///
    /// Works from an explicit task stack, so neither long operator chains
    /// nor deeply nested groups grow the call stack.
    pub fn resolve(&mut self, expr: &Expr) -> EvalResult<Expression> {
        let mut tasks = vec![Task::Resolve(expr, None)];
        let mut values: Vec<Expression> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Resolve(expr, assigning) => self.resolve_node(expr, assigning, &mut tasks, &mut values)?,
                Task::Combine(op) => {
                    let right = values.pop().unwrap_or(Expression::Empty);
                    let left = values.pop().unwrap_or(Expression::Empty);
                    values.push(Expression::binary(op, left, right));
                }
                Task::Discard => {
                    values.pop();
                }
                Task::Bind(name, span) => {
                    let value = values.pop().unwrap_or(Expression::Empty);
                    self.check_acyclic(name.as_str(), &value, span)?;

                    debug!(name = name.as_str(), "bind list");
                    self.env.set(name.as_str(), value.clone());
                    values.push(value);
                }
            }
        }

        Ok(values.pop().unwrap_or(Expression::Empty))
    }

    /// Resolve a leaf onto `values`, or queue the work for an inner node.
    /// `assigning` is the name whose definition is being resolved: references
    /// to it resolve to its current value instead of a live reference.
    fn resolve_node<'t>(
        &mut self,
        expr: &'t Expr,
        assigning: Option<Rc<str>>,
        tasks: &mut Vec<Task<'t>>,
        values: &mut Vec<Expression>,
    ) -> EvalResult<()> {
        match &expr.kind {
            ExprKind::Sequence(stmts) => {
                if stmts.is_empty() {
                    values.push(Expression::Empty);
                }
                for (index, stmt) in stmts.iter().enumerate().rev() {
                    tasks.push(Task::Resolve(stmt, assigning.clone()));
                    if index > 0 {
                        tasks.push(Task::Discard);
                    }
                }
            }

            ExprKind::Assign(ident, value) => {
                let name = ListName::new(&ident.name).map_err(|source| EvalError::InvalidLiteral {
                    source,
                    span: ident.span,
                })?;
                let marker: Rc<str> = Rc::from(name.as_str());
                tasks.push(Task::Bind(name, expr.span));
                tasks.push(Task::Resolve(value, Some(marker)));
            }

            ExprKind::Binary(left, op, right) => {
                tasks.push(Task::Combine(*op));
                tasks.push(Task::Resolve(right, assigning.clone()));
                tasks.push(Task::Resolve(left, assigning));
            }

            ExprKind::Group(inner) => tasks.push(Task::Resolve(inner, assigning)),

            ExprKind::Address(text) if text.is_empty() => values.push(Expression::Empty),
            ExprKind::Address(text) => {
                let single = Expression::single(text).map_err(|source| EvalError::InvalidLiteral {
                    source,
                    span: expr.span,
                })?;
                values.push(single);
            }

            ExprKind::Name(ident) => values.push(self.resolve_name(ident, assigning.as_deref())?),
        }
        Ok(())
    }

    fn resolve_name(&mut self, ident: &Ident, assigning: Option<&str>) -> EvalResult<Expression> {
        let name = ListName::new(&ident.name).map_err(|source| EvalError::InvalidLiteral {
            source,
            span: ident.span,
        })?;

        if self.env.declare(name.as_str()) {
            debug!(name = name.as_str(), "forward reference bound to empty list");
        }

        if assigning == Some(name.as_str()) {
            // Snapshot of the previous definition, so `a = a, x@y` extends a
            let current = self.env.get(name.as_str()).cloned().unwrap_or(Expression::Empty);
            trace!(name = name.as_str(), "self reference resolved to current value");
            return Ok(current);
        }

        Ok(Expression::NameRef(name))
    }

    /// Reject `name = value` if any name reachable from `value` already
    /// reaches `name`. Runs against the environment before the new binding.
    fn check_acyclic(&self, name: &str, value: &Expression, span: Span) -> EvalResult<()> {
        let reachable = value.referenced_names(self.env);

        for other in reachable.iter().filter(|other| other.as_str() != name) {
            let closes_loop = self
                .env
                .get(other)
                .is_some_and(|bound| bound.referenced_names(self.env).contains(name));
            if closes_loop {
                return Err(self.cycle(name, other, span));
            }
        }

        // Only a nested assignment such as `a = (b = a)` can hand back a live
        // reference to the name being assigned.
        if reachable.contains(name) {
            return Err(self.cycle(name, name, span));
        }

        Ok(())
    }

    fn cycle(&self, name: &str, through: &str, span: Span) -> EvalError {
        warn!(name, through, "rejected recursive list definition");
        EvalError::RecursiveDefinition {
            name: name.to_string(),
            through: through.to_string(),
            span,
        }
    }
}
