//! List expressions - the immutable values that names are bound to
//!
//! Expressions can be arbitrarily deep: a list of ten thousand addresses is a
//! ten thousand node chain, and `a = a, x@y` nests the old value one level
//! further every time. Every walk below therefore keeps its own work stack
//! instead of recursing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use norn_ast::BinOp;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::env::Environment;

/// Lowercased addresses denoted by an expression
pub type Recipients = BTreeSet<String>;

static ADDRESS_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_.+\-]+@[a-z0-9_.\-]+$").expect("address pattern is valid"));

static NAME_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_.\-]+$").expect("name pattern is valid"));

/// Placeholder swapped into nodes while they are torn down
static EMPTY: Lazy<Arc<Expression>> = Lazy::new(|| Arc::new(Expression::Empty));

/// Errors constructing list leaves
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("invalid email address '{0}'")]
    InvalidAddress(String),
    #[error("invalid list name '{0}'")]
    InvalidName(String),
}

/// A single email address, always lowercase and of the form `username@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(text: &str) -> Result<Self, ListError> {
        let lowered = text.to_lowercase();
        if ADDRESS_SHAPE.is_match(&lowered) {
            Ok(Self(lowered))
        } else {
            Err(ListError::InvalidAddress(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A list name, always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListName(String);

impl ListName {
    pub fn new(text: &str) -> Result<Self, ListError> {
        let lowered = text.to_lowercase();
        if NAME_SHAPE.is_match(&lowered) {
            Ok(Self(lowered))
        } else {
            Err(ListError::InvalidName(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An email list expression.
///
/// Equality and hashing are structural: `a,b` and `b,a` denote the same
/// recipients but are different expressions. Children are reference counted,
/// so cloning an expression (for example to snapshot a binding) never copies
/// the tree.
#[derive(Debug, Clone)]
pub enum Expression {
    Empty,
    Single(Address),
    Union(Arc<Expression>, Arc<Expression>),
    Intersection(Arc<Expression>, Arc<Expression>),
    Difference(Arc<Expression>, Arc<Expression>),
    /// Live reference into the environment; looked up again on every use
    NameRef(ListName),
}

impl Expression {
    pub fn single(address: &str) -> Result<Self, ListError> {
        Address::new(address).map(Expression::Single)
    }

    pub fn name_ref(name: &str) -> Result<Self, ListError> {
        ListName::new(name).map(Expression::NameRef)
    }

    pub fn union(left: Expression, right: Expression) -> Self {
        Expression::Union(Arc::new(left), Arc::new(right))
    }

    pub fn intersection(left: Expression, right: Expression) -> Self {
        Expression::Intersection(Arc::new(left), Arc::new(right))
    }

    pub fn difference(left: Expression, right: Expression) -> Self {
        Expression::Difference(Arc::new(left), Arc::new(right))
    }

    pub fn binary(op: BinOp, left: Expression, right: Expression) -> Self {
        match op {
            BinOp::Union => Expression::union(left, right),
            BinOp::Difference => Expression::difference(left, right),
            BinOp::Intersection => Expression::intersection(left, right),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Expression::Empty)
    }

    fn as_binary(&self) -> Option<(BinOp, &Expression, &Expression)> {
        match self {
            Expression::Union(left, right) => Some((BinOp::Union, left.as_ref(), right.as_ref())),
            Expression::Difference(left, right) => Some((BinOp::Difference, left.as_ref(), right.as_ref())),
            Expression::Intersection(left, right) => Some((BinOp::Intersection, left.as_ref(), right.as_ref())),
            _ => None,
        }
    }

    /// The set of addresses this expression denotes under `env`.
    ///
    /// Each name is evaluated once per call, however many times it is
    /// referenced.
    pub fn recipients(&self, env: &Environment) -> Recipients {
        let mut steps = vec![Step::Visit(self)];
        let mut values: Vec<Recipients> = Vec::new();
        let mut done: HashMap<&str, Recipients> = HashMap::new();
        let mut active: HashSet<&str> = HashSet::new();

        while let Some(step) = steps.pop() {
            match step {
                Step::Visit(expr) => match (expr, expr.as_binary()) {
                    (_, Some((op, left, right))) => {
                        steps.push(Step::Combine(op));
                        steps.push(Step::Visit(right));
                        steps.push(Step::Visit(left));
                    }
                    (Expression::Single(address), None) => {
                        values.push(Recipients::from([address.as_str().to_string()]));
                    }
                    (Expression::NameRef(name), None) => {
                        let name = name.as_str();
                        if let Some(value) = done.get(name) {
                            values.push(value.clone());
                            continue;
                        }
                        match env.get(name) {
                            // The resolver binds every name it hands out a reference to
                            None => {
                                warn!(name, "reference to unbound list name");
                                values.push(Recipients::new());
                            }
                            Some(_) if !active.insert(name) => {
                                warn!(name, "list name refers to itself");
                                values.push(Recipients::new());
                            }
                            Some(bound) => {
                                steps.push(Step::Finish(name));
                                steps.push(Step::Visit(bound));
                            }
                        }
                    }
                    _ => values.push(Recipients::new()),
                },
                Step::Combine(op) => {
                    let right = values.pop().unwrap_or_default();
                    let left = values.pop().unwrap_or_default();
                    values.push(combine(op, left, right));
                }
                Step::Finish(name) => {
                    active.remove(name);
                    if let Some(value) = values.last() {
                        done.insert(name, value.clone());
                    }
                }
            }
        }

        values.pop().unwrap_or_default()
    }

    /// Every list name reachable from this expression, following bindings in `env`.
    pub fn referenced_names(&self, env: &Environment) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut pending = vec![self];

        while let Some(expr) = pending.pop() {
            if let Some((_, left, right)) = expr.as_binary() {
                pending.push(right);
                pending.push(left);
            } else if let Expression::NameRef(name) = expr {
                // A name reached along several paths is expanded once
                if names.insert(name.as_str().to_string()) {
                    pending.extend(env.get(name.as_str()));
                }
            }
        }

        names
    }

    /// Text that parses back to this same expression.
    ///
    /// Operands are parenthesized only where precedence or left
    /// associativity requires it, so `a, b, c` renders as written. The empty
    /// list renders as `()` inside a larger expression and as the empty
    /// string on its own.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Move the children out so that dropping them cannot recurse.
    fn take_operands(&mut self, out: &mut Vec<Arc<Expression>>) {
        if let Expression::Union(left, right)
        | Expression::Intersection(left, right)
        | Expression::Difference(left, right) = self
        {
            out.push(mem::replace(left, Arc::clone(&EMPTY)));
            out.push(mem::replace(right, Arc::clone(&EMPTY)));
        }
    }
}

/// Work items for [`Expression::recipients`]
enum Step<'a> {
    Visit(&'a Expression),
    Combine(BinOp),
    /// The value on top of the stack is the value of this name
    Finish(&'a str),
}

fn combine(op: BinOp, mut left: Recipients, mut right: Recipients) -> Recipients {
    match op {
        BinOp::Union => {
            if left.len() < right.len() {
                mem::swap(&mut left, &mut right);
            }
            left.extend(right);
            left
        }
        BinOp::Intersection => {
            left.retain(|address| right.contains(address));
            left
        }
        BinOp::Difference => {
            left.retain(|address| !right.contains(address));
            left
        }
    }
}

impl Drop for Expression {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_operands(&mut pending);
        while let Some(child) = pending.pop() {
            // Shared subtrees are left to their other owners
            if let Ok(mut node) = Arc::try_unwrap(child) {
                node.take_operands(&mut pending);
            }
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        let mut pairs = vec![(self, other)];
        while let Some((a, b)) = pairs.pop() {
            if std::ptr::eq(a, b) {
                continue;
            }
            match (a, b) {
                (Expression::Empty, Expression::Empty) => {}
                (Expression::Single(x), Expression::Single(y)) if x == y => {}
                (Expression::NameRef(x), Expression::NameRef(y)) if x == y => {}
                _ => match (a.as_binary(), b.as_binary()) {
                    (Some((op_a, left_a, right_a)), Some((op_b, left_b, right_b))) if op_a == op_b => {
                        pairs.push((right_a, right_b));
                        pairs.push((left_a, left_b));
                    }
                    _ => return false,
                },
            }
        }
        true
    }
}

impl Eq for Expression {}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            mem::discriminant(expr).hash(state);
            match expr {
                Expression::Single(address) => address.hash(state),
                Expression::NameRef(name) => name.hash(state),
                _ => {
                    if let Some((_, left, right)) = expr.as_binary() {
                        pending.push(right);
                        pending.push(left);
                    }
                }
            }
        }
    }
}

enum Piece<'a> {
    Expr(&'a Expression),
    Text(&'static str),
}

fn separator(op: BinOp) -> &'static str {
    match op {
        BinOp::Union => " , ",
        BinOp::Difference => " ! ",
        BinOp::Intersection => " * ",
    }
}

/// Queue `operand`, wrapped in parentheses if it is a binary node whose
/// precedence fails `fits`.
fn push_operand<'a>(pieces: &mut Vec<Piece<'a>>, operand: &'a Expression, fits: impl Fn(u8) -> bool) {
    let wrap = operand
        .as_binary()
        .is_some_and(|(op, _, _)| !fits(op.precedence()));
    if wrap {
        pieces.push(Piece::Text(")"));
    }
    pieces.push(Piece::Expr(operand));
    if wrap {
        pieces.push(Piece::Text("("));
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pieces = vec![Piece::Expr(self)];
        while let Some(piece) = pieces.pop() {
            let expr = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Expr(expr) => expr,
            };
            match (expr, expr.as_binary()) {
                (_, Some((op, left, right))) => {
                    let prec = op.precedence();
                    // Operators are left associative: an equal right operand needs parentheses
                    push_operand(&mut pieces, right, |p| p > prec);
                    pieces.push(Piece::Text(separator(op)));
                    push_operand(&mut pieces, left, |p| p >= prec);
                }
                (Expression::Single(address), None) => f.write_str(address.as_str())?,
                (Expression::NameRef(name), None) => f.write_str(name.as_str())?,
                _ if std::ptr::eq(expr, self) => {}
                _ => f.write_str("()")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(address: &str) -> Expression {
        Expression::single(address).unwrap()
    }

    fn set(addresses: &[&str]) -> Recipients {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_address_is_lowercased() {
        let address = Address::new("BitDiddle@MIT.edu").unwrap();
        assert_eq!(address.as_str(), "bitdiddle@mit.edu");
    }

    #[test]
    fn test_address_shape() {
        assert!(Address::new("a+tag@b.c").is_ok());
        assert!(Address::new("a-@-.d").is_ok());
        assert_eq!(
            Address::new("a@b+c"),
            Err(ListError::InvalidAddress("a@b+c".into()))
        );
        assert!(Address::new("@b").is_err());
        assert!(Address::new("a@").is_err());
        assert!(Address::new("ab").is_err());
        assert!(Address::new("a@b@c").is_err());
    }

    #[test]
    fn test_list_name_shape() {
        assert_eq!(ListName::new("B1.23_-").unwrap().as_str(), "b1.23_-");
        assert!(ListName::new("a+b").is_err());
        assert!(ListName::new("").is_err());
    }

    #[test]
    fn test_recipients_of_operators() {
        let env = Environment::new();
        let ab = Expression::union(single("a@x"), single("b@x"));
        let bc = Expression::union(single("b@x"), single("c@x"));

        assert_eq!(Expression::Empty.recipients(&env), set(&[]));
        assert_eq!(
            Expression::union(ab.clone(), bc.clone()).recipients(&env),
            set(&["a@x", "b@x", "c@x"])
        );
        assert_eq!(
            Expression::intersection(ab.clone(), bc.clone()).recipients(&env),
            set(&["b@x"])
        );
        assert_eq!(Expression::difference(ab, bc).recipients(&env), set(&["a@x"]));
    }

    #[test]
    fn test_name_ref_reads_live_binding() {
        let mut env = Environment::new();
        let room = Expression::name_ref("room").unwrap();
        env.set("room", single("alice@mit.edu"));
        assert_eq!(room.recipients(&env), set(&["alice@mit.edu"]));

        env.set("room", single("eve@mit.edu"));
        assert_eq!(room.recipients(&env), set(&["eve@mit.edu"]));
    }

    #[test]
    fn test_unbound_name_ref_is_empty() {
        let env = Environment::new();
        assert!(Expression::name_ref("ghost").unwrap().recipients(&env).is_empty());
    }

    #[test]
    fn test_referenced_names_are_transitive() {
        let mut env = Environment::new();
        env.set("a", Expression::name_ref("b").unwrap());
        env.set("b", Expression::union(Expression::name_ref("c").unwrap(), single("x@y")));
        env.set("c", Expression::Empty);

        let expr = Expression::difference(Expression::name_ref("a").unwrap(), single("z@y"));
        let names: Vec<_> = expr.referenced_names(&env).into_iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(single("x@y").referenced_names(&env).is_empty());
    }

    #[test]
    fn test_render() {
        let expr = Expression::union(
            Expression::union(Expression::name_ref("A").unwrap(), Expression::name_ref("b").unwrap()),
            Expression::difference(single("X@Y"), Expression::intersection(single("p@q"), Expression::Empty)),
        );
        assert_eq!(expr.render(), "a , b , x@y ! p@q * ()");
        assert_eq!(Expression::Empty.render(), "");
    }

    #[test]
    fn test_render_parenthesizes_only_where_needed() {
        let (a, b, c) = (single("a@x"), single("b@x"), single("c@x"));

        let left_looser = Expression::difference(Expression::union(a.clone(), b.clone()), c.clone());
        assert_eq!(left_looser.render(), "(a@x , b@x) ! c@x");

        let right_same = Expression::difference(a.clone(), Expression::difference(b.clone(), c.clone()));
        assert_eq!(right_same.render(), "a@x ! (b@x ! c@x)");

        let right_tighter = Expression::union(a.clone(), Expression::intersection(b.clone(), c.clone()));
        assert_eq!(right_tighter.render(), "a@x , b@x * c@x");

        let left_tighter = Expression::union(Expression::difference(a, b), c);
        assert_eq!(left_tighter.render(), "a@x ! b@x , c@x");
    }

    fn long_chain(count: usize) -> Expression {
        (1..count).fold(single("u0@x"), |list, i| {
            Expression::union(list, single(&format!("u{}@x", i)))
        })
    }

    #[test]
    fn test_long_chains_are_walked_without_recursion() {
        let env = Environment::new();
        let list = long_chain(10_000);
        assert_eq!(list.recipients(&env).len(), 10_000);
        assert!(list.referenced_names(&env).is_empty());
        assert!(list.render().starts_with("u0@x , u1@x , u2@x"));
        assert_eq!(list, list.clone());
        drop(list);

        let nested = (0..10_000).fold(Expression::Empty, |list, i| {
            Expression::union(single(&format!("u{}@x", i)), list)
        });
        assert_eq!(nested.recipients(&env).len(), 10_000);
    }

    #[test]
    fn test_shared_names_are_expanded_once() {
        let mut env = Environment::new();
        env.set("a0", single("x@y"));
        for k in 1..=40 {
            let below = Expression::name_ref(&format!("a{}", k - 1)).unwrap();
            env.set(&format!("a{}", k), Expression::union(below.clone(), below));
        }

        let top = Expression::name_ref("a40").unwrap();
        assert_eq!(top.referenced_names(&env).len(), 41);
        assert_eq!(top.recipients(&env), set(&["x@y"]));
    }

    #[test]
    fn test_recipients_survive_cyclic_bindings() {
        let mut env = Environment::new();
        env.set("a", Expression::union(single("x@y"), Expression::name_ref("b").unwrap()));
        env.set("b", Expression::name_ref("a").unwrap());

        let a = Expression::name_ref("a").unwrap();
        assert_eq!(a.recipients(&env), set(&["x@y"]));
        let names: Vec<_> = a.referenced_names(&env).into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_structural_equality() {
        let ab = Expression::union(single("a@x"), single("b@x"));
        let ba = Expression::union(single("b@x"), single("a@x"));
        let env = Environment::new();

        assert_ne!(ab, ba);
        assert_eq!(ab.recipients(&env), ba.recipients(&env));
        assert_eq!(single("A@X"), single("a@x"));
    }
}
