//! Syntax tree for list expressions, as produced by `norn_parser`.
//!
//! Leaves keep the text exactly as written; case folding happens later
//! when the tree is resolved into list values.

use norn_lexer::Span;

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Statements separated by `;`: a; b = c; d
    Sequence(Vec<Expr>),
    /// Assignment: name = expr
    Assign(Ident, Box<Expr>),
    /// Binary operation: a , b
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// Parenthesized sequence: (a; b)
    Group(Box<Expr>),
    /// Address literal: bitdiddle@mit.edu
    /// An empty primitive (as in `()` or `a,,b`) is an address with empty text.
    Address(String),
    /// List name: hobbits
    Name(Ident),
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The empty primitive at `pos`
    pub fn empty(pos: usize) -> Self {
        Self::new(ExprKind::Address(String::new()), Span::point(pos))
    }

    /// Child nodes, left to right
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Sequence(stmts) => stmts.iter().collect(),
            ExprKind::Assign(_, value) => vec![value.as_ref()],
            ExprKind::Binary(left, _, right) => vec![left.as_ref(), right.as_ref()],
            ExprKind::Group(inner) => vec![inner.as_ref()],
            ExprKind::Address(_) | ExprKind::Name(_) => Vec::new(),
        }
    }
}

// Trees can be as deep as the input is long, so they are torn down from a
// work list rather than by the default recursive drop.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = vec![take_kind(self)];
        while let Some(kind) = pending.pop() {
            match kind {
                ExprKind::Sequence(stmts) => {
                    pending.extend(stmts.into_iter().map(|mut stmt| take_kind(&mut stmt)));
                }
                ExprKind::Assign(_, mut value) | ExprKind::Group(mut value) => {
                    pending.push(take_kind(&mut value));
                }
                ExprKind::Binary(mut left, _, mut right) => {
                    pending.push(take_kind(&mut left));
                    pending.push(take_kind(&mut right));
                }
                ExprKind::Address(_) | ExprKind::Name(_) => {}
            }
        }
    }
}

fn take_kind(expr: &mut Expr) -> ExprKind {
    std::mem::replace(&mut expr.kind, ExprKind::Address(String::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Union,
    Difference,
    Intersection,
}

impl BinOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Union => 1,  // Lowest precedence
            BinOp::Difference => 2,
            BinOp::Intersection => 3,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Union => ",",
            BinOp::Difference => "!",
            BinOp::Intersection => "*",
        }
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Identifier with span
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: String, span: Span) -> Self {
        Self { name, span }
    }
}

// === Pretty Printing ===

impl Expr {
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        let mut pending = vec![(self, 0usize)];

        while let Some((expr, indent)) = pending.pop() {
            let ind = "  ".repeat(indent);
            let line = match &expr.kind {
                ExprKind::Sequence(_) => format!("{}Sequence\n", ind),
                ExprKind::Assign(name, _) => format!("{}Assign '{}'\n", ind, name.name),
                ExprKind::Binary(_, op, _) => format!("{}Binary {:?} ({})\n", ind, op, op),
                ExprKind::Group(_) => format!("{}Group\n", ind),
                ExprKind::Address(text) if text.is_empty() => format!("{}Empty\n", ind),
                ExprKind::Address(text) => format!("{}Address {}\n", ind, text),
                ExprKind::Name(ident) => format!("{}Name {}\n", ind, ident.name),
            };
            out.push_str(&line);

            for child in expr.children().into_iter().rev() {
                pending.push((child, indent + 1));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(BinOp::Intersection.precedence() > BinOp::Difference.precedence());
        assert!(BinOp::Difference.precedence() > BinOp::Union.precedence());
    }

    #[test]
    fn test_pretty_print_nested() {
        let a = Expr::new(ExprKind::Name(Ident::new("a".into(), Span::new(4, 5))), Span::new(4, 5));
        let b = Expr::new(ExprKind::Address("b@c".into()), Span::new(6, 9));
        let union = Expr::new(
            ExprKind::Binary(Box::new(a), BinOp::Union, Box::new(b)),
            Span::new(4, 9),
        );
        let assign = Expr::new(
            ExprKind::Assign(Ident::new("x".into(), Span::new(0, 1)), Box::new(union)),
            Span::new(0, 9),
        );

        assert_eq!(
            assign.pretty_print(),
            "Assign 'x'\n  Binary Union (,)\n    Name a\n    Address b@c\n"
        );
    }

    #[test]
    fn test_empty_literal() {
        let empty = Expr::empty(3);
        assert_eq!(empty.kind, ExprKind::Address(String::new()));
        assert_eq!(empty.span, Span::point(3));
        assert_eq!(empty.pretty_print(), "Empty\n");
    }

    #[test]
    fn test_deep_tree_drops() {
        let mut expr = Expr::empty(0);
        for _ in 0..100_000 {
            expr = Expr::new(ExprKind::Group(Box::new(expr)), Span::new(0, 0));
        }
        assert_eq!(expr.children().len(), 1);
        drop(expr);
    }
}
