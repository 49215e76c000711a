use std::mem;

use norn_ast::*;
use norn_lexer::{LexError, Lexer, Span, SpannedToken, Token};
use thiserror::Error;

/// Operator-precedence parser.
///
/// Operators and open parentheses wait on explicit stacks instead of the
/// call stack, so input of any length or nesting depth parses in constant
/// stack space.
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {}..{}", .span.start, .span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { message: e.message, span: e.span }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// An operator still waiting for its right-hand side
enum Pending {
    Binary(BinOp),
    /// `name =`; its right-hand side runs to the end of the statement
    Assign(Ident),
}

/// One bracket level: the whole input, or the inside of a `(`
struct Frame {
    open: Option<Span>,
    stmts: Vec<Expr>,
    operands: Vec<Expr>,
    operators: Vec<Pending>,
}

impl Frame {
    fn new(open: Option<Span>) -> Self {
        Self {
            open,
            stmts: Vec::new(),
            operands: Vec::new(),
            operators: Vec::new(),
        }
    }

    /// Apply pending binary operators that bind at least as tightly as `min_prec`.
    /// An assignment is a barrier: operators after `=` belong to its value.
    fn reduce(&mut self, min_prec: u8) {
        while let Some(Pending::Binary(op)) = self.operators.last() {
            let op = *op;
            if op.precedence() < min_prec {
                break;
            }
            self.operators.pop();
            self.apply_binary(op);
        }
    }

    fn apply_binary(&mut self, op: BinOp) {
        if let (Some(right), Some(left)) = (self.operands.pop(), self.operands.pop()) {
            let span = left.span.to(right.span);
            self.operands
                .push(Expr::new(ExprKind::Binary(Box::new(left), op, Box::new(right)), span));
        }
    }

    /// Apply everything still pending and move the result into `stmts`.
    fn end_statement(&mut self) {
        while let Some(pending) = self.operators.pop() {
            match pending {
                Pending::Binary(op) => self.apply_binary(op),
                Pending::Assign(ident) => {
                    if let Some(value) = self.operands.pop() {
                        let span = ident.span.to(value.span);
                        self.operands.push(Expr::new(ExprKind::Assign(ident, Box::new(value)), span));
                    }
                }
            }
        }
        self.stmts.extend(self.operands.pop());
    }

    /// A single statement stands alone; several form a sequence.
    fn into_expr(mut self) -> Expr {
        if self.stmts.len() == 1 {
            if let Some(only) = self.stmts.pop() {
                return only;
            }
        }
        let span = match (self.stmts.first(), self.stmts.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::default(),
        };
        Expr::new(ExprKind::Sequence(self.stmts), span)
    }
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = Lexer::tokenize(source)?;
        Ok(Self { tokens, pos: 0 })
    }

    /// Parse a complete input: a `;`-separated sequence followed by end of input.
    pub fn parse(source: &str) -> ParseResult<Expr> {
        let mut parser = Parser::new(source)?;
        parser.parse_root()
    }

    // === Token Access ===

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> &SpannedToken {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(self.peek()) == mem::discriminant(token)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        match self.peek() {
            Token::Comma => Some(BinOp::Union),
            Token::Bang => Some(BinOp::Difference),
            Token::Star => Some(BinOp::Intersection),
            _ => None,
        }
    }

    // === Parsing ===
    //
    // sequence     ::= union (';' union)*
    // union        ::= difference (',' difference)*
    // difference   ::= intersection ('!' intersection)*
    // intersection ::= primitive ('*' primitive)*
    // primitive    ::= name '=' union | '(' sequence ')' | address | name | <empty>

    fn parse_root(&mut self) -> ParseResult<Expr> {
        let mut frame = Frame::new(None);
        let mut outer: Vec<Frame> = Vec::new();
        let mut expect_operand = true;

        loop {
            if expect_operand {
                expect_operand = self.parse_primary(&mut frame, &mut outer)?;
                continue;
            }

            if let Some(op) = self.peek_binop() {
                self.advance();
                frame.reduce(op.precedence());
                frame.operators.push(Pending::Binary(op));
                expect_operand = true;
                continue;
            }

            match self.peek().clone() {
                Token::Semi => {
                    self.advance();
                    frame.end_statement();
                    expect_operand = true;
                }
                Token::RParen if !outer.is_empty() => {
                    let close = self.advance().span;
                    frame.end_statement();
                    let open = frame.open.unwrap_or(close);
                    let parent = outer.pop().unwrap_or_else(|| Frame::new(None));
                    let inner = mem::replace(&mut frame, parent).into_expr();
                    frame
                        .operands
                        .push(Expr::new(ExprKind::Group(Box::new(inner)), open.to(close)));
                }
                Token::Eof if outer.is_empty() => {
                    frame.end_statement();
                    return Ok(frame.into_expr());
                }
                token => {
                    let message = if outer.is_empty() {
                        format!("expected operator or ';', found '{}'", token)
                    } else {
                        format!("expected ')', found '{}'", token)
                    };
                    return Err(ParseError { message, span: self.peek_span() });
                }
            }
        }
    }

    /// primitive ::= name '=' union | '(' sequence ')' | address | name | <empty>
    ///
    /// Returns true while more input is needed to complete the operand:
    /// after `(` or `name =`.
    fn parse_primary(&mut self, frame: &mut Frame, outer: &mut Vec<Frame>) -> ParseResult<bool> {
        let start = self.peek_span();

        match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                let ident = Ident::new(name, start);

                if self.check(&Token::Eq) {
                    self.advance();
                    frame.operators.push(Pending::Assign(ident));
                    return Ok(true);
                }

                frame.operands.push(Expr::new(ExprKind::Name(ident), start));
                Ok(false)
            }
            Token::Address(text) => {
                self.advance();
                frame.operands.push(Expr::new(ExprKind::Address(text), start));
                Ok(false)
            }
            Token::LParen => {
                self.advance();
                outer.push(mem::replace(frame, Frame::new(Some(start))));
                Ok(true)
            }
            ref token if token.ends_primitive() => {
                frame.operands.push(Expr::empty(start.start));
                Ok(false)
            }
            Token::Eq => Err(ParseError {
                message: "expected list name before '='".to_string(),
                span: start,
            }),
            _ => Err(ParseError {
                message: format!("expected expression, found '{}'", self.peek()),
                span: start,
            }),
        }
    }
}
