use logos::Logos;
use thiserror::Error;

/// Span in source code (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `pos`
    pub fn point(pos: usize) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]  // Skip whitespace
pub enum Token {
    // === Leaves ===
    /// `user@domain`; the username may contain `+`, the domain may not
    #[regex(r"[A-Za-z0-9_.+-]+@[A-Za-z0-9_.-]+", |lex| lex.slice().to_string())]
    Address(String),

    /// List name: letters, digits, `_`, `-`, `.`
    #[regex(r"[A-Za-z0-9_.-]+", |lex| lex.slice().to_string())]
    Name(String),

    // === Operators ===
    #[token(",")]
    Comma,
    #[token("!")]
    Bang,
    #[token("*")]
    Star,
    #[token("=")]
    Eq,
    #[token(";")]
    Semi,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // === Special ===
    Eof,
}

impl Token {
    /// Tokens that can never begin a primitive, so an empty primitive ends there
    pub fn ends_primitive(&self) -> bool {
        matches!(
            self,
            Token::Comma | Token::Bang | Token::Star | Token::Semi | Token::RParen | Token::Eof
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Address(s) => write!(f, "{}", s),
            Token::Name(s) => write!(f, "{}", s),
            Token::Comma => write!(f, ","),
            Token::Bang => write!(f, "!"),
            Token::Star => write!(f, "*"),
            Token::Eq => write!(f, "="),
            Token::Semi => write!(f, ";"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer wrapper that produces SpannedTokens
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Token>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: Token::lexer(source),
            finished: false,
        }
    }

    /// Tokenize the entire source into a Vec
    pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let spanned = lexer.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        if self.finished {
            let len = self.inner.source().len();
            return Ok(SpannedToken {
                token: Token::Eof,
                span: Span::point(len),
            });
        }

        match self.inner.next() {
            Some(Ok(token)) => {
                let span = self.inner.span();
                Ok(SpannedToken {
                    token,
                    span: Span::new(span.start, span.end),
                })
            }
            Some(Err(())) => {
                let span = self.inner.span();
                Err(LexError {
                    message: format!("unexpected input: '{}'", self.inner.slice()),
                    span: Span::new(span.start, span.end),
                })
            }
            None => {
                self.finished = true;
                let len = self.inner.source().len();
                Ok(SpannedToken {
                    token: Token::Eof,
                    span: Span::point(len),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {}..{}", .span.start, .span.end)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = kinds("x = (a@b, c) ! d * e; f");

        assert!(matches!(tokens[0], Token::Name(ref s) if s == "x"));
        assert!(matches!(tokens[1], Token::Eq));
        assert!(matches!(tokens[2], Token::LParen));
        assert!(matches!(tokens[3], Token::Address(ref s) if s == "a@b"));
        assert!(matches!(tokens[4], Token::Comma));
        assert!(matches!(tokens[5], Token::Name(ref s) if s == "c"));
        assert!(matches!(tokens[6], Token::RParen));
        assert!(matches!(tokens[7], Token::Bang));
        assert!(matches!(tokens[8], Token::Name(ref s) if s == "d"));
        assert!(matches!(tokens[9], Token::Star));
        assert!(matches!(tokens[10], Token::Name(ref s) if s == "e"));
        assert!(matches!(tokens[11], Token::Semi));
        assert!(matches!(tokens[12], Token::Name(ref s) if s == "f"));
        assert!(matches!(tokens[13], Token::Eof));
    }

    #[test]
    fn test_names_with_punctuation() {
        let tokens = kinds("1.2-3 ____ ..... -");
        assert_eq!(
            tokens,
            vec![
                Token::Name("1.2-3".into()),
                Token::Name("____".into()),
                Token::Name(".....".into()),
                Token::Name("-".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_address_keeps_case_and_plus() {
        let tokens = kinds("Alice+Lists@MIT.edu a-@-.d");
        assert_eq!(tokens[0], Token::Address("Alice+Lists@MIT.edu".into()));
        assert_eq!(tokens[1], Token::Address("a-@-.d".into()));
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::tokenize("ab , c@d").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(3, 4));
        assert_eq!(tokens[2].span, Span::new(5, 8));
        assert_eq!(tokens[3].span, Span::point(8));
    }

    #[test]
    fn test_empty_source_is_just_eof() {
        assert_eq!(kinds("   \n\t"), vec![Token::Eof]);
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::tokenize("a{}").unwrap_err();
        assert_eq!(err.span.start, 1);
        assert!(err.to_string().contains("unexpected input"));
    }

    #[test]
    fn test_double_at_is_rejected() {
        assert!(Lexer::tokenize("a@b@c").is_err());
    }
}
