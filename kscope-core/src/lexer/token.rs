use std::fmt::Display;

use crate::utils::prelude::SrcSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,

    // Ключевые слова
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Var,
    Unary,
    Binary,

    Ident,
    Number,

    // Разделители
    LParen,
    RParen,
    Comma,
    Semicolon,
    Equal,

    // Any other character, `==` included
    Operator,
}

impl TokenKind {
    pub fn is_reserved_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Extern
                | TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Var
                | TokenKind::Unary
                | TokenKind::Binary
        )
    }

    pub fn as_literal(&self) -> &'static str {
        match self {
            TokenKind::Eof => "end of input",
            TokenKind::Def => "def",
            TokenKind::Extern => "extern",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Var => "var",
            TokenKind::Unary => "unary",
            TokenKind::Binary => "binary",
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Equal => "=",
            TokenKind::Operator => "operator",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_literal())
    }
}

pub fn str_to_keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "def" => TokenKind::Def,
        "extern" => TokenKind::Extern,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "var" => TokenKind::Var,
        "unary" => TokenKind::Unary,
        "binary" => TokenKind::Binary,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Ident(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub span: SrcSpan,
    pub literal: Option<Literal>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, span: SrcSpan) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            span,
            literal: None,
        }
    }

    pub fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    /// Text carried by identifier and operator tokens.
    ///
    /// Unary operator lookup and custom binary precedence both go through
    /// this, so `|` and `bar` are treated alike once declared.
    pub fn literal_text(&self) -> Option<&str> {
        match &self.literal {
            Some(Literal::Ident(text)) => Some(text),
            _ => None,
        }
    }

    pub fn number(&self) -> Option<f64> {
        match self.literal {
            Some(Literal::Number(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Human readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident => format!("identifier `{}`", self.lexeme),
            TokenKind::Number => format!("number `{}`", self.lexeme),
            kind if kind.is_reserved_word() => format!("the keyword `{}`", self.lexeme),
            _ => format!("`{}`", self.lexeme),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "[{}] Eof", self.line),
            kind => write!(f, "[{}] {:?} `{}`", self.line, kind, self.lexeme),
        }
    }
}
