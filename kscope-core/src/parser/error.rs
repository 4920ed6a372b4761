use crate::{lexer::prelude::{Token, TokenKind}, utils::prelude::SrcSpan};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorType {
    ExpectedIdent,
    ExpectedOperatorName,
    ExpectedPrecedence,
    UnexpectedEof,
    UnexpectedToken {
        token: Token,
        expected: Vec<String>,
    },
    UndeclaredOperator {
        name: String,
    },
    BuiltinOperator {
        name: String,
    },
    InvalidPrecedence {
        value: f64,
    },
    OperatorArity {
        construct: &'static str,
        expected: usize,
        found: usize,
    },
    InvalidBinaryOperator {
        token: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub error: ParseErrorType,
    pub span: SrcSpan,
    pub line: u32,
}

impl ParseError {
    pub fn details(&self) -> (&'static str, Vec<String>) {
        match &self.error {
            ParseErrorType::ExpectedIdent => ("Expected identifier", vec![]),
            ParseErrorType::ExpectedOperatorName => ("Expected operator name", vec![
                "An operator is named by a single character or an identifier".to_string()
            ]),
            ParseErrorType::ExpectedPrecedence => ("Expected operator precedence", vec![
                "Write it as a number: `def binary | 5 (a b) ...`".to_string()
            ]),
            ParseErrorType::UnexpectedEof => ("Unexpected end of input", vec![]),
            ParseErrorType::UnexpectedToken { token, expected } => {
                let found = token.describe();

                let messages = std::iter::once(format!("Found {found}, expected one of: "))
                    .chain(expected.iter().map(|s| format!("- {s}")))
                    .collect();

                ("Not expected this", messages)
            },
            ParseErrorType::UndeclaredOperator { name } => ("Unknown binary operator", vec![
                format!("`{name}` is used before a `def binary {name}` declaration")
            ]),
            ParseErrorType::BuiltinOperator { name } => ("Built-in operator cannot be redefined", vec![
                format!("`{name}` already has a built-in meaning")
            ]),
            ParseErrorType::InvalidPrecedence { value } => ("Invalid operator precedence", vec![
                format!("Precedence must be a positive number, got {value}")
            ]),
            ParseErrorType::OperatorArity { construct, expected, found } => {
                let plural = if *expected == 1 { "" } else { "s" };

                ("Wrong number of operator parameters", vec![
                    format!("A {construct} operator accepts exactly {expected} parameter{plural}, found {found}")
                ])
            },
            ParseErrorType::InvalidBinaryOperator { token } => ("Invalid binary operator", vec![
                format!("{} cannot be used as a binary operator", token.describe())
            ]),
        }
    }

    /// `true` for errors reported at the end of the input.
    pub fn is_eof(&self) -> bool {
        match &self.error {
            ParseErrorType::UnexpectedEof => true,
            ParseErrorType::UnexpectedToken { token, .. } => token.is(TokenKind::Eof),
            _ => false,
        }
    }
}

pub fn parse_error<T>(error: ParseErrorType, span: SrcSpan, line: u32) -> Result<T, ParseError> {
    Err(ParseError { error, span, line })
}
