use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::{lexer::prelude::{scan, LexicalError, Token, TokenKind}, utils::prelude::SrcSpan};
use super::error::{parse_error, ParseError, ParseErrorType};
use super::ast::{Binary, Call, Expression, Extern, For, Function, If, Number, Parsed, Unary, VarIn, Variable};

pub trait Parse<T: Iterator<Item = Token>>
    where Self: Sized,
{
    fn parse(
        parser: &mut Parser<'_, T>,
        precedence: Option<f64>
    ) -> Result<Self, ParseError>;
}

pub trait InfixParse<T: Iterator<Item = Token>>
    where Self: Sized,
{
    fn parse(
        parser: &mut Parser<'_, T>,
        left: Expression,
        precedence: Option<f64>
    ) -> Result<Self, ParseError>;
}

/// Binary operator precedences and declared unary operators.
///
/// Outlives a single [`Parser`], so operators declared in one batch are
/// known to every later one.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    builtin: HashMap<&'static str, f64>,
    custom: HashMap<String, f64>,
    unary: HashSet<String>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorTable {
    pub fn new() -> Self {
        Self {
            builtin: HashMap::from([
                ("=", 2.0),
                ("<", 10.0),
                ("+", 20.0),
                ("-", 20.0),
                ("*", 40.0),
                ("==", 50.0),
            ]),
            custom: HashMap::new(),
            unary: HashSet::new(),
        }
    }

    /// Binding power of `token` in infix position, `None` if it isn't a binary operator.
    pub fn precedence(&self, token: &Token) -> Option<f64> {
        match token.kind {
            TokenKind::Equal | TokenKind::Operator => self.builtin.get(token.lexeme.as_str())
                .copied()
                .or_else(|| self.custom_precedence(token)),
            TokenKind::Ident => self.custom_precedence(token),
            _ => None
        }
    }

    fn custom_precedence(&self, token: &Token) -> Option<f64> {
        token.literal_text().and_then(|name| self.custom.get(name).copied())
    }

    pub fn is_right_associative(&self, token: &Token) -> bool {
        token.is(TokenKind::Equal)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.contains_key(name)
    }

    pub fn is_unary(&self, token: &Token) -> bool {
        matches!(token.kind, TokenKind::Operator | TokenKind::Ident)
            && token.literal_text().is_some_and(|name| self.unary.contains(name))
    }

    pub fn declare_unary(&mut self, name: &str) {
        self.unary.insert(name.to_string());
    }

    pub fn declare_binary(&mut self, name: &str, precedence: f64) {
        self.custom.insert(name.to_string(), precedence);
    }
}

pub struct Parser<'op, T: Iterator<Item = Token>> {
    pub current_token: Token,
    pub operators: &'op mut OperatorTable,

    previous: Option<TokenKind>,
    tokens: T,
}

impl<'op, T: Iterator<Item = Token>> Parser<'op, T> {
    pub fn new(mut tokens: T, operators: &'op mut OperatorTable) -> Self {
        let current_token = tokens.next()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", 1, SrcSpan::default()));

        Self {
            current_token,
            operators,
            previous: None,
            tokens,
        }
    }

    /// Moves to the next token, returning the one just left.
    ///
    /// Past the end of the stream the parser keeps yielding `Eof`.
    pub fn step(&mut self) -> Token {
        let next = match self.tokens.next() {
            Some(token) => token,
            None => {
                let end = self.current_token.span.end;

                Token::new(TokenKind::Eof, "", self.current_token.line, SrcSpan::from(end, end))
            }
        };

        let token = std::mem::replace(&mut self.current_token, next);
        self.previous = Some(token.kind);

        token
    }

    pub fn current_precedence(&self) -> Option<f64> {
        self.operators.precedence(&self.current_token)
    }

    /// Parses every top-level form, recovering after a malformed one.
    pub fn parse(&mut self) -> Parsed {
        let mut parsed = Parsed::default();

        while !self.current_token.is(TokenKind::Eof) {
            // пустые инструкции
            if self.current_token.is(TokenKind::Semicolon) {
                self.step();
                continue;
            }

            let form = match self.parse_top_level() {
                Ok(form) => self.expect_one(TokenKind::Semicolon).map(|_| form),
                Err(err) => Err(err),
            };

            match form {
                Ok(form) => parsed.forms.push(form),
                Err(err) => {
                    parsed.errors.push(err);
                    self.synchronize();
                }
            }
        }

        parsed
    }

    pub fn parse_top_level(&mut self) -> Result<Expression, ParseError> {
        match self.current_token.kind {
            TokenKind::Def => Ok(Expression::Function(Rc::new(Function::parse(self, None)?))),
            TokenKind::Extern => Ok(Expression::Extern(Rc::new(Extern::parse(self, None)?))),
            _ => {
                let body = Expression::parse(self, None)?;

                Ok(Expression::Function(Rc::new(Function::anonymous(body))))
            }
        }
    }

    /// Skips past the offending token, then up to the end of the statement
    /// or the start of an `if`/`for`.
    fn synchronize(&mut self) {
        if !self.current_token.is(TokenKind::Eof) {
            self.step();
        }

        while !self.current_token.is(TokenKind::Eof) {
            if self.previous == Some(TokenKind::Semicolon) {
                return;
            }

            if matches!(self.current_token.kind, TokenKind::For | TokenKind::If) {
                return;
            }

            self.step();
        }
    }

    /// Precedence climbing: folds operators binding tighter than `min`.
    ///
    /// With `inclusive` an operator of exactly `min` binds as well, which
    /// makes the operator that started this call right associative.
    pub fn parse_expression(&mut self, min: f64, inclusive: bool) -> Result<Expression, ParseError> {
        if self.current_token.is(TokenKind::Var) {
            return self.parse_var_in();
        }

        let mut left = self.parse_unary()?;

        loop {
            let precedence = match self.current_precedence() {
                Some(precedence) => precedence,
                None if self.current_token.is(TokenKind::Operator) => return parse_error(
                    ParseErrorType::UndeclaredOperator { name: self.current_token.lexeme.clone() },
                    self.current_token.span,
                    self.current_token.line
                ),
                None => break
            };

            if !(precedence > min || (inclusive && precedence == min)) {
                break;
            }

            left = Expression::Binary(Binary::parse(self, left, Some(precedence))?);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if !self.operators.is_unary(&self.current_token) {
            return self.parse_primary();
        }

        let operator = self.step();
        let operand = self.parse_unary()?;
        let location = operator.span.join(operand.location());

        Ok(Expression::Unary(Unary {
            operator,
            operand: Box::new(operand),
            location,
        }))
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.current_token.kind {
            TokenKind::LParen => {
                self.step();
                let expression = self.parse_expression(0.0, false)?;
                self.expect_one(TokenKind::RParen)?;

                Ok(expression)
            },
            TokenKind::Ident => self.parse_identifier(),
            TokenKind::Number => {
                let (value, location) = self.expect_number()?;

                Ok(Expression::Number(Number { value, location }))
            },
            TokenKind::If => Ok(Expression::If(If::parse(self, None)?)),
            TokenKind::For => Ok(Expression::For(For::parse(self, None)?)),
            TokenKind::Var => self.parse_var_in(),
            TokenKind::Eof => parse_error(
                ParseErrorType::UnexpectedEof,
                self.current_token.span,
                self.current_token.line
            ),
            _ => parse_error(
                ParseErrorType::UnexpectedToken {
                    token: self.current_token.clone(),
                    expected: vec![
                        "an identifier".to_string(),
                        "a number".to_string(),
                        "`(`".to_string(),
                        "`if`, `for` or `var`".to_string(),
                    ],
                },
                self.current_token.span,
                self.current_token.line
            )
        }
    }

    fn parse_identifier(&mut self) -> Result<Expression, ParseError> {
        let (name, location) = self.expect_ident()?;

        if !self.current_token.is(TokenKind::LParen) {
            return Ok(Expression::Variable(Variable { name, location }));
        }

        self.step();

        let mut arguments = vec![];

        if !self.current_token.is(TokenKind::RParen) {
            loop {
                arguments.push(self.parse_expression(0.0, false)?);

                if !self.current_token.is(TokenKind::Comma) {
                    break;
                }
                self.step();
            }
        }

        let end = self.expect_one(TokenKind::RParen)?.span;

        Ok(Expression::Call(Call {
            callee: name,
            arguments,
            location: location.join(end),
        }))
    }

    /// `var a = 1, b in body` becomes `VarIn(a, 1, VarIn(b, _, body))`.
    fn parse_var_in(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect_one(TokenKind::Var)?.span;

        let mut bindings = vec![];

        if !self.current_token.is(TokenKind::In) {
            loop {
                let (name, _) = self.expect_ident()?;

                let initializer = match self.current_token.kind {
                    TokenKind::Equal => {
                        self.step();
                        Some(self.parse_expression(0.0, false)?)
                    },
                    _ => None
                };

                bindings.push((name, initializer));

                if !self.current_token.is(TokenKind::Comma) {
                    break;
                }
                self.step();
            }
        }

        self.expect_one(TokenKind::In)?;

        let body = self.parse_expression(0.0, false)?;
        let location = start.join(body.location());

        let expression = bindings.into_iter()
            .rev()
            .fold(body, |body, (name, initializer)| Expression::VarIn(VarIn {
                name,
                initializer: initializer.map(Box::new),
                body: Box::new(body),
                location,
            }));

        Ok(expression)
    }

    pub fn expect_one(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.current_token.is(kind) {
            return Ok(self.step());
        }

        let error = match self.current_token.kind {
            TokenKind::Eof => ParseErrorType::UnexpectedEof,
            _ => ParseErrorType::UnexpectedToken {
                token: self.current_token.clone(),
                expected: vec![format!("`{}`", kind.as_literal())],
            }
        };

        parse_error(error, self.current_token.span, self.current_token.line)
    }

    pub fn expect_ident(&mut self) -> Result<(String, SrcSpan), ParseError> {
        match (self.current_token.kind, self.current_token.literal_text()) {
            (TokenKind::Ident, Some(name)) if !name.is_empty() => {
                let name = name.to_string();
                let token = self.step();

                Ok((name, token.span))
            },
            (TokenKind::Eof, _) => parse_error(
                ParseErrorType::UnexpectedEof,
                self.current_token.span,
                self.current_token.line
            ),
            _ => parse_error(
                ParseErrorType::ExpectedIdent,
                self.current_token.span,
                self.current_token.line
            )
        }
    }

    /// Operator names are identifiers or single operator characters.
    pub fn expect_operator_name(&mut self) -> Result<(String, SrcSpan), ParseError> {
        match (self.current_token.kind, self.current_token.literal_text()) {
            (TokenKind::Ident | TokenKind::Operator, Some(name)) if !name.is_empty() => {
                let name = name.to_string();
                let token = self.step();

                Ok((name, token.span))
            },
            _ => parse_error(
                ParseErrorType::ExpectedOperatorName,
                self.current_token.span,
                self.current_token.line
            )
        }
    }

    pub fn expect_number(&mut self) -> Result<(f64, SrcSpan), ParseError> {
        match self.current_token.number() {
            Some(value) if self.current_token.is(TokenKind::Number) => {
                let token = self.step();

                Ok((value, token.span))
            },
            _ => parse_error(
                ParseErrorType::UnexpectedToken {
                    token: self.current_token.clone(),
                    expected: vec!["a number".to_string()],
                },
                self.current_token.span,
                self.current_token.line
            )
        }
    }

    pub fn expect_precedence(&mut self) -> Result<f64, ParseError> {
        if !self.current_token.is(TokenKind::Number) {
            return parse_error(
                ParseErrorType::ExpectedPrecedence,
                self.current_token.span,
                self.current_token.line
            );
        }

        let line = self.current_token.line;
        let (value, span) = self.expect_number()?;

        if !value.is_finite() || value <= 0.0 {
            return parse_error(ParseErrorType::InvalidPrecedence { value }, span, line);
        }

        Ok(value)
    }
}

/// Parses an already scanned batch against the persistent operator table.
pub fn parse_tokens(tokens: Vec<Token>, operators: &mut OperatorTable) -> Parsed {
    Parser::new(tokens.into_iter(), operators).parse()
}

pub fn parse_program(src: &str, operators: &mut OperatorTable) -> Result<Parsed, LexicalError> {
    let tokens = scan(src)?;

    Ok(parse_tokens(tokens, operators))
}
