use std::{fmt::Display, rc::Rc};

use crate::{
    lexer::prelude::{Token, TokenKind},
    parser::prelude::{parse_error, InfixParse, Parse, ParseError, ParseErrorType, Parser},
    utils::prelude::SrcSpan,
};
use super::visitor::{ExpressionVisitor, Printer};

/// Name of the synthetic function wrapping a top-level expression.
///
/// Identifiers start with a letter, so it can't clash with user code.
pub const ANONYMOUS_FUNCTION: &str = "__anon_expr";

/// Result of parsing one batch: the good forms and the errors of the bad ones.
#[derive(Debug, Default)]
pub struct Parsed {
    pub forms: Vec<Expression>,
    pub errors: Vec<ParseError>,
}

impl Parsed {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(Number),
    Variable(Variable),
    Binary(Binary),
    Unary(Unary),
    Call(Call),
    If(If),
    For(For),
    VarIn(VarIn),
    Prototype(Prototype),
    Function(Rc<Function>),
    Extern(Rc<Extern>),
}

impl Expression {
    pub fn accept<C, V: ExpressionVisitor<C>>(&self, visitor: &mut V, context: C) -> V::Output {
        match self {
            Self::Number(number) => visitor.visit_number(context, number),
            Self::Variable(variable) => visitor.visit_variable(context, variable),
            Self::Binary(binary) => visitor.visit_binary(context, binary),
            Self::Unary(unary) => visitor.visit_unary(context, unary),
            Self::Call(call) => visitor.visit_call(context, call),
            Self::If(if_) => visitor.visit_if(context, if_),
            Self::For(for_) => visitor.visit_for(context, for_),
            Self::VarIn(var_in) => visitor.visit_var_in(context, var_in),
            Self::Prototype(prototype) => visitor.visit_prototype(context, prototype),
            Self::Function(function) => visitor.visit_function(context, function),
            Self::Extern(extern_) => visitor.visit_extern(context, extern_),
        }
    }

    pub fn location(&self) -> SrcSpan {
        match self {
            Self::Number(number) => number.location,
            Self::Variable(variable) => variable.location,
            Self::Binary(binary) => binary.location,
            Self::Unary(unary) => unary.location,
            Self::Call(call) => call.location,
            Self::If(if_) => if_.location,
            Self::For(for_) => for_.location,
            Self::VarIn(var_in) => var_in.location,
            Self::Prototype(prototype) => prototype.location,
            Self::Function(function) => function.location,
            Self::Extern(extern_) => extern_.location,
        }
    }

    /// Name under which a top-level definition is registered.
    pub fn linked_name(&self) -> Option<String> {
        match self {
            Self::Prototype(prototype) => Some(prototype.linked_name()),
            Self::Function(function) => Some(function.prototype.linked_name()),
            Self::Extern(extern_) => Some(extern_.prototype.linked_name()),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Function(function) if function.prototype.is_anonymous())
    }
}

impl<T: Iterator<Item = Token>> Parse<T> for Expression {
    fn parse(
        parser: &mut Parser<'_, T>,
        precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        parser.parse_expression(precedence.unwrap_or(0.0), false)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.accept(&mut Printer, ()))
    }
}

// number -> <digit> {<digit>} [. <digit> {<digit>}]
#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub value: f64,
    pub location: SrcSpan,
}

// variable -> <identifier>
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub location: SrcSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    LessThan,
    Equal,
    Assign,
    User(String),
}

impl BinaryOp {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::LessThan => "<",
            Self::Equal => "==",
            Self::Assign => "=",
            Self::User(name) => name,
        }
    }
}

// binary -> <expression> <operator> <expression>
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub operator: Token,
    pub kind: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub location: SrcSpan,
}

impl Binary {
    /// Builds the node, deciding once what the operator token means.
    pub fn new(operator: Token, left: Expression, right: Expression) -> Result<Self, ParseError> {
        let kind = match operator.kind {
            TokenKind::Equal => BinaryOp::Assign,
            TokenKind::Operator => match operator.lexeme.as_str() {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Subtract,
                "*" => BinaryOp::Multiply,
                "<" => BinaryOp::LessThan,
                "==" => BinaryOp::Equal,
                other => BinaryOp::User(other.to_string()),
            },
            TokenKind::Ident => match operator.literal_text() {
                Some(name) if !name.is_empty() => BinaryOp::User(name.to_string()),
                _ => return parse_error(
                    ParseErrorType::InvalidBinaryOperator { token: operator.clone() },
                    operator.span,
                    operator.line
                ),
            },
            _ => return parse_error(
                ParseErrorType::InvalidBinaryOperator { token: operator.clone() },
                operator.span,
                operator.line
            ),
        };

        let location = left.location().join(right.location());

        Ok(Self {
            operator,
            kind,
            left: Box::new(left),
            right: Box::new(right),
            location,
        })
    }

    /// Function implementing a user-declared operator.
    pub fn callee(&self) -> Option<String> {
        match &self.kind {
            BinaryOp::User(name) => Some(format!("binary_{name}")),
            _ => None,
        }
    }
}

impl<T: Iterator<Item = Token>> InfixParse<T> for Binary {
    fn parse(
        parser: &mut Parser<'_, T>,
        left: Expression,
        precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let precedence = precedence
            .or_else(|| parser.current_precedence())
            .unwrap_or(0.0);
        let right_associative = parser.operators.is_right_associative(&parser.current_token);

        let operator = parser.step();
        let right = parser.parse_expression(precedence, right_associative)?;

        Binary::new(operator, left, right)
    }
}

// unary -> <unary_operator> <unary>
#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub operator: Token,
    pub operand: Box<Expression>,
    pub location: SrcSpan,
}

impl Unary {
    pub fn name(&self) -> &str {
        self.operator.literal_text().unwrap_or(&self.operator.lexeme)
    }

    pub fn callee(&self) -> String {
        format!("unary_{}", self.name())
    }
}

// call -> <identifier> ( [<expression> {, <expression>}] )
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: String,
    pub arguments: Vec<Expression>,
    pub location: SrcSpan,
}

// if -> if <expression> then <expression> else <expression>
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Box<Expression>,
    pub then: Box<Expression>,
    pub otherwise: Box<Expression>,
    pub location: SrcSpan,
}

impl<T: Iterator<Item = Token>> Parse<T> for If {
    fn parse(
        parser: &mut Parser<'_, T>,
        _precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let start = parser.expect_one(TokenKind::If)?.span;

        let condition = Expression::parse(parser, None)?;
        parser.expect_one(TokenKind::Then)?;

        let then = Expression::parse(parser, None)?;
        parser.expect_one(TokenKind::Else)?;

        let otherwise = Expression::parse(parser, None)?;
        let location = start.join(otherwise.location());

        Ok(Self {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            location,
        })
    }
}

// for -> for <identifier> = <expression> , <expression> [, <expression>] in <expression>
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub variable: String,
    pub start: Box<Expression>,
    pub end: Box<Expression>,
    pub step: Option<Box<Expression>>,
    pub body: Box<Expression>,
    pub location: SrcSpan,
}

impl<T: Iterator<Item = Token>> Parse<T> for For {
    fn parse(
        parser: &mut Parser<'_, T>,
        _precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let begin = parser.expect_one(TokenKind::For)?.span;

        let (variable, _) = parser.expect_ident()?;
        parser.expect_one(TokenKind::Equal)?;

        let start = Expression::parse(parser, None)?;
        parser.expect_one(TokenKind::Comma)?;

        let end = Expression::parse(parser, None)?;

        let step = match parser.current_token.kind {
            TokenKind::Comma => {
                parser.step();
                Some(Box::new(Expression::parse(parser, None)?))
            },
            _ => None
        };

        parser.expect_one(TokenKind::In)?;

        let body = Expression::parse(parser, None)?;
        let location = begin.join(body.location());

        Ok(Self {
            variable,
            start: Box::new(start),
            end: Box::new(end),
            step,
            body: Box::new(body),
            location,
        })
    }
}

// var_in -> var [<identifier> [= <expression>] {, <identifier> [= <expression>]}] in <expression>
#[derive(Debug, Clone, PartialEq)]
pub struct VarIn {
    pub name: String,
    pub initializer: Option<Box<Expression>>,
    pub body: Box<Expression>,
    pub location: SrcSpan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrototypeKind {
    Function,
    UnaryOperator,
    BinaryOperator { precedence: f64 },
}

// prototype -> [unary | binary <number>] <identifier> ( {<identifier> [,]} )
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub parameters: Vec<String>,
    pub kind: PrototypeKind,
    pub location: SrcSpan,
}

impl Prototype {
    pub fn anonymous(location: SrcSpan) -> Self {
        Self {
            name: ANONYMOUS_FUNCTION.to_string(),
            parameters: vec![],
            kind: PrototypeKind::Function,
            location,
        }
    }

    pub fn linked_name(&self) -> String {
        match self.kind {
            PrototypeKind::Function => self.name.clone(),
            PrototypeKind::UnaryOperator => format!("unary_{}", self.name),
            PrototypeKind::BinaryOperator { .. } => format!("binary_{}", self.name),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS_FUNCTION
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl<T: Iterator<Item = Token>> Parse<T> for Prototype {
    fn parse(
        parser: &mut Parser<'_, T>,
        _precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let start = parser.current_token.span;
        let line = parser.current_token.line;

        let (name, kind) = match parser.current_token.kind {
            TokenKind::Unary => {
                parser.step();
                let (name, _) = parser.expect_operator_name()?;

                (name, PrototypeKind::UnaryOperator)
            },
            TokenKind::Binary => {
                parser.step();

                // precedence may come before or after the operator name
                let (name, precedence) = match parser.current_token.kind {
                    TokenKind::Number => {
                        let precedence = parser.expect_precedence()?;
                        let (name, _) = parser.expect_operator_name()?;

                        (name, precedence)
                    },
                    _ => {
                        let (name, _) = parser.expect_operator_name()?;
                        let precedence = parser.expect_precedence()?;

                        (name, precedence)
                    }
                };

                (name, PrototypeKind::BinaryOperator { precedence })
            },
            _ => {
                let (name, _) = parser.expect_ident()?;

                (name, PrototypeKind::Function)
            }
        };

        parser.expect_one(TokenKind::LParen)?;

        let mut parameters = vec![];

        loop {
            match parser.current_token.kind {
                TokenKind::Ident => {
                    let (parameter, _) = parser.expect_ident()?;
                    parameters.push(parameter);

                    if parser.current_token.is(TokenKind::Comma) {
                        parser.step();
                    }
                },
                TokenKind::RParen => break,
                _ => return parse_error(
                    ParseErrorType::UnexpectedToken {
                        token: parser.current_token.clone(),
                        expected: vec!["a parameter name".to_string(), "`)`".to_string()],
                    },
                    parser.current_token.span,
                    parser.current_token.line
                )
            }
        }

        let end = parser.expect_one(TokenKind::RParen)?.span;
        let location = start.join(end);

        let expected = match kind {
            PrototypeKind::Function => None,
            PrototypeKind::UnaryOperator => Some(("unary", 1)),
            PrototypeKind::BinaryOperator { .. } => Some(("binary", 2)),
        };

        if let Some((construct, expected)) = expected {
            if parameters.len() != expected {
                return parse_error(
                    ParseErrorType::OperatorArity { construct, expected, found: parameters.len() },
                    location,
                    line
                );
            }
        }

        if matches!(kind, PrototypeKind::BinaryOperator { .. }) && parser.operators.is_builtin(&name) {
            return parse_error(ParseErrorType::BuiltinOperator { name }, location, line);
        }

        match kind {
            PrototypeKind::UnaryOperator => parser.operators.declare_unary(&name),
            PrototypeKind::BinaryOperator { precedence } => parser.operators.declare_binary(&name, precedence),
            PrototypeKind::Function => {}
        }

        Ok(Self {
            name,
            parameters,
            kind,
            location,
        })
    }
}

// function -> def <prototype> <expression>
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
    pub location: SrcSpan,
}

impl Function {
    /// Wraps a top-level expression into an anonymous function.
    pub fn anonymous(body: Expression) -> Self {
        let location = body.location();

        Self {
            prototype: Prototype::anonymous(location),
            body,
            location,
        }
    }
}

impl<T: Iterator<Item = Token>> Parse<T> for Function {
    fn parse(
        parser: &mut Parser<'_, T>,
        _precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let start = parser.expect_one(TokenKind::Def)?.span;

        let prototype = Prototype::parse(parser, None)?;
        let body = Expression::parse(parser, None)?;
        let location = start.join(body.location());

        Ok(Self {
            prototype,
            body,
            location,
        })
    }
}

// extern -> extern <prototype>
#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    pub prototype: Prototype,
    pub location: SrcSpan,
}

impl<T: Iterator<Item = Token>> Parse<T> for Extern {
    fn parse(
        parser: &mut Parser<'_, T>,
        _precedence: Option<f64>
    ) -> Result<Self, ParseError> {
        let start = parser.expect_one(TokenKind::Extern)?.span;

        let prototype = Prototype::parse(parser, None)?;
        let location = start.join(prototype.location);

        Ok(Self {
            prototype,
            location,
        })
    }
}
