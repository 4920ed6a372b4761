use crate::{
    lexer::prelude::{LexicalError, LexicalErrorType, Token, TokenKind},
    parser::prelude::{
        parse_program, Binary, BinaryOp, Expression, Number, OperatorTable, ParseErrorType, Parsed,
        PrototypeKind, ANONYMOUS_FUNCTION
    },
    utils::prelude::SrcSpan,
};

fn body(form: &Expression) -> String {
    match form {
        Expression::Function(function) if function.prototype.is_anonymous() => function.body.to_string(),
        other => other.to_string(),
    }
}

fn printed(parsed: &Parsed) -> Vec<String> {
    parsed.forms.iter().map(body).collect()
}

fn anonymous_body(form: &Expression) -> &Expression {
    match form {
        Expression::Function(function) if function.prototype.is_anonymous() => &function.body,
        other => panic!("Expected anonymous function, got {other}"),
    }
}

#[test]
fn test_precedence() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("1+2*3; 1-2-3; 1 < 2 == 0; (1+2)*3;", &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(printed(&parsed), vec![
        "(+ 1 (* 2 3))",
        "(- (- 1 2) 3)",
        "(< 1 (== 2 0))",
        "(* (+ 1 2) 3)",
    ]);

    match anonymous_body(&parsed.forms[0]) {
        Expression::Binary(Binary { kind: BinaryOp::Add, left, right, .. }) => {
            assert!(matches!(**left, Expression::Number(Number { value, .. }) if value == 1.0));
            assert!(matches!(**right, Expression::Binary(Binary { kind: BinaryOp::Multiply, .. })));
        },
        other => panic!("Expected Add, got {other}"),
    }

    Ok(())
}

#[test]
fn test_assignment_is_right_associative() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("x = y = 3; x = 1 + 2;", &mut operators)?;

    assert_eq!(printed(&parsed), vec!["(= x (= y 3))", "(= x (+ 1 2))"]);

    match anonymous_body(&parsed.forms[0]) {
        Expression::Binary(binary) => assert_eq!(binary.kind, BinaryOp::Assign),
        other => panic!("Expected assignment, got {other}"),
    }

    Ok(())
}

#[test]
fn test_custom_binary_operator() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let input = r#"
        def binary | 5 (a b) if a then 1 else if b then 1 else 0;
        a | b | c;
        a | b + c;
    "#;

    let parsed = parse_program(input, &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(&printed(&parsed)[1..], ["(| (| a b) c)", "(| a (+ b c))"]);

    assert_eq!(parsed.forms[0].linked_name().as_deref(), Some("binary_|"));

    match anonymous_body(&parsed.forms[1]) {
        Expression::Binary(binary) => {
            assert_eq!(binary.kind, BinaryOp::User("|".to_string()));
            assert_eq!(binary.callee().as_deref(), Some("binary_|"));
        },
        other => panic!("Expected binary, got {other}"),
    }

    Ok(())
}

#[test]
fn test_operator_used_before_declaration() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("a | b; def binary | 5 (a b) a; a | b;", &mut operators)?;

    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].error, ParseErrorType::UndeclaredOperator { name: "|".to_string() });

    assert_eq!(parsed.forms.len(), 2);
    assert_eq!(body(&parsed.forms[1]), "(| a b)");

    Ok(())
}

#[test]
fn test_operators_persist_between_batches() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let first = parse_program("def binary bar 30 (a b) a * b; def unary ! (v) 0 - v;", &mut operators)?;
    assert!(first.is_ok(), "{:?}", first.errors);

    let second = parse_program("x bar y + 1; !x; a - !b;", &mut operators)?;
    assert!(second.is_ok(), "{:?}", second.errors);

    assert_eq!(printed(&second), vec!["(+ (bar x y) 1)", "(! x)", "(- a (! b))"]);

    Ok(())
}

#[test]
fn test_unary_operator() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("def unary - (v) 0 - v; -x; --x;", &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(&printed(&parsed)[1..], ["(- x)", "(- (- x))"]);

    match anonymous_body(&parsed.forms[1]) {
        Expression::Unary(unary) => {
            assert_eq!(unary.callee(), "unary_-");
            assert!(matches!(*unary.operand, Expression::Variable(ref variable) if variable.name == "x"));
        },
        other => panic!("Expected unary, got {other}"),
    }

    Ok(())
}

#[test]
fn test_prototype_forms() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let input = r#"
        extern sin(x);
        def foo(a, b) a * b;
        def bar(a b c) a;
        def binary 7 & (a b) a;
        def unary neg(v) 0 - v;
    "#;

    let parsed = parse_program(input, &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(printed(&parsed), vec![
        "(extern (proto sin x))",
        "(def (proto foo a b) (* a b))",
        "(def (proto bar a b c) a)",
        "(def (proto binary_& 7 a b) a)",
        "(def (proto unary_neg v) (- 0 v))",
    ]);

    match &parsed.forms[3] {
        Expression::Function(function) => {
            assert_eq!(function.prototype.kind, PrototypeKind::BinaryOperator { precedence: 7.0 });
        },
        other => panic!("Expected function, got {other}"),
    }

    Ok(())
}

#[test]
fn test_operator_prototype_errors() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let input = r#"
        def unary ! (a b) a;
        def binary ~ 3 (a) a;
        def binary + 5 (a b) a;
        def binary | 0 (a b) a;
        def binary | (a b) a;
    "#;

    let parsed = parse_program(input, &mut operators)?;

    let errors = parsed.errors.iter()
        .map(|err| err.error.clone())
        .collect::<Vec<_>>();

    assert_eq!(errors, vec![
        ParseErrorType::OperatorArity { construct: "unary", expected: 1, found: 2 },
        ParseErrorType::OperatorArity { construct: "binary", expected: 2, found: 1 },
        ParseErrorType::BuiltinOperator { name: "+".to_string() },
        ParseErrorType::InvalidPrecedence { value: 0.0 },
        ParseErrorType::ExpectedPrecedence,
    ]);
    assert!(parsed.forms.is_empty());

    // a rejected prototype doesn't declare its operator
    let parsed = parse_program("!x;", &mut operators)?;
    assert_eq!(parsed.errors.len(), 1);

    Ok(())
}

#[test]
fn test_var_in_desugars_right_to_left() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("var a = 1, b in a + b; var x = 1 in (var x = x + 1 in x);", &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(printed(&parsed), vec![
        "(var (a 1) (var (b) (+ a b)))",
        "(var (x 1) (var (x (+ x 1)) x))",
    ]);

    Ok(())
}

#[test]
fn test_control_flow() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let input = r#"
        if x < 3 then 1 else 2;
        for i = 0, i < 5 in f(i);
        for i = 1, i < n, 2 in putchard(42);
        foo(1, bar(2), x);
        foo();
    "#;

    let parsed = parse_program(input, &mut operators)?;

    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(printed(&parsed), vec![
        "(if (< x 3) 1 2)",
        "(for (i 0 (< i 5)) (call f i))",
        "(for (i 1 (< i n) 2) (call putchard 42))",
        "(call foo 1 (call bar 2) x)",
        "(call foo)",
    ]);

    Ok(())
}

#[test]
fn test_top_level_expression_is_anonymous() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program(";; 4 + 5;", &mut operators)?;

    assert_eq!(parsed.forms.len(), 1);
    assert!(parsed.forms[0].is_anonymous());
    assert_eq!(parsed.forms[0].linked_name().as_deref(), Some(ANONYMOUS_FUNCTION));
    assert_eq!(parsed.forms[0].to_string(), "(def (proto __anon_expr) (+ 4 5))");

    Ok(())
}

#[test]
fn test_recovery() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("def foo(x x + ; 1 + 2; extern bar(;", &mut operators)?;

    assert_eq!(printed(&parsed), vec!["(+ 1 2)"]);
    assert_eq!(parsed.errors.len(), 2);

    let parsed = parse_program("1 + ) if x then 1 else 2;", &mut operators)?;

    assert_eq!(printed(&parsed), vec!["(if x 1 2)"]);
    assert_eq!(parsed.errors.len(), 1);
    assert!(matches!(
        &parsed.errors[0].error,
        ParseErrorType::UnexpectedToken { token, .. } if token.is(TokenKind::RParen)
    ));

    Ok(())
}

#[test]
fn test_error_positions() -> Result<(), LexicalError> {
    let mut operators = OperatorTable::new();

    let parsed = parse_program("1;\n(2 + );", &mut operators)?;

    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].line, 2);
    assert_eq!(parsed.errors[0].span, SrcSpan::from(8, 9));

    let parsed = parse_program("1 + 2", &mut operators)?;

    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].error, ParseErrorType::UnexpectedEof);
    assert!(parsed.errors[0].is_eof());

    Ok(())
}

#[test]
fn test_binary_from_invalid_token() {
    let left = Expression::Number(Number { value: 1.0, location: SrcSpan::from(0, 1) });
    let right = Expression::Number(Number { value: 2.0, location: SrcSpan::from(2, 3) });
    let token = Token::new(TokenKind::LParen, "(", 1, SrcSpan::from(1, 2));

    match Binary::new(token, left, right) {
        Err(err) => assert!(matches!(err.error, ParseErrorType::InvalidBinaryOperator { .. })),
        Ok(binary) => panic!("Expected Err but got {binary:?}"),
    }
}

#[test]
fn test_lexical_error_rejects_batch() {
    let mut operators = OperatorTable::new();

    match parse_program("1 + 2; 3.;", &mut operators) {
        Err(err) => assert_eq!(err.error, LexicalErrorType::MissingDigitAfterPeriod),
        Ok(parsed) => panic!("Expected Err but got {parsed:?}"),
    }
}
