use std::{cell::RefCell, rc::Rc};

use crate::{
    backend::prelude::{BackendError, VirtualMachine},
    codegen::prelude::{CodegenError, Context, Evaluator, FormError},
    parser::prelude::{parse_program, Expression, Number, OperatorTable, ANONYMOUS_FUNCTION},
    utils::prelude::{Outcome, SrcSpan},
};

struct Harness {
    operators: OperatorTable,
    evaluator: Evaluator<VirtualMachine>,
}

impl Harness {
    fn new() -> Self {
        Self::with_machine(VirtualMachine::new())
    }

    fn with_machine(vm: VirtualMachine) -> Self {
        Self {
            operators: OperatorTable::new(),
            evaluator: Evaluator::new(vm).with_listing(true),
        }
    }

    /// Machine whose `record(x)` appends `x` to the returned log.
    fn recording() -> (Self, Rc<RefCell<Vec<f64>>>) {
        let log = Rc::new(RefCell::new(vec![]));
        let sink = log.clone();

        let mut vm = VirtualMachine::without_host();
        vm.bind_host("record", 1, move |arguments| {
            sink.borrow_mut().push(arguments[0]);
            0.0
        });

        (Self::with_machine(vm), log)
    }

    fn run(&mut self, src: &str) -> Outcome<Vec<f64>, Vec<FormError>> {
        let parsed = parse_program(src, &mut self.operators).expect("source should lex");
        assert!(parsed.is_ok(), "{:?}", parsed.errors);

        self.evaluator.run_batch(&parsed.forms)
    }

    fn values(&mut self, src: &str) -> Vec<f64> {
        match self.run(src) {
            Outcome::Ok(values) => values,
            Outcome::PartialFailure(_, errors) => panic!("Expected Ok, got {errors:?}"),
        }
    }

    fn errors(&mut self, src: &str) -> (Vec<f64>, Vec<(Option<usize>, CodegenError)>) {
        match self.run(src) {
            Outcome::PartialFailure(values, errors) => {
                let errors = errors.into_iter()
                    .map(|err| (err.index, err.error))
                    .collect();

                (values, errors)
            },
            Outcome::Ok(values) => panic!("Expected failure, got {values:?}"),
        }
    }
}

#[test]
fn test_arithmetic_and_comparisons() {
    let mut harness = Harness::new();

    assert_eq!(
        harness.values("1+2*3; 4 - 1 - 1; 2 < 3; 3 < 2; 2 == 2; (1 + 2) * 3;"),
        vec![7.0, 2.0, 1.0, 0.0, 1.0, 9.0]
    );
}

#[test]
fn test_functions_and_recursion() {
    let mut harness = Harness::new();

    let values = harness.values(r#"
        def fib(n) if n < 3 then 1 else fib(n - 1) + fib(n - 2);
        fib(10);
        def twice(x) x * 2;
        twice(fib(5));
    "#);

    assert_eq!(values, vec![55.0, 10.0]);
}

#[test]
fn test_redefinition_in_one_unit() {
    let mut harness = Harness::new();

    let (_, errors) = harness.errors("def foo(a) a; def foo(a b) a;");

    assert!(matches!(
        errors.as_slice(),
        [(Some(1), CodegenError::RedefinitionArity { name, previous: 1, found: 2, .. })] if name == "foo"
    ));

    let (_, errors) = harness.errors("def bar(a) a; def bar(b) b;");

    assert!(matches!(
        errors.as_slice(),
        [(Some(1), CodegenError::Redefinition { name, .. })] if name == "bar"
    ));

    // a new unit starts clean, so redefining in a later batch is fine
    assert_eq!(harness.values("def bar(a) a + 1; bar(1);"), vec![2.0]);
}

#[test]
fn test_var_shadowing() {
    let mut harness = Harness::new();

    assert_eq!(harness.values("var x = 1 in (var x = x + 1 in x);"), vec![2.0]);
    assert_eq!(
        harness.values("var x = 1 in (var y = (var x = x + 1 in x) in x * 10 + y);"),
        vec![12.0]
    );
    assert_eq!(harness.values("var a, b = 2 in a + b;"), vec![2.0]);
}

#[test]
fn test_for_loop() {
    let (mut harness, log) = Harness::recording();

    assert_eq!(harness.values("extern record(x); for i = 0, i < 5, 1.0 in record(i);"), vec![0.0]);
    assert_eq!(*log.borrow(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);

    log.borrow_mut().clear();

    // the body runs before the first test
    assert_eq!(harness.values("for i = 10, i < 5 in record(i);"), vec![0.0]);
    assert_eq!(*log.borrow(), vec![10.0]);

    log.borrow_mut().clear();

    assert_eq!(harness.values("var i = 7 in (for i = 0, i < 4, 2 in record(i)) + i;"), vec![7.0]);
    assert_eq!(*log.borrow(), vec![0.0, 2.0]);
}

#[test]
fn test_assignment() {
    let mut harness = Harness::new();

    assert_eq!(harness.values("def f(x) var y = 0 in (y = x * 2) + y; f(4);"), vec![16.0]);

    assert_eq!(
        harness.values("def count(n) var total in (for i = 0, i < n in total = total + i) + total; count(5);"),
        vec![10.0]
    );

    let (_, errors) = harness.errors("def g(x) 1 = x;");
    assert!(matches!(errors.as_slice(), [(Some(0), CodegenError::AssignToNonVariable { .. })]));
}

#[test]
fn test_nested_if_merges() {
    let mut harness = Harness::new();

    let values = harness.values(r#"
        def sign(x) if x < 0 then 0 - 1 else (if x == 0 then 0 else 1);
        def clamp(x) if x < 1 then (if x < 0 then 0 else x) else 1;
        sign(0 - 5); sign(0); sign(3);
        clamp(0 - 2); clamp(0); clamp(7);
    "#);

    assert_eq!(values, vec![-1.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_user_operators() {
    let mut harness = Harness::new();

    harness.values(r#"
        def binary | 5 (a b) if a then 1 else if b then 1 else 0;
        def unary ! (v) if v then 0 else 1;
        def binary : 1 (x y) y;
    "#);

    assert_eq!(harness.values("0 | 1; 0 | 0; !0; !(1 | 0); 1 : 2 : 3;"), vec![1.0, 0.0, 1.0, 0.0, 3.0]);

    assert_eq!(harness.values("def unary - (v) 0 - v; -3; - -3; 4 | 0;"), vec![-3.0, 3.0, 1.0]);
}

#[test]
fn test_definitions_survive_their_unit() {
    let mut harness = Harness::new();

    assert!(harness.values("def square(x) x * x;").is_empty());
    assert!(harness.evaluator.backend().unit().is_none());
    assert!(harness.evaluator.is_registered("square"));

    assert_eq!(harness.values("square(4);"), vec![16.0]);
    assert_eq!(harness.values("def quad(x) square(square(x)); quad(2);"), vec![16.0]);
    assert_eq!(harness.values("quad(3);"), vec![81.0]);
}

#[test]
fn test_relowering_is_deterministic() {
    let mut harness = Harness::new();

    harness.values("def fib(n) if n < 3 then 1 else fib(n - 1) + fib(n - 2);");

    let mut listings = vec![];

    for _ in 0..2 {
        assert_eq!(harness.values("fib(10);"), vec![55.0]);

        // first line names the unit
        let listing = harness.evaluator.last_listing()
            .map(|listing| listing.lines().skip(1).collect::<Vec<&str>>().join("\n"))
            .unwrap_or_default();

        listings.push(listing);
    }

    assert!(listings[0].contains("define fib(n)"));
    assert_eq!(listings[0], listings[1]);
}

#[test]
fn test_mutual_recursion_across_batches() {
    let mut harness = Harness::new();

    harness.values(r#"
        extern odd(n);
        def even(n) if n == 0 then 1 else odd(n - 1);
        def odd(n) if n == 0 then 0 else even(n - 1);
    "#);

    assert_eq!(harness.values("even(10); odd(7); even(3);"), vec![1.0, 1.0, 0.0]);
}

#[test]
fn test_anonymous_functions_are_not_registered() {
    let mut harness = Harness::new();

    assert_eq!(harness.values("1; 2;"), vec![1.0, 2.0]);

    let listing = harness.evaluator.last_listing().unwrap_or_default().to_string();
    assert!(listing.contains(&format!("define {ANONYMOUS_FUNCTION}.0()")));
    assert!(listing.contains(&format!("define {ANONYMOUS_FUNCTION}.1()")));

    assert!(harness.evaluator.registered().is_empty());
}

#[test]
fn test_recovery_per_form() {
    let mut harness = Harness::new();

    let (values, errors) = harness.errors("foo(1); x; 1 + 1; def h(a a) a; extern putchard(c); putchard(1, 2);");

    assert_eq!(values, vec![2.0]);
    assert!(matches!(
        errors.as_slice(),
        [
            (Some(0), CodegenError::UnknownFunction { .. }),
            (Some(1), CodegenError::UnboundVariable { .. }),
            (Some(3), CodegenError::DuplicateParameter { .. }),
            (Some(5), CodegenError::ArgumentCount { expected: 1, found: 2, .. }),
        ]
    ));
}

#[test]
fn test_failed_definition_is_rolled_back() {
    let mut harness = Harness::new();

    harness.values("def foo(x) x;");

    let (values, errors) = harness.errors("def foo(x) bar(x); foo(5);");

    assert_eq!(values, vec![5.0]);
    assert!(matches!(
        errors.as_slice(),
        [(Some(0), CodegenError::UnknownFunction { name, .. })] if name == "bar"
    ));

    let (_, errors) = harness.errors("def fresh(x) missing(x);");
    assert_eq!(errors.len(), 1);
    assert!(!harness.evaluator.is_registered("fresh"));
    assert_eq!(harness.evaluator.registered(), vec!["foo"]);
}

#[test]
fn test_failed_redefinition_leaves_previous_usable() {
    let mut harness = Harness::new();

    harness.values("def foo(x) x;");

    let (values, errors) = harness.errors("def foo(x y) nope(); foo(1);");

    assert_eq!(values, vec![1.0]);
    assert!(matches!(
        errors.as_slice(),
        [(Some(0), CodegenError::UnknownFunction { name, .. })] if name == "nope"
    ));

    let listing = harness.evaluator.last_listing().unwrap_or_default().to_string();
    assert!(listing.contains("define foo(x) {"), "{listing}");
    assert!(!listing.contains("foo(x y)"), "{listing}");
}

#[test]
fn test_deep_recursion() {
    let mut harness = Harness::new();

    assert_eq!(
        harness.values("def count(n) if n < 1 then 0 else 1 + count(n - 1); count(5000);"),
        vec![5000.0]
    );
}

#[test]
fn test_execution_errors() {
    let mut harness = Harness::with_machine(VirtualMachine::without_host().with_max_call_depth(64));

    let (values, errors) = harness.errors("def forever(x) forever(x); forever(1); extern sin(x); sin(1); 3;");

    assert_eq!(values, vec![3.0]);
    assert_eq!(errors, vec![
        (Some(1), CodegenError::Backend(BackendError::CallDepthExceeded { limit: 64 })),
        (Some(3), CodegenError::Backend(BackendError::UnresolvedSymbol { name: "sin".to_string() })),
    ]);
}

#[test]
fn test_form_error_locations() {
    let mut harness = Harness::new();

    match harness.run("1;\n  y + 1;") {
        Outcome::PartialFailure(_, errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].location, Some(SrcSpan::from(5, 6)));
        },
        Outcome::Ok(values) => panic!("Expected failure, got {values:?}"),
    }
}

#[test]
fn test_bare_expression_is_not_a_form() {
    let mut evaluator = Evaluator::new(VirtualMachine::new());

    let form = Expression::Number(Number { value: 1.0, location: SrcSpan::from(0, 1) });

    match evaluator.run_batch(&[form]) {
        Outcome::PartialFailure(values, errors) => {
            assert!(values.is_empty());
            assert!(matches!(errors[0].error, CodegenError::ExpectedFunction { .. }));
        },
        Outcome::Ok(values) => panic!("Expected failure, got {values:?}"),
    }
}

#[test]
fn test_context_is_persistent() {
    let outer = Context::new().bind("x", 1).bind("y", 2);
    let inner = outer.bind("x", 3);

    assert_eq!(inner.lookup("x"), Some(&3));
    assert_eq!(inner.lookup("y"), Some(&2));
    assert_eq!(outer.lookup("x"), Some(&1));
    assert_eq!(outer.lookup("z"), None);
    assert!(Context::<u8>::new().is_empty());
}
