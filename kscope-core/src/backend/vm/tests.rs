use std::{cell::RefCell, rc::Rc};

use crate::backend::prelude::{ArithOp, Backend, BackendError, CompareOp, FunctionId, VirtualMachine};

fn params(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// `def twice(x) x + x;` followed by an entry calling `twice(21)`.
fn build_twice(vm: &mut VirtualMachine) -> Result<FunctionId, BackendError> {
    let twice = vm.declare_function("twice", &params(&["x"]))?;
    let entry = vm.append_block(twice, "entry")?;
    vm.position_at_end(entry);

    let slot = vm.build_slot(twice, "x")?;
    let x = vm.parameter(twice, 0)?;
    vm.build_store(slot, x)?;

    let lhs = vm.build_load(slot, "x")?;
    let rhs = vm.build_load(slot, "x")?;
    let sum = vm.build_arith(ArithOp::Add, lhs, rhs)?;
    vm.build_return(sum)?;

    let main = vm.declare_function("main", &[])?;
    let entry = vm.append_block(main, "entry")?;
    vm.position_at_end(entry);

    let argument = vm.const_number(21.0);
    let result = vm.build_call(twice, &[argument], "calltmp")?;
    vm.build_return(result)?;

    Ok(main)
}

#[test]
fn test_call_and_slots() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();
    vm.begin_unit("test")?;

    let main = build_twice(&mut vm)?;
    vm.finish_unit()?;

    assert_eq!(vm.execute(main)?, 42.0);

    Ok(())
}

#[test]
fn test_phi_picks_predecessor() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();
    vm.begin_unit("test")?;

    // pick(c) = if c then 10 else 20
    let pick = vm.declare_function("pick", &params(&["c"]))?;
    let entry = vm.append_block(pick, "entry")?;
    let then = vm.append_block(pick, "then")?;
    let otherwise = vm.append_block(pick, "else")?;
    let merge = vm.append_block(pick, "ifcont")?;

    vm.position_at_end(entry);
    let c = vm.parameter(pick, 0)?;
    let condition = vm.build_truth_test(c)?;
    vm.build_conditional_branch(condition, then, otherwise)?;

    vm.position_at_end(then);
    vm.build_branch(merge)?;
    vm.position_at_end(otherwise);
    vm.build_branch(merge)?;

    vm.position_at_end(merge);
    let ten = vm.const_number(10.0);
    let twenty = vm.const_number(20.0);
    let value = vm.build_phi(&[(ten, then), (twenty, otherwise)], "iftmp")?;
    vm.build_return(value)?;

    let mut entries = vec![];

    for input in [1.0, 0.0, f64::NAN, -3.5] {
        let main = vm.declare_function(&format!("main{}", entries.len()), &[])?;
        let entry = vm.append_block(main, "entry")?;
        vm.position_at_end(entry);

        let argument = vm.const_number(input);
        let result = vm.build_call(pick, &[argument], "calltmp")?;
        vm.build_return(result)?;

        entries.push(main);
    }

    vm.finish_unit()?;

    let results = entries.into_iter()
        .map(|main| vm.execute(main))
        .collect::<Result<Vec<f64>, BackendError>>()?;

    assert_eq!(results, vec![10.0, 20.0, 20.0, 10.0]);

    Ok(())
}

#[test]
fn test_comparisons_yield_doubles() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();
    vm.begin_unit("test")?;

    let main = vm.declare_function("main", &[])?;
    let entry = vm.append_block(main, "entry")?;
    vm.position_at_end(entry);

    let one = vm.const_number(1.0);
    let two = vm.const_number(2.0);
    let less = vm.build_compare(CompareOp::LessThan, one, two)?;
    let equal = vm.build_compare(CompareOp::Equal, one, two)?;
    let scaled = vm.build_arith(ArithOp::Multiply, less, two)?;
    let result = vm.build_arith(ArithOp::Subtract, scaled, equal)?;
    vm.build_return(result)?;

    vm.finish_unit()?;
    assert_eq!(vm.execute(main)?, 2.0);

    Ok(())
}

#[test]
fn test_host_binding() -> Result<(), BackendError> {
    let seen = Rc::new(RefCell::new(vec![]));
    let recorder = seen.clone();

    let mut vm = VirtualMachine::without_host();
    vm.bind_host("record", 1, move |arguments| {
        recorder.borrow_mut().push(arguments[0]);
        arguments[0] * 2.0
    });

    vm.begin_unit("test")?;

    let record = vm.declare_function("record", &params(&["x"]))?;
    let missing = vm.declare_function("missing", &params(&["x"]))?;

    let main = vm.declare_function("main", &[])?;
    let entry = vm.append_block(main, "entry")?;
    vm.position_at_end(entry);
    let argument = vm.const_number(4.0);
    let result = vm.build_call(record, &[argument], "calltmp")?;
    vm.build_return(result)?;

    let broken = vm.declare_function("broken", &[])?;
    let entry = vm.append_block(broken, "entry")?;
    vm.position_at_end(entry);
    let result = vm.build_call(missing, &[argument], "calltmp")?;
    vm.build_return(result)?;

    vm.finish_unit()?;

    assert_eq!(vm.execute(main)?, 8.0);
    assert_eq!(*seen.borrow(), vec![4.0]);

    assert_eq!(
        vm.execute(broken),
        Err(BackendError::UnresolvedSymbol { name: "missing".to_string() })
    );

    Ok(())
}

#[test]
fn test_call_depth_limit() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new().with_max_call_depth(16);
    vm.begin_unit("test")?;

    // forever() = forever()
    let forever = vm.declare_function("forever", &[])?;
    let entry = vm.append_block(forever, "entry")?;
    vm.position_at_end(entry);
    let result = vm.build_call(forever, &[], "calltmp")?;
    vm.build_return(result)?;

    vm.finish_unit()?;

    assert_eq!(vm.execute(forever), Err(BackendError::CallDepthExceeded { limit: 16 }));

    Ok(())
}

#[test]
fn test_finish_rejects_unterminated_block() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();
    vm.begin_unit("test")?;

    let main = vm.declare_function("main", &[])?;
    let entry = vm.append_block(main, "entry")?;
    vm.position_at_end(entry);

    match vm.finish_unit() {
        Err(BackendError::UnterminatedBlock { function, block }) => {
            assert_eq!(function, "main");
            assert_eq!(block, "entry");
        },
        other => panic!("Expected UnterminatedBlock, got {other:?}"),
    }

    vm.discard_body(main);
    assert!(!vm.has_body(main));
    assert_eq!(vm.insert_block(), None);
    vm.finish_unit()?;

    Ok(())
}

#[test]
fn test_dump_and_dispose() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();

    assert_eq!(vm.begin_unit("test").and_then(|_| vm.finish_unit()), Ok(()));
    vm.dispose_unit();

    assert_eq!(vm.dump(), "");
    assert_eq!(vm.declare_function("f", &[]), Err(BackendError::NoUnit));

    vm.begin_unit("listing")?;
    build_twice(&mut vm)?;

    let expected = "\
; unit listing

define twice(x) {
  s0 = slot x
entry.0:
  store $0, s0
  %0 = load s0
  %1 = load s0
  %2 = add %0, %1
  ret %2
}

define main() {
entry.0:
  %0 = call twice(21.0)
  ret %0
}
";

    assert_eq!(vm.dump(), expected);

    Ok(())
}

#[test]
fn test_forget_function() -> Result<(), BackendError> {
    let mut vm = VirtualMachine::new();
    vm.begin_unit("forget")?;

    let unused = vm.declare_function("unused", &params(&["x"]))?;
    let twice = vm.declare_function("twice", &params(&["x"]))?;

    let main = vm.declare_function("main", &[])?;
    let entry = vm.append_block(main, "entry")?;
    vm.position_at_end(entry);
    let argument = vm.const_number(1.0);
    let result = vm.build_call(twice, &[argument], "calltmp")?;
    vm.build_return(result)?;

    // called declarations and bodies stay
    assert!(!vm.forget_function(twice));
    assert!(!vm.forget_function(main));

    assert!(vm.forget_function(unused));
    assert_eq!(vm.get_function("unused"), None);
    assert!(!vm.dump().contains("unused"));

    let again = vm.declare_function("unused", &params(&["a", "b"]))?;
    assert_eq!(vm.get_function("unused"), Some(again));
    assert_eq!(vm.parameter_count(again), 2);

    Ok(())
}
