//! End-to-end capture and resume.

mod common;

use common::{for_range, init_tracing, in_handler};
use rewind_compiler::bytecode::CompareKind;
use rewind_compiler::FunctionBuilder;
use rewind_vm::{Continuation, FnHook, HookAction, HookPosition, Interpreter, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn saved(interp: &Interpreter) -> Rc<Continuation> {
    match interp.global("saved") {
        Some(Value::Continuation(k)) => k.clone(),
        other => panic!("expected a saved continuation, found {:?}", other),
    }
}

/// A(x): return B(x * 2) - 1
/// B(y): return C(y + 1) + 5
/// C(z): saved = capture(); return z * 3
fn define_chain(interp: &mut Interpreter) {
    let mut c = FunctionBuilder::new("C");
    let z = c.add_param("z").unwrap();
    c.emit_load_global("capture");
    c.emit_call_function(0);
    c.emit_store_global("saved");
    c.emit_load_fast(z);
    c.emit_load_int(3);
    c.emit_binary_multiply();
    c.emit_return();
    interp.define_function(c.finish().unwrap());

    let mut b = FunctionBuilder::new("B");
    let y = b.add_param("y").unwrap();
    b.emit_load_global("C");
    b.emit_load_fast(y);
    b.emit_load_int(1);
    b.emit_binary_add();
    b.emit_call_function(1);
    b.emit_load_int(5);
    b.emit_binary_add();
    b.emit_return();
    interp.define_function(b.finish().unwrap());

    let mut a = FunctionBuilder::new("A");
    let x = a.add_param("x").unwrap();
    a.emit_load_global("B");
    a.emit_load_fast(x);
    a.emit_load_int(2);
    a.emit_binary_multiply();
    a.emit_call_function(1);
    a.emit_load_int(1);
    a.emit_binary_subtract();
    a.emit_return();
    interp.define_function(a.finish().unwrap());
}

#[test]
fn test_three_frame_chain_resumes_to_same_result() {
    init_tracing();
    let mut interp = Interpreter::new();
    define_chain(&mut interp);

    let first = interp.call_function("A", vec![Value::Int(4)]).unwrap();
    assert_eq!(first, Value::Int(31));

    let k = saved(&interp);
    assert_eq!(k.len(), 3);
    let names: Vec<String> = k
        .iter()
        .map(|record| record.function().name().to_string())
        .collect();
    assert_eq!(names, ["C", "B", "A"]);

    let resumed = interp.resume(&k).unwrap();
    assert_eq!(resumed, Value::Int(31));
    assert_eq!(interp.depth(), 0);
    assert!(!interp.resume_armed());

    // The resumed capture() call returned the empty continuation.
    assert!(saved(&interp).is_empty());
}

#[test]
fn test_operand_below_call_survives_resume() {
    // A(): return 100 + B()
    // B(): saved = capture(); return 5
    init_tracing();
    let mut interp = Interpreter::new();

    let mut b = FunctionBuilder::new("B");
    b.emit_load_global("capture");
    b.emit_call_function(0);
    b.emit_store_global("saved");
    b.emit_load_int(5);
    b.emit_return();
    interp.define_function(b.finish().unwrap());

    let mut a = FunctionBuilder::new("A");
    a.emit_load_int(100);
    a.emit_load_global("B");
    a.emit_call_function(0);
    a.emit_binary_add();
    a.emit_return();
    let a = interp.define_function(a.finish().unwrap());

    assert_eq!(interp.call_function("A", vec![]).unwrap(), Value::Int(105));

    let k = saved(&interp);
    let outer = k.outermost().unwrap();
    assert_eq!(
        outer.operand_stack(),
        &[Some(Value::Int(100)), interp.global("B").cloned()]
    );
    assert!(Rc::ptr_eq(outer.function(), &a));

    assert_eq!(interp.resume(&k).unwrap(), Value::Int(105));
    assert!(!interp.resume_armed());
}

#[test]
fn test_hooks_observe_restored_frames() {
    init_tracing();
    let mut interp = Interpreter::new();
    define_chain(&mut interp);
    interp.call_function("A", vec![Value::Int(1)]).unwrap();
    let k = saved(&interp);

    let entered = Rc::new(RefCell::new(Vec::new()));
    let log = entered.clone();
    let result = interp.with_hook_at(
        HookPosition::Last,
        Box::new(FnHook::new("observe", move |interp, index| {
            let frame = &interp.frames()[index];
            log.borrow_mut().push((frame.qualname().to_string(), frame.ip != 0));
            Ok(HookAction::Keep)
        })),
        |interp, _| interp.resume(&k),
    );

    // A(1) = B(2) - 1 = (C(3) + 5) - 1 = 13
    assert_eq!(result.unwrap(), Value::Int(13));
    assert_eq!(
        *entered.borrow(),
        vec![
            ("A".to_string(), true),
            ("B".to_string(), true),
            ("C".to_string(), true),
        ]
    );
}

#[test]
fn test_resume_twice_shares_captured_objects() {
    // A(): xs = []; return B(xs)
    // B(xs): saved = capture(); xs.append(1); return len(xs)
    init_tracing();
    let mut interp = Interpreter::new();

    let mut b = FunctionBuilder::new("B");
    let xs = b.add_param("xs").unwrap();
    b.emit_load_global("capture");
    b.emit_call_function(0);
    b.emit_store_global("saved");
    b.emit_load_fast(xs);
    b.emit_load_method("append");
    b.emit_load_int(1);
    b.emit_call_method(1);
    b.emit_pop_top();
    b.emit_load_global("len");
    b.emit_load_fast(xs);
    b.emit_call_function(1);
    b.emit_return();
    interp.define_function(b.finish().unwrap());

    let mut a = FunctionBuilder::new("A");
    let xs = a.define_local("xs");
    a.emit_build_list(0);
    a.emit_store_fast(xs);
    a.emit_load_global("B");
    a.emit_load_fast(xs);
    a.emit_call_function(1);
    a.emit_return();
    interp.define_function(a.finish().unwrap());

    assert_eq!(interp.call_function("A", vec![]).unwrap(), Value::Int(1));
    let k = saved(&interp);
    assert_eq!(interp.resume(&k).unwrap(), Value::Int(2));
    assert_eq!(interp.resume(&k).unwrap(), Value::Int(3));
}

#[test]
fn test_captured_values_are_reference_counted() {
    let mut interp = Interpreter::new();
    let shared = Rc::new(RefCell::new(vec![Value::Int(7)]));

    // f(items): saved = capture(); return None
    let mut f = FunctionBuilder::new("f");
    f.add_param("items").unwrap();
    f.emit_load_global("capture");
    f.emit_call_function(0);
    f.emit_store_global("saved");
    f.emit_return_none();
    interp.define_function(f.finish().unwrap());

    interp
        .call_function("f", vec![Value::List(shared.clone())])
        .unwrap();
    // Our handle plus the captured `items` local.
    assert_eq!(Rc::strong_count(&shared), 2);

    let k = saved(&interp);
    interp.define_global("saved", Value::None);
    drop(k);
    assert_eq!(Rc::strong_count(&shared), 1);
}

#[test]
fn test_resume_inside_except_handler() {
    // B(): try: raise Exception("x")
    //      except: r = C()
    //      return r
    // C(): saved = capture(); return 5
    init_tracing();
    let mut interp = Interpreter::new();

    let mut c = FunctionBuilder::new("C");
    c.emit_load_global("capture");
    c.emit_call_function(0);
    c.emit_store_global("saved");
    c.emit_load_int(5);
    c.emit_return();
    interp.define_function(c.finish().unwrap());

    let mut b = FunctionBuilder::new("B");
    let r = b.define_local("r");
    in_handler(&mut b, "x", |b| {
        b.emit_load_global("C");
        b.emit_call_function(0);
        b.emit_store_fast(r);
    });
    b.emit_load_fast(r);
    b.emit_return();
    interp.define_function(b.finish().unwrap());

    assert_eq!(interp.call_function("B", vec![]).unwrap(), Value::Int(5));
    let k = saved(&interp);
    let outer = k.outermost().unwrap();
    assert_eq!(outer.exception_blocks().len(), 1);
    // r, triplet, callee
    assert_eq!(outer.operand_stack().len(), 5);

    assert_eq!(interp.resume(&k).unwrap(), Value::Int(5));
    assert!(interp.handled_exception().is_none());
}

#[test]
fn test_resume_inside_loop_shares_iterator() {
    // total = 0
    // for i in range(3):
    //     if i == 1: saved = capture()
    //     total = total + i
    // return total
    init_tracing();
    let mut interp = Interpreter::new();

    let mut f = FunctionBuilder::new("looper");
    let total = f.define_local("total");
    let i = f.define_local("i");
    f.emit_load_int(0);
    f.emit_store_fast(total);
    for_range(&mut f, i, 3, |f| {
        let skip = f.create_label();
        f.emit_load_fast(i);
        f.emit_load_int(1);
        f.emit_compare(CompareKind::Eq);
        f.emit_pop_jump_if_false(skip);
        f.emit_load_global("capture");
        f.emit_call_function(0);
        f.emit_store_global("saved");
        f.bind_label(skip);
        f.emit_load_fast(total);
        f.emit_load_fast(i);
        f.emit_binary_add();
        f.emit_store_fast(total);
    });
    f.emit_load_fast(total);
    f.emit_return();
    interp.define_function(f.finish().unwrap());

    assert_eq!(interp.call_function("looper", vec![]).unwrap(), Value::Int(3));

    // The captured frame had total = 0 at i = 1, but the iterator object is
    // shared with the finished run and is already exhausted.
    let k = saved(&interp);
    assert_eq!(k.innermost().unwrap().operand_stack().len(), 4);
    assert_eq!(interp.resume(&k).unwrap(), Value::Int(1));
}

#[test]
fn test_uncaught_exception_after_resume_disarms() {
    // f(): saved = capture(); raise Exception("late")
    let mut interp = Interpreter::new();
    let mut f = FunctionBuilder::new("f");
    f.emit_load_global("capture");
    f.emit_call_function(0);
    f.emit_store_global("saved");
    f.emit_load_global("Exception");
    f.emit_load_str("late");
    f.emit_call_function(1);
    f.emit_raise();
    f.emit_return_none();
    interp.define_function(f.finish().unwrap());

    assert!(interp.call_function("f", vec![]).is_err());
    let k = saved(&interp);
    let err = interp.resume(&k).unwrap_err();
    assert_eq!(err.as_exception().unwrap().to_string(), "late");
    assert!(!interp.resume_armed());
    assert!(interp.hooks().is_empty());
}
