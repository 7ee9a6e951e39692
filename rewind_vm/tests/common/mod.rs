//! Shared helpers for integration tests.

#![allow(dead_code)]

use rewind_compiler::FunctionBuilder;
use rewind_vm::{Args, Interpreter, Value, VmResult};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Emit `for <slot> in range(count):` around `body`.
pub fn for_range(
    builder: &mut FunctionBuilder,
    slot: u8,
    count: i64,
    body: impl FnOnce(&mut FunctionBuilder),
) {
    let head = builder.create_label();
    let exit = builder.create_label();
    builder.emit_load_global("range");
    builder.emit_load_int(count);
    builder.emit_call_function(1);
    builder.emit_get_iter();
    builder.bind_label(head);
    builder.emit_for_iter(exit);
    builder.emit_store_fast(slot);
    body(builder);
    builder.emit_jump_absolute(head);
    builder.bind_label(exit);
}

/// Emit `try: raise Exception(msg) except: <body>`; the exception is
/// discarded on handler entry.
pub fn in_handler(builder: &mut FunctionBuilder, msg: &str, body: impl FnOnce(&mut FunctionBuilder)) {
    let handler = builder.create_label();
    builder.emit_setup_except(handler);
    builder.emit_load_global("Exception");
    builder.emit_load_str(msg);
    builder.emit_call_function(1);
    builder.emit_raise();
    builder.bind_label(handler);
    builder.emit_pop_top();
    body(builder);
    builder.emit_pop_except();
}

/// Builtin that records the caller's stack top and captures a continuation
/// into the globals `observed_top` and `observed`.
pub fn probe(interp: &mut Interpreter, _args: Args) -> VmResult<Value> {
    let top = interp.current_frame()?.stack_top();
    let k = interp.capture()?;
    interp.define_global("observed_top", Value::Int(top as i64));
    interp.define_global("observed", Value::Continuation(std::rc::Rc::new(k)));
    Ok(Value::None)
}

/// Interpreter with `probe` installed.
pub fn interpreter() -> Interpreter {
    init_tracing();
    let mut interp = Interpreter::new();
    interp.define_builtin("probe", probe);
    interp
}
