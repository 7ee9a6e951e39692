//! Exception opcode handlers and stack unwinding.
//!
//! Stack layout inside an `except` handler entered at level `L`:
//!
//! ```text
//! [ locals | ... L slots ... | prev type | prev value | prev tb | exception ]
//!                              ^ L (ExceptHandler block level)
//! ```
//!
//! The three `prev` slots hold the exception that was being handled when the
//! handler was entered (all empty when there was none). They stay on the
//! stack until `PopExcept`, which is why an active handler contributes three
//! slots to a frame's live stack.

use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::frame::{Block, BlockKind, Frame, EXC_TRIPLET_SLOTS};
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_compiler::bytecode::Instruction;
use tracing::trace;

// =============================================================================
// Blocks
// =============================================================================

/// SetupExcept: push a try block with handler at arg
#[inline(always)]
pub fn setup_except(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let level = frame.stack_top() as u32;
    frame.blocks.push(Block::setup_except(level, inst.arg as u32));
    Ok(ControlFlow::Continue)
}

/// PopBlock: leave the innermost try block
#[inline(always)]
pub fn pop_block(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    match frame.blocks.pop() {
        Some(block) if block.kind == BlockKind::SetupExcept => Ok(ControlFlow::Continue),
        other => Err(VmError::internal(format!(
            "PopBlock without a try block in {} (found {:?})",
            frame.qualname(),
            other
        ))),
    }
}

/// PopExcept: leave the innermost handler and restore the previous exception
#[inline(always)]
pub fn pop_except(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp
        .frames
        .last_mut()
        .ok_or_else(|| VmError::internal("no active frame"))?;
    let block = match frame.blocks.pop() {
        Some(block) if block.kind == BlockKind::ExceptHandler => block,
        other => {
            return Err(VmError::internal(format!(
                "PopExcept outside a handler in {} (found {:?})",
                frame.qualname(),
                other
            )))
        }
    };
    interp.exc_state = pop_triplet(frame, block)?;
    Ok(ControlFlow::Continue)
}

/// Raise: raise TOS
#[inline(always)]
pub fn raise(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let value = interp.current_frame_mut()?.pop()?;
    match value {
        Value::Exception(_) => Ok(ControlFlow::Raise(value)),
        _ => Err(VmError::type_error("exceptions must derive from BaseException")),
    }
}

// =============================================================================
// Unwinding
// =============================================================================

/// Drop a handler's stack down to its triplet and pop it, returning the
/// exception that was being handled before the handler was entered.
fn pop_triplet(frame: &mut Frame, block: Block) -> VmResult<Option<Value>> {
    frame.truncate(block.level as usize + EXC_TRIPLET_SLOTS);
    let _traceback = frame.pop_slot()?;
    let value = frame.pop_slot()?;
    let _type = frame.pop_slot()?;
    Ok(value)
}

/// Route `exc` to the innermost try block of the current frame.
///
/// Handler blocks passed on the way out are closed, restoring the exception
/// state they saved. Returns `Err(VmError::Exception(exc))` when the frame
/// has no try block left, leaving the caller to unwind further.
pub fn unwind(interp: &mut Interpreter, exc: Value) -> VmResult<()> {
    let frame = interp
        .frames
        .last_mut()
        .ok_or_else(|| VmError::internal("no active frame"))?;

    while let Some(block) = frame.blocks.pop() {
        match block.kind {
            BlockKind::ExceptHandler => {
                interp.exc_state = pop_triplet(frame, block)?;
            }
            BlockKind::SetupExcept => {
                frame.truncate(block.level as usize);
                frame.blocks.push(Block::except_handler(block.level));
                match interp.exc_state.take() {
                    Some(prev) => {
                        frame.push(Value::str(prev.type_name()));
                        frame.push(prev);
                        frame.push(Value::None);
                    }
                    None => {
                        for _ in 0..EXC_TRIPLET_SLOTS {
                            frame.push_empty();
                        }
                    }
                }
                frame.push(exc.clone());
                interp.exc_state = Some(exc);
                frame.ip = block.handler;
                trace!(
                    function = %frame.qualname(),
                    handler = block.handler,
                    level = block.level,
                    "exception handled"
                );
                return Ok(());
            }
        }
    }

    Err(VmError::Exception(exc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_compiler::bytecode::{CompareKind, FunctionBuilder};

    /// raise Exception(msg)
    fn raise_exception(builder: &mut FunctionBuilder, msg: &str) {
        builder.emit_load_global("Exception");
        builder.emit_load_str(msg);
        builder.emit_call_function(1);
        builder.emit_raise();
    }

    #[test]
    fn test_handler_receives_exception() {
        // try: raise Exception("boom") except e: return e.args
        let mut builder = FunctionBuilder::new("catch");
        let handler = builder.create_label();
        builder.emit_setup_except(handler);
        raise_exception(&mut builder, "boom");
        builder.emit_pop_block();
        builder.emit_return_none();
        builder.bind_label(handler);
        builder.emit_load_attr("args");
        builder.emit_return();

        let result = Interpreter::new().run(builder.finish().unwrap()).unwrap();
        assert_eq!(result, Value::tuple(vec![Value::str("boom")]));
    }

    #[test]
    fn test_uncaught_exception() {
        let mut builder = FunctionBuilder::new("raiser");
        raise_exception(&mut builder, "loose");
        builder.emit_return_none();

        let err = Interpreter::new().run(builder.finish().unwrap()).unwrap_err();
        let exc = err.as_exception().unwrap();
        assert_eq!(exc.type_name(), "Exception");
        assert_eq!(exc.to_string(), "loose");
    }

    #[test]
    fn test_raise_non_exception() {
        let mut builder = FunctionBuilder::new("bad_raise");
        builder.emit_load_int(1);
        builder.emit_raise();
        builder.emit_return_none();

        let err = Interpreter::new().run(builder.finish().unwrap()).unwrap_err();
        assert_eq!(
            err.as_exception().unwrap().to_string(),
            "exceptions must derive from BaseException"
        );
    }

    #[test]
    fn test_pop_except_restores_outer_exception() {
        // try: raise A
        // except:
        //     try: raise B
        //     except: pass
        //     <handled exception is A again here>
        let mut builder = FunctionBuilder::new("nested");
        let seen = builder.define_local("seen");
        let outer = builder.create_label();
        let inner = builder.create_label();
        let after_inner = builder.create_label();

        builder.emit_setup_except(outer);
        raise_exception(&mut builder, "A");
        builder.emit_pop_block();
        builder.emit_return_none();

        builder.bind_label(outer);
        builder.emit_pop_top();
        builder.emit_setup_except(inner);
        raise_exception(&mut builder, "B");
        builder.emit_pop_block();
        builder.emit_jump_absolute(after_inner);
        builder.bind_label(inner);
        builder.emit_pop_top();
        builder.emit_pop_except();
        builder.bind_label(after_inner);
        builder.emit_load_global("probe");
        builder.emit_call_function(0);
        builder.emit_store_fast(seen);
        builder.emit_pop_except();
        builder.emit_load_fast(seen);
        builder.emit_return();

        fn probe(interp: &mut Interpreter, _args: crate::builtins::Args) -> VmResult<Value> {
            Ok(interp
                .handled_exception()
                .map(|exc| Value::Str(exc.to_string().into()))
                .unwrap_or(Value::None))
        }

        let mut interp = Interpreter::new();
        interp.define_builtin("probe", probe);
        let result = interp.run(builder.finish().unwrap()).unwrap();
        assert_eq!(result, Value::str("A"));
        assert!(interp.handled_exception().is_none());
    }

    #[test]
    fn test_exception_in_handler_propagates_to_outer_try() {
        // try:
        //     try: raise A
        //     except: raise B
        // except e: return e.args == ("B",)
        let mut builder = FunctionBuilder::new("rethrow");
        let outer = builder.create_label();
        let inner = builder.create_label();

        builder.emit_setup_except(outer);
        builder.emit_setup_except(inner);
        raise_exception(&mut builder, "A");
        builder.emit_pop_block();
        builder.bind_label(inner);
        builder.emit_pop_top();
        raise_exception(&mut builder, "B");
        builder.emit_pop_except();
        builder.emit_pop_block();
        builder.emit_return_none();

        builder.bind_label(outer);
        builder.emit_load_attr("args");
        builder.emit_load_str("B");
        builder.emit_build_tuple(1);
        builder.emit_compare(CompareKind::Eq);
        builder.emit_return();

        let mut interp = Interpreter::new();
        let result = interp.run(builder.finish().unwrap()).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn test_handler_stack_holds_triplet() {
        let mut builder = FunctionBuilder::new("depth");
        let handler = builder.create_label();
        builder.emit_setup_except(handler);
        raise_exception(&mut builder, "x");
        builder.bind_label(handler);
        builder.emit_load_global("depth");
        builder.emit_call_function(0);
        builder.emit_return();

        fn depth(interp: &mut Interpreter, _args: crate::builtins::Args) -> VmResult<Value> {
            // Caller stack: triplet, exception, callee.
            Ok(Value::Int(interp.current_frame()?.stack_depth() as i64))
        }

        let mut interp = Interpreter::new();
        interp.define_builtin("depth", depth);
        assert_eq!(interp.run(builder.finish().unwrap()).unwrap(), Value::Int(5));
    }
}
