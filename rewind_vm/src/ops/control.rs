//! Control flow opcode handlers.

use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::{IterSource, SeqIterator, Value};
use rewind_compiler::bytecode::Instruction;
use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// Jumps
// =============================================================================

/// JumpAbsolute: ip = arg
#[inline(always)]
pub fn jump_absolute(_interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    Ok(ControlFlow::Jump(inst.arg as u32))
}

/// PopJumpIfFalse: if not pop(): ip = arg
#[inline(always)]
pub fn pop_jump_if_false(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let cond = interp.current_frame_mut()?.pop()?;
    if cond.is_truthy() {
        Ok(ControlFlow::Continue)
    } else {
        Ok(ControlFlow::Jump(inst.arg as u32))
    }
}

/// PopJumpIfTrue: if pop(): ip = arg
#[inline(always)]
pub fn pop_jump_if_true(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let cond = interp.current_frame_mut()?.pop()?;
    if cond.is_truthy() {
        Ok(ControlFlow::Jump(inst.arg as u32))
    } else {
        Ok(ControlFlow::Continue)
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// `iter(value)`.
pub fn make_iter(value: &Value) -> VmResult<Value> {
    let source = match value {
        Value::Iterator(_) => return Ok(value.clone()),
        Value::List(items) => IterSource::List(items.clone()),
        Value::Tuple(items) => IterSource::Tuple(items.clone()),
        Value::Str(s) => IterSource::Tuple(
            s.chars()
                .map(|c| Value::Str(c.to_string().into()))
                .collect(),
        ),
        Value::Dict(map) => {
            // Dicts are unordered; iterate keys in sorted order.
            let mut keys: Vec<_> = map.borrow().keys().cloned().collect();
            keys.sort();
            IterSource::Keys(keys)
        }
        other => {
            return Err(VmError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };
    Ok(Value::Iterator(Rc::new(RefCell::new(SeqIterator::new(source)))))
}

/// GetIter: TOS = iter(TOS)
#[inline(always)]
pub fn get_iter(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let value = frame.pop()?;
    frame.push(make_iter(&value)?);
    Ok(ControlFlow::Continue)
}

/// ForIter: push next(TOS), or pop the iterator and jump to arg
#[inline(always)]
pub fn for_iter(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let next = match frame.peek(0)? {
        Value::Iterator(it) => it.borrow_mut().next_value(),
        other => {
            return Err(VmError::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            )))
        }
    };
    match next {
        Some(value) => {
            frame.push(value);
            Ok(ControlFlow::Continue)
        }
        None => {
            frame.pop()?;
            Ok(ControlFlow::Jump(inst.arg as u32))
        }
    }
}

// =============================================================================
// Return
// =============================================================================

/// ReturnValue: return pop()
#[inline(always)]
pub fn return_value(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let value = interp.current_frame_mut()?.pop()?;
    Ok(ControlFlow::Return(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_compiler::bytecode::FunctionBuilder;

    fn collect(value: &Value) -> Vec<Value> {
        let Value::Iterator(it) = make_iter(value).unwrap() else {
            panic!("expected iterator");
        };
        let mut it = it.borrow_mut();
        std::iter::from_fn(|| it.next_value()).collect()
    }

    #[test]
    fn test_make_iter_sources() {
        assert_eq!(
            collect(&Value::tuple(vec![Value::Int(1), Value::Int(2)])),
            vec![Value::Int(1), Value::Int(2)]
        );
        assert_eq!(collect(&Value::str("ab")), vec![Value::str("a"), Value::str("b")]);

        let map = Value::dict();
        if let Value::Dict(m) = &map {
            m.borrow_mut().insert("z".into(), Value::None);
            m.borrow_mut().insert("a".into(), Value::None);
        }
        assert_eq!(collect(&map), vec![Value::str("a"), Value::str("z")]);
    }

    #[test]
    fn test_iter_of_iterator_is_identity() {
        let it = make_iter(&Value::list(vec![])).unwrap();
        assert_eq!(make_iter(&it).unwrap(), it);
    }

    #[test]
    fn test_not_iterable() {
        let err = make_iter(&Value::Int(3)).unwrap_err();
        assert_eq!(
            err.as_exception().unwrap().to_string(),
            "'int' object is not iterable"
        );
    }

    #[test]
    fn test_pop_jump_if_true() {
        let mut builder = FunctionBuilder::new("branch");
        let yes = builder.create_label();
        builder.emit_load_str("x");
        builder.emit_pop_jump_if_true(yes);
        builder.emit_load_int(0);
        builder.emit_return();
        builder.bind_label(yes);
        builder.emit_load_int(1);
        builder.emit_return();
        let result = Interpreter::new().run(builder.finish().unwrap()).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn test_for_iter_pops_exhausted_iterator() {
        // for _ in []: pass; return depth marker
        let mut builder = FunctionBuilder::new("empty_loop");
        let head = builder.create_label();
        let exit = builder.create_label();
        builder.emit_load_int(7);
        builder.emit_build_list(0);
        builder.emit_get_iter();
        builder.bind_label(head);
        builder.emit_for_iter(exit);
        builder.emit_pop_top();
        builder.emit_jump_absolute(head);
        builder.bind_label(exit);
        // Only the marker is left on the stack.
        builder.emit_return();
        let result = Interpreter::new().run(builder.finish().unwrap()).unwrap();
        assert_eq!(result, Value::Int(7));
    }
}
