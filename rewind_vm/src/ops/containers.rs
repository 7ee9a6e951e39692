//! Container construction opcode handlers.

use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_compiler::bytecode::Instruction;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Pop `count` values, bottom first.
fn pop_values(interp: &mut Interpreter, count: usize) -> VmResult<Vec<Value>> {
    let frame = interp.current_frame_mut()?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(frame.pop()?);
    }
    items.reverse();
    Ok(items)
}

/// BuildTuple: push tuple of the top arg values
#[inline(always)]
pub fn build_tuple(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let items = pop_values(interp, inst.arg as usize)?;
    interp.current_frame_mut()?.push(Value::tuple(items));
    Ok(ControlFlow::Continue)
}

/// BuildList: push list of the top arg values
#[inline(always)]
pub fn build_list(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let items = pop_values(interp, inst.arg as usize)?;
    interp.current_frame_mut()?.push(Value::list(items));
    Ok(ControlFlow::Continue)
}

/// BuildMap: push dict of the top arg key/value pairs
#[inline(always)]
pub fn build_map(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let items = pop_values(interp, inst.arg as usize * 2)?;
    let mut map = FxHashMap::default();
    for pair in items.chunks_exact(2) {
        let key = match &pair[0] {
            Value::Str(s) => s.clone(),
            other => {
                return Err(VmError::type_error(format!(
                    "dict keys must be str, not '{}'",
                    other.type_name()
                )))
            }
        };
        map.insert(key, pair[1].clone());
    }
    interp
        .current_frame_mut()?
        .push(Value::Dict(Rc::new(RefCell::new(map))));
    Ok(ControlFlow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_compiler::bytecode::FunctionBuilder;

    #[test]
    fn test_build_list_preserves_order() {
        let mut builder = FunctionBuilder::new("lst");
        builder.emit_load_int(1);
        builder.emit_load_int(2);
        builder.emit_load_int(3);
        builder.emit_build_list(3);
        builder.emit_return();
        let result = Interpreter::new().run(builder.finish().unwrap()).unwrap();
        assert_eq!(result.repr(), "[1, 2, 3]");
    }

    #[test]
    fn test_build_map() {
        let mut builder = FunctionBuilder::new("map");
        builder.emit_load_str("b");
        builder.emit_load_int(2);
        builder.emit_load_str("a");
        builder.emit_load_int(1);
        builder.emit_build_map(2);
        builder.emit_return();
        let result = Interpreter::new().run(builder.finish().unwrap()).unwrap();
        assert_eq!(result.repr(), "{'a': 1, 'b': 2}");
    }

    #[test]
    fn test_build_map_rejects_non_str_key() {
        let mut builder = FunctionBuilder::new("map");
        builder.emit_load_int(1);
        builder.emit_load_int(2);
        builder.emit_build_map(1);
        builder.emit_return();
        let err = Interpreter::new().run(builder.finish().unwrap()).unwrap_err();
        assert_eq!(err.as_exception().unwrap().type_name(), "TypeError");
    }
}
