//! Load and store opcode handlers.
//!
//! Handles constants, locals, globals and plain stack shuffles.

use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::{FunctionObject, Value};
use rewind_compiler::bytecode::{Constant, Instruction};
use std::rc::Rc;

// =============================================================================
// Stack
// =============================================================================

/// Nop: do nothing
#[inline(always)]
pub fn nop(_interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    Ok(ControlFlow::Continue)
}

/// PopTop: discard TOS (which may be an empty slot)
#[inline(always)]
pub fn pop_top(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    interp.current_frame_mut()?.pop_slot()?;
    Ok(ControlFlow::Continue)
}

/// DupTop: push TOS again
#[inline(always)]
pub fn dup_top(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let value = frame.peek(0)?.clone();
    frame.push(value);
    Ok(ControlFlow::Continue)
}

/// RotTwo: swap TOS and TOS1
#[inline(always)]
pub fn rot_two(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    frame.top_slots(2)?;
    let len = frame.slots.len();
    frame.slots.swap(len - 1, len - 2);
    Ok(ControlFlow::Continue)
}

// =============================================================================
// Constants
// =============================================================================

/// Materialize a constant pool entry.
///
/// Code constants become fresh function objects.
pub fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Names(names) => {
            Value::Tuple(names.iter().map(|n| Value::Str(n.clone())).collect())
        }
        Constant::Code(code) => Value::Function(Rc::new(FunctionObject::new(code.clone()))),
    }
}

/// LoadConst: push constants[arg]
#[inline(always)]
pub fn load_const(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let value = frame
        .code
        .constants
        .get(inst.arg as usize)
        .map(constant_value)
        .ok_or_else(|| VmError::internal(format!("constant {} out of range", inst.arg)))?;
    frame.push(value);
    Ok(ControlFlow::Continue)
}

// =============================================================================
// Locals
// =============================================================================

fn unbound_local(interp: &Interpreter, slot: usize) -> VmError {
    let name = interp
        .current_frame()
        .ok()
        .and_then(|frame| frame.code.varnames.get(slot).cloned())
        .unwrap_or_else(|| "?".into());
    VmError::raise(
        "UnboundLocalError",
        format!("local variable '{}' referenced before assignment", name),
    )
}

/// LoadFast: push local[arg]
#[inline(always)]
pub fn load_fast(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let slot = inst.arg as usize;
    let frame = interp.current_frame_mut()?;
    match frame.local(slot).cloned() {
        Some(value) => {
            frame.push(value);
            Ok(ControlFlow::Continue)
        }
        None => Err(unbound_local(interp, slot)),
    }
}

/// StoreFast: local[arg] = pop()
#[inline(always)]
pub fn store_fast(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let value = frame.pop()?;
    frame.set_local(inst.arg as usize, Some(value))?;
    Ok(ControlFlow::Continue)
}

/// DeleteFast: unbind local[arg]
#[inline(always)]
pub fn delete_fast(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let slot = inst.arg as usize;
    let frame = interp.current_frame_mut()?;
    if frame.local(slot).is_none() {
        return Err(unbound_local(interp, slot));
    }
    frame.set_local(slot, None)?;
    Ok(ControlFlow::Continue)
}

// =============================================================================
// Globals
// =============================================================================

/// LoadGlobal: push globals[names[arg]]
#[inline(always)]
pub fn load_global(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let name = name_at(interp, inst)?;
    let value = interp
        .globals
        .get(&name)
        .cloned()
        .ok_or_else(|| VmError::name_error(&name))?;
    interp.current_frame_mut()?.push(value);
    Ok(ControlFlow::Continue)
}

/// StoreGlobal: globals[names[arg]] = pop()
#[inline(always)]
pub fn store_global(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let name = name_at(interp, inst)?;
    let value = interp.current_frame_mut()?.pop()?;
    interp.globals.insert(name, value);
    Ok(ControlFlow::Continue)
}

/// Resolve `names[arg]` in the current frame's code.
pub(crate) fn name_at(interp: &Interpreter, inst: Instruction) -> VmResult<std::sync::Arc<str>> {
    interp
        .current_frame()?
        .code
        .names
        .get(inst.arg as usize)
        .cloned()
        .ok_or_else(|| VmError::internal(format!("name {} out of range", inst.arg)))
}
