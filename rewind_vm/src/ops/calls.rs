//! Call opcode handlers.
//!
//! The callee and its arguments stay on the caller's operand stack for the
//! whole call and are popped only once it returns:
//!
//! ```text
//! CallFunction(n)     [ ... | callee | arg 1 .. arg n ]
//! CallMethod(n)       [ ... | method | receiver or <empty> | arg 1 .. arg n ]
//! CallFunctionKw(n)   [ ... | callee | value 1 .. value n | names ]
//! CallFunctionEx(f)   [ ... | callee | args | kwargs if f & 1 ]
//! ```
//!
//! A frame suspended inside a call therefore still holds everything the call
//! consumes, and re-dispatching the call instruction after a restore repeats
//! it with the same arguments.

use crate::builtins::Args;
use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_compiler::bytecode::Instruction;
use std::sync::Arc;

/// Clone the top `count` slots, bottom first.
fn top_slots(interp: &Interpreter, count: usize) -> VmResult<Vec<Option<Value>>> {
    Ok(interp.current_frame()?.top_slots(count)?.to_vec())
}

fn required(slot: Option<Value>) -> VmResult<Value> {
    slot.ok_or_else(|| VmError::internal("empty stack slot passed as call argument"))
}

/// Run the call, then replace its `slots` stack entries with the result.
fn finish_call(
    interp: &mut Interpreter,
    callee: &Value,
    args: Args,
    slots: usize,
) -> VmResult<ControlFlow> {
    let result = interp.call_value(callee, args)?;
    let frame = interp.current_frame_mut()?;
    frame.pop_n(slots)?;
    frame.push(result);
    Ok(ControlFlow::Continue)
}

// =============================================================================
// Positional Calls
// =============================================================================

/// CallFunction: TOS = callee(arg 1 .. arg n)
#[inline(always)]
pub fn call_function(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let argc = inst.arg as usize;
    let mut slots = top_slots(interp, argc + 1)?.into_iter();
    let callee = required(slots.next().flatten())?;
    let positional = slots.map(required).collect::<VmResult<Vec<_>>>()?;
    finish_call(interp, &callee, Args::positional(positional), argc + 1)
}

/// CallMethod: TOS = method(receiver?, arg 1 .. arg n)
#[inline(always)]
pub fn call_method(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let argc = inst.arg as usize;
    let mut slots = top_slots(interp, argc + 2)?.into_iter();
    let method = required(slots.next().flatten())?;
    let receiver = slots.next().flatten();

    let mut positional = Vec::with_capacity(argc + 1);
    positional.extend(receiver);
    for slot in slots {
        positional.push(required(slot)?);
    }
    finish_call(interp, &method, Args::positional(positional), argc + 2)
}

// =============================================================================
// Keyword Calls
// =============================================================================

/// Extract the names of a keyword-call name tuple.
pub(crate) fn keyword_names(value: &Value) -> Option<Vec<Arc<str>>> {
    match value {
        Value::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// CallFunctionKw: TOS = callee(name 1=value 1 .. name n=value n)
#[inline(always)]
pub fn call_function_kw(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let argc = inst.arg as usize;
    let slots = top_slots(interp, argc + 2)?;
    let names = slots
        .last()
        .and_then(Option::as_ref)
        .and_then(keyword_names)
        .filter(|names| names.len() == argc)
        .ok_or_else(|| {
            VmError::internal(format!(
                "CallFunctionKw({}) without a matching name tuple",
                argc
            ))
        })?;

    let mut slots = slots.into_iter();
    let callee = required(slots.next().flatten())?;
    let mut keywords = Vec::with_capacity(argc);
    for (name, slot) in names.into_iter().zip(slots.take(argc)) {
        keywords.push((name, required(slot)?));
    }
    finish_call(interp, &callee, Args::new(Vec::new(), keywords), argc + 2)
}

/// CallFunctionEx: TOS = callee(*args, **kwargs)
#[inline(always)]
pub fn call_function_ex(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let has_kwargs = inst.arg & 1 != 0;
    let count = 2 + has_kwargs as usize;
    let mut slots = top_slots(interp, count)?.into_iter();
    let callee = required(slots.next().flatten())?;
    let args = required(slots.next().flatten())?;

    let positional = match &args {
        Value::Tuple(items) => items.to_vec(),
        Value::List(items) => items.borrow().clone(),
        other => {
            return Err(VmError::type_error(format!(
                "argument after * must be an iterable, not {}",
                other.type_name()
            )))
        }
    };

    let mut keywords = Vec::new();
    if has_kwargs {
        match required(slots.next().flatten())? {
            Value::Dict(map) => {
                let map = map.borrow();
                let mut names: Vec<&Arc<str>> = map.keys().collect();
                names.sort();
                keywords.extend(names.into_iter().map(|k| (k.clone(), map[k].clone())));
            }
            other => {
                return Err(VmError::type_error(format!(
                    "argument after ** must be a mapping, not {}",
                    other.type_name()
                )))
            }
        }
    }

    finish_call(interp, &callee, Args::new(positional, keywords), count)
}
