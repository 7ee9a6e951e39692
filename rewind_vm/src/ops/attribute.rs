//! Attribute opcode handlers.
//!
//! `LoadMethod` pushes two slots so that `CallMethod` can tell a bound call
//! from a plain one:
//!
//! ```text
//! found on the class:   [ ... | method | receiver ]
//! anything else:        [ ... | callable | <empty> ]
//! ```

use crate::builtins;
use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::ops::load_store::name_at;
use crate::value::{AttrLookup, Value};
use rewind_compiler::bytecode::Instruction;

/// Resolve `value.name` without binding.
fn get_attr(value: &Value, name: &str) -> VmResult<Value> {
    match value {
        Value::Object(obj) => match obj.lookup(name) {
            Some(AttrLookup::Own(v)) | Some(AttrLookup::Class(v)) => Ok(v),
            None => Err(VmError::attribute_error(value, name)),
        },
        Value::Exception(exc) if name == "args" => {
            Ok(Value::tuple(vec![Value::Str(exc.message.clone())]))
        }
        _ => Err(VmError::attribute_error(value, name)),
    }
}

/// LoadAttr: TOS = TOS.names[arg]
#[inline(always)]
pub fn load_attr(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let name = name_at(interp, inst)?;
    let frame = interp.current_frame_mut()?;
    let owner = frame.pop()?;
    let value = get_attr(&owner, &name)?;
    frame.push(value);
    Ok(ControlFlow::Continue)
}

/// StoreAttr: TOS.names[arg] = TOS1
#[inline(always)]
pub fn store_attr(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let name = name_at(interp, inst)?;
    let frame = interp.current_frame_mut()?;
    let owner = frame.pop()?;
    let value = frame.pop()?;
    match owner {
        Value::Object(obj) => {
            obj.set_attr(name, value);
            Ok(ControlFlow::Continue)
        }
        other => Err(VmError::attribute_error(&other, &name)),
    }
}

/// LoadMethod: replace TOS with (callable, receiver-or-empty)
#[inline(always)]
pub fn load_method(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let name = name_at(interp, inst)?;
    let frame = interp.current_frame_mut()?;
    let owner = frame.pop()?;

    match &owner {
        Value::Object(obj) => match obj.lookup(&name) {
            Some(AttrLookup::Own(value)) => {
                frame.push(value);
                frame.push_empty();
            }
            Some(AttrLookup::Class(value)) => match value {
                Value::Function(_) | Value::Builtin(_) => {
                    frame.push(value);
                    frame.push(owner.clone());
                }
                other => {
                    frame.push(other);
                    frame.push_empty();
                }
            },
            None => return Err(VmError::attribute_error(&owner, &name)),
        },
        Value::List(_) => match builtins::list_method(&name) {
            Some(method) => {
                frame.push(Value::Builtin(method));
                frame.push(owner.clone());
            }
            None => return Err(VmError::attribute_error(&owner, &name)),
        },
        _ => {
            let value = get_attr(&owner, &name)?;
            frame.push(value);
            frame.push_empty();
        }
    }
    Ok(ControlFlow::Continue)
}
