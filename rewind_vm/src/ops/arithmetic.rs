//! Arithmetic and comparison opcode handlers.
//!
//! Integers are `i64`; overflow raises `OverflowError` instead of promoting
//! to a big integer. `bool` participates as an `int`.

use crate::dispatch::ControlFlow;
use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_compiler::bytecode::{CompareKind, Instruction};
use std::cmp::Ordering;

/// Pop TOS1 and TOS, push `op(TOS1, TOS)`.
#[inline(always)]
fn binary(
    interp: &mut Interpreter,
    op: fn(&Value, &Value) -> VmResult<Value>,
) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    let result = op(&lhs, &rhs)?;
    frame.push(result);
    Ok(ControlFlow::Continue)
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> VmError {
    VmError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn overflow() -> VmError {
    VmError::raise("OverflowError", "integer overflow")
}

// =============================================================================
// Binary Operations
// =============================================================================

pub fn add(lhs: &Value, rhs: &Value) -> VmResult<Value> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b).into())),
        (Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        _ => match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(unsupported("+", lhs, rhs)),
        },
    }
}

pub fn subtract(lhs: &Value, rhs: &Value) -> VmResult<Value> {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(a), Some(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        _ => Err(unsupported("-", lhs, rhs)),
    }
}

pub fn multiply(lhs: &Value, rhs: &Value) -> VmResult<Value> {
    match (lhs, rhs) {
        (Value::Str(s), n) | (n, Value::Str(s)) if n.as_int().is_some() => {
            let count = n.as_int().unwrap_or(0).max(0) as usize;
            Ok(Value::Str(s.repeat(count).into()))
        }
        _ => match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(unsupported("*", lhs, rhs)),
        },
    }
}

/// BinaryAdd: TOS = TOS1 + TOS
#[inline(always)]
pub fn binary_add(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    binary(interp, add)
}

/// BinarySubtract: TOS = TOS1 - TOS
#[inline(always)]
pub fn binary_subtract(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    binary(interp, subtract)
}

/// BinaryMultiply: TOS = TOS1 * TOS
#[inline(always)]
pub fn binary_multiply(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    binary(interp, multiply)
}

/// UnaryNot: TOS = not TOS
#[inline(always)]
pub fn unary_not(interp: &mut Interpreter, _inst: Instruction) -> VmResult<ControlFlow> {
    let frame = interp.current_frame_mut()?;
    let value = frame.pop()?;
    frame.push(Value::Bool(!value.is_truthy()));
    Ok(ControlFlow::Continue)
}

// =============================================================================
// Comparison
// =============================================================================

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => Some(lhs.as_int()?.cmp(&rhs.as_int()?)),
    }
}

pub fn compare(kind: CompareKind, lhs: &Value, rhs: &Value) -> VmResult<bool> {
    match kind {
        CompareKind::Eq => return Ok(lhs == rhs),
        CompareKind::Ne => return Ok(lhs != rhs),
        _ => {}
    }
    let ord = ordering(lhs, rhs).ok_or_else(|| {
        VmError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            kind.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))
    })?;
    Ok(match kind {
        CompareKind::Lt => ord == Ordering::Less,
        CompareKind::Le => ord != Ordering::Greater,
        CompareKind::Gt => ord == Ordering::Greater,
        CompareKind::Ge => ord != Ordering::Less,
        CompareKind::Eq | CompareKind::Ne => unreachable!(),
    })
}

/// CompareOp: TOS = TOS1 <arg> TOS
#[inline(always)]
pub fn compare_op(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    let kind = CompareKind::from_u8(inst.arg as u8)
        .ok_or_else(|| VmError::internal(format!("bad comparison operand {}", inst.arg)))?;
    let frame = interp.current_frame_mut()?;
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    let result = compare(kind, &lhs, &rhs)?;
    frame.push(Value::Bool(result));
    Ok(ControlFlow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        assert_eq!(add(&Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(add(&Value::Bool(true), &Value::Int(1)).unwrap(), Value::Int(2));
        assert_eq!(
            add(&Value::str("ab"), &Value::str("cd")).unwrap(),
            Value::str("abcd")
        );
        assert_eq!(
            add(&Value::list(vec![Value::Int(1)]), &Value::list(vec![Value::Int(2)])).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_add_type_error() {
        let err = add(&Value::Int(1), &Value::str("x")).unwrap_err();
        let exc = err.as_exception().unwrap();
        assert_eq!(exc.type_name(), "TypeError");
        assert_eq!(
            exc.to_string(),
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_overflow() {
        let err = multiply(&Value::Int(i64::MAX), &Value::Int(2)).unwrap_err();
        assert_eq!(err.as_exception().unwrap().type_name(), "OverflowError");
    }

    #[test]
    fn test_string_repeat() {
        assert_eq!(
            multiply(&Value::str("ab"), &Value::Int(3)).unwrap(),
            Value::str("ababab")
        );
        assert_eq!(
            multiply(&Value::Int(2), &Value::str("x")).unwrap(),
            Value::str("xx")
        );
    }

    #[test]
    fn test_compare() {
        assert!(compare(CompareKind::Lt, &Value::Int(1), &Value::Int(2)).unwrap());
        assert!(compare(CompareKind::Ge, &Value::str("b"), &Value::str("a")).unwrap());
        assert!(compare(CompareKind::Eq, &Value::None, &Value::None).unwrap());
        assert!(compare(CompareKind::Ne, &Value::Int(1), &Value::str("1")).unwrap());
        assert!(compare(CompareKind::Lt, &Value::Int(1), &Value::None).is_err());
    }
}
