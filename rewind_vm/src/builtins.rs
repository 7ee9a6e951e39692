//! Builtin functions.
//!
//! Builtins are plain `fn` pointers taking the interpreter and the call's
//! [`Args`]. Calling one pushes no bytecode frame, so `capture` sees its
//! caller as the innermost frame.

use crate::error::{VmError, VmResult};
use crate::interpreter::Interpreter;
use crate::ops::control::make_iter;
use crate::value::{BuiltinFn, BuiltinFunction, ExceptionValue, Instance, SeqIterator, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Arguments
// =============================================================================

/// Arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(Arc<str>, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Vec<(Arc<str>, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Positional arguments only.
    pub fn positional(positional: Vec<Value>) -> Self {
        Self::new(positional, Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject keyword arguments for a builtin that takes none.
    pub fn expect_no_keywords(&self, func: &str) -> VmResult<()> {
        match self.keywords.first() {
            Some((name, _)) => Err(VmError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            ))),
            None => Ok(()),
        }
    }

    /// Positional arguments, checked against an inclusive count range.
    pub fn expect_positional(&self, func: &str, min: usize, max: usize) -> VmResult<&[Value]> {
        self.expect_no_keywords(func)?;
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("{} argument{}", min, if min == 1 { "" } else { "s" })
            } else {
                format!("{} to {} arguments", min, max)
            };
            return Err(VmError::type_error(format!(
                "{}() takes {} ({} given)",
                func, expected, given
            )));
        }
        Ok(&self.positional)
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Register every builtin as a global.
pub fn install(interp: &mut Interpreter) {
    interp.define_builtin("capture", builtin_capture);
    interp.define_builtin("resume", builtin_resume);
    interp.define_builtin("len", builtin_len);
    interp.define_builtin("print", builtin_print);
    interp.define_builtin("range", builtin_range);
    interp.define_builtin("iter", builtin_iter);
    interp.define_builtin("Exception", builtin_exception);
    interp.define_builtin("object", builtin_object);
}

/// Builtin method of `list` named `name`.
pub(crate) fn list_method(name: &str) -> Option<Rc<BuiltinFunction>> {
    let (name, func): (&'static str, BuiltinFn) = match name {
        "append" => ("append", list_append),
        "pop" => ("pop", list_pop),
        _ => return None,
    };
    Some(Rc::new(BuiltinFunction { name, func }))
}

// =============================================================================
// Continuations
// =============================================================================

/// capture(): snapshot the calling frame chain.
fn builtin_capture(interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    args.expect_positional("capture", 0, 0)?;
    let continuation = interp.capture()?;
    Ok(Value::Continuation(Rc::new(continuation)))
}

/// resume(k): rebuild and run a captured frame chain.
fn builtin_resume(interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("resume", 1, 1)?;
    match &args[0] {
        Value::Continuation(k) => {
            let k = k.clone();
            interp.resume(&k)
        }
        other => Err(VmError::type_error(format!(
            "resume() argument must be a continuation, not '{}'",
            other.type_name()
        ))),
    }
}

// =============================================================================
// Core
// =============================================================================

fn builtin_len(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("len", 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Tuple(items) => items.len(),
        Value::List(items) => items.borrow().len(),
        Value::Dict(map) => map.borrow().len(),
        Value::Continuation(k) => k.len(),
        other => {
            return Err(VmError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_print(interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    args.expect_no_keywords("print")?;
    let line = args
        .positional
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    info!(target: "rewind_vm::print", "{}", line);
    interp.write_line(line);
    Ok(Value::None)
}

fn int_arg(value: &Value, what: &str) -> VmResult<i64> {
    value
        .as_int()
        .ok_or_else(|| VmError::type_error(format!("range() integer {} argument expected", what)))
}

fn builtin_range(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("range", 1, 3)?;
    let (start, stop, step) = match args {
        [stop] => (0, int_arg(stop, "end")?, 1),
        [start, stop] => (int_arg(start, "start")?, int_arg(stop, "end")?, 1),
        [start, stop, step] => {
            let step = int_arg(step, "step")?;
            if step == 0 {
                return Err(VmError::raise("ValueError", "range() arg 3 must not be zero"));
            }
            (int_arg(start, "start")?, int_arg(stop, "end")?, step)
        }
        _ => return Err(VmError::internal("range() argument count")),
    };
    Ok(Value::Iterator(Rc::new(RefCell::new(SeqIterator::range(
        start, stop, step,
    )))))
}

fn builtin_iter(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("iter", 1, 1)?;
    make_iter(&args[0])
}

/// Exception(message=""): build an exception instance.
fn builtin_exception(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("Exception", 0, 1)?;
    let message = args.first().map(ToString::to_string).unwrap_or_default();
    Ok(Value::Exception(Rc::new(ExceptionValue::new(
        "Exception",
        message,
    ))))
}

/// object(class=None): build an attribute bag, optionally inheriting from
/// `class`.
fn builtin_object(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("object", 0, 1)?;
    let class = match args.first() {
        None | Some(Value::None) => None,
        Some(Value::Object(class)) => Some(class.clone()),
        Some(other) => {
            return Err(VmError::type_error(format!(
                "object() class must be an object, not '{}'",
                other.type_name()
            )))
        }
    };
    Ok(Value::Object(Rc::new(Instance::new(class))))
}

// =============================================================================
// List Methods
// =============================================================================

fn receiver_list<'a>(args: &'a [Value], method: &str) -> VmResult<&'a Rc<RefCell<Vec<Value>>>> {
    match args.first() {
        Some(Value::List(items)) => Ok(items),
        other => Err(VmError::type_error(format!(
            "descriptor '{}' requires a 'list' object but received '{}'",
            method,
            other.map_or("nothing", Value::type_name)
        ))),
    }
}

fn list_append(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("append", 2, 2)?;
    receiver_list(args, "append")?
        .borrow_mut()
        .push(args[1].clone());
    Ok(Value::None)
}

fn list_pop(_interp: &mut Interpreter, args: Args) -> VmResult<Value> {
    let args = args.expect_positional("pop", 1, 1)?;
    receiver_list(args, "pop")?
        .borrow_mut()
        .pop()
        .ok_or_else(|| VmError::raise("IndexError", "pop from empty list"))
}
