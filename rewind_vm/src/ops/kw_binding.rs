//! Argument binding.
//!
//! Maps a call's positional and keyword arguments onto a function's local
//! slots:
//! 1. Bind positional arguments to the leading parameters
//! 2. Bind keyword arguments to parameters by name
//! 3. Error on any parameter left unbound
//!
//! Parameters occupy the first `arg_count` entries of `varnames`; the
//! remaining locals start out unbound.

use crate::builtins::Args;
use crate::error::VmError;
use crate::value::{FunctionObject, Value};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Argument binding error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// Too many positional arguments provided.
    #[error("{func_name}() takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        func_name: Arc<str>,
        expected: u16,
        given: usize,
    },
    /// Parameter passed both positionally and by keyword.
    #[error("{func_name}() got multiple values for argument '{param_name}'")]
    DuplicateArgument {
        func_name: Arc<str>,
        param_name: Arc<str>,
    },
    /// Keyword with no matching parameter.
    #[error("{func_name}() got an unexpected keyword argument '{keyword}'")]
    UnexpectedKeyword {
        func_name: Arc<str>,
        keyword: Arc<str>,
    },
    /// Missing required positional argument.
    #[error("{func_name}() missing required positional argument: '{param_name}'")]
    MissingPositional {
        func_name: Arc<str>,
        param_name: Arc<str>,
    },
}

impl BindingError {
    /// Convert to a catchable `TypeError`.
    pub fn into_vm_error(self) -> VmError {
        VmError::type_error(self.to_string())
    }
}

// =============================================================================
// Binding
// =============================================================================

/// Bind `args` to the parameters of `func`.
///
/// Returns the initial local slots of the callee frame.
pub fn bind_arguments(func: &FunctionObject, args: Args) -> Result<Vec<Option<Value>>, BindingError> {
    let code = &func.code;
    let arg_count = code.arg_count as usize;
    let mut locals: Vec<Option<Value>> = vec![None; code.nlocals()];

    let given = args.positional.len();
    if given > arg_count {
        return Err(BindingError::TooManyPositional {
            func_name: code.name.clone(),
            expected: code.arg_count,
            given,
        });
    }
    for (slot, value) in locals.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }

    for (keyword, value) in args.keywords {
        let index = code.varnames[..arg_count]
            .iter()
            .position(|name| **name == *keyword)
            .ok_or_else(|| BindingError::UnexpectedKeyword {
                func_name: code.name.clone(),
                keyword: keyword.clone(),
            })?;
        if locals[index].is_some() {
            return Err(BindingError::DuplicateArgument {
                func_name: code.name.clone(),
                param_name: keyword,
            });
        }
        locals[index] = Some(value);
    }

    if let Some(missing) = locals[..arg_count].iter().position(Option::is_none) {
        return Err(BindingError::MissingPositional {
            func_name: code.name.clone(),
            param_name: code.varnames[missing].clone(),
        });
    }

    Ok(locals)
}
