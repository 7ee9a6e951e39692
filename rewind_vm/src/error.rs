//! VM and continuation errors.

use crate::continuation::CodeFingerprint;
use crate::value::{ExceptionValue, Value};
use rewind_compiler::bytecode::DecodeError;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// VM result type.
pub type VmResult<T> = Result<T, VmError>;

// =============================================================================
// Continuation Errors
// =============================================================================

/// Failures of the capture/restore subsystem.
///
/// All of these are fatal for the continuation being captured or resumed.
#[derive(Debug, Clone, Error)]
pub enum ContinuationError {
    /// The instruction at the frame's resume position is not a call the
    /// snapshot engine knows how to size.
    #[error("unsupported call site in {function} at offset {offset}: {opcode}")]
    UnsupportedCallSite {
        function: Arc<str>,
        offset: u32,
        opcode: &'static str,
        disassembly: String,
    },

    /// A record was applied to a frame running a different function body.
    #[error("code mismatch resuming {function}: expected {expected}, found {found}")]
    CodeMismatch {
        function: Arc<str>,
        expected: CodeFingerprint,
        found: CodeFingerprint,
    },

    /// A keyword call's name tuple disagrees with its argument count.
    #[error("keyword call in {function} passes {expected} arguments but names {found}")]
    ArgumentCountIntegrityViolation {
        function: Arc<str>,
        expected: usize,
        found: usize,
    },

    /// The frame holds fewer live slots than its locals, handlers, loops and
    /// in-flight call account for.
    #[error("live stack in {function} at offset {offset} holds {live} slots, call site needs {computed}")]
    StackUnderflow {
        function: Arc<str>,
        offset: u32,
        computed: usize,
        live: usize,
    },

    /// The decoder rejected the frame's code object.
    #[error("malformed bytecode in {function}: {source}")]
    MalformedBytecode {
        function: Arc<str>,
        #[source]
        source: DecodeError,
    },
}

// =============================================================================
// VM Errors
// =============================================================================

/// Errors surfaced by the interpreter.
///
/// Only [`VmError::Exception`] is visible to bytecode `try` handlers; every
/// other variant unwinds straight out of the evaluation loop.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("uncaught exception: {}", .0.repr())]
    Exception(Value),

    #[error(transparent)]
    Continuation(#[from] ContinuationError),

    #[error("maximum recursion depth exceeded (limit {limit})")]
    RecursionLimit { limit: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VmError {
    /// Build a catchable exception of the given type.
    pub fn raise(type_name: &str, message: impl Into<Arc<str>>) -> Self {
        VmError::Exception(Value::Exception(Rc::new(ExceptionValue::new(
            type_name, message,
        ))))
    }

    /// `TypeError` with a Python-style message.
    pub fn type_error(message: impl Into<Arc<str>>) -> Self {
        Self::raise("TypeError", message)
    }

    /// `NameError` for an unbound global.
    pub fn name_error(name: &str) -> Self {
        Self::raise("NameError", format!("name '{}' is not defined", name))
    }

    /// `AttributeError` for a missing attribute.
    pub fn attribute_error(value: &Value, name: &str) -> Self {
        Self::raise(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", value.type_name(), name),
        )
    }

    /// Internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        VmError::Internal(message.into())
    }

    /// The exception value, if this error is catchable.
    pub fn as_exception(&self) -> Option<&Value> {
        match self {
            VmError::Exception(value) => Some(value),
            _ => None,
        }
    }
}
