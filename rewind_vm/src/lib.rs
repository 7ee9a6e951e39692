//! Stack-based virtual machine with first-class continuations.
//!
//! `capture()` snapshots every live bytecode frame into a [`Continuation`];
//! `resume(k)` rebuilds that call chain and runs it to completion. Frames are
//! rebuilt through the frame-entry [`hooks`] chain, so the interpreter
//! itself has no special resume path.
//!
//! # Example
//!
//! ```
//! use rewind_vm::{Interpreter, Value};
//! use rewind_compiler::FunctionBuilder;
//!
//! // k = capture(); return len(k)
//! let mut builder = FunctionBuilder::new("main");
//! let k = builder.define_local("k");
//! builder.emit_load_global("capture");
//! builder.emit_call_function(0);
//! builder.emit_store_fast(k);
//! builder.emit_load_global("len");
//! builder.emit_load_fast(k);
//! builder.emit_call_function(1);
//! builder.emit_return();
//!
//! let mut interp = Interpreter::new();
//! let depth = interp.run(builder.finish().unwrap()).unwrap();
//! assert_eq!(depth, Value::Int(1));
//! ```

pub mod builtins;
pub mod config;
pub mod continuation;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod interpreter;
pub mod ops;
pub mod value;

pub use builtins::Args;
pub use config::VmConfig;
pub use continuation::{CodeFingerprint, Continuation, FrameRecord};
pub use error::{ContinuationError, VmError, VmResult};
pub use frame::{Block, BlockKind, Frame};
pub use hooks::{FnHook, FrameHook, HookAction, HookChain, HookId, HookPosition};
pub use interpreter::Interpreter;
pub use value::Value;
