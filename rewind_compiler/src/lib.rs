//! Bytecode layer of the Rewind VM.
//!
//! Rewind executes a CPython-style stack bytecode: every function body is a
//! flat byte stream of variable-width instructions plus constant, name and
//! local pools. This crate owns the format, the decoder used by both the
//! interpreter and the continuation analyzer, and the assembler used to
//! produce code objects.

pub mod bytecode;

pub use bytecode::{CodeObject, FunctionBuilder, Opcode};
