//! Stack-based bytecode system.
//!
//! This module provides the bytecode representation for the Rewind VM.
//! Key components:
//!
//! - [`Opcode`] - Enumeration of all bytecode operations and their widths
//! - [`Instruction`] - Decoded view of one variable-width instruction
//! - [`CodeObject`] - Compiled function representation
//! - [`FunctionBuilder`] - High-level API for bytecode construction

mod builder;
mod code_object;
mod instruction;
mod opcode;

pub use builder::{BuildError, FunctionBuilder, Label};
pub use code_object::{disassemble, CodeObject, Constant, LineTableEntry};
pub use instruction::{decode, decode_at, encode, instruction_at, DecodeError, Instruction};
pub use opcode::{CompareKind, OperandKind, Opcode};
