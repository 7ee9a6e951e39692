//! Decoded instruction view and the byte-stream decoder.
//!
//! The VM executes raw bytes; analysis passes work on the decoded form
//! produced by [`decode`], where every instruction carries its own byte
//! offset and, for branches, a resolved absolute target.

use super::opcode::{OperandKind, Opcode};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Failure to decode a bytecode stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte at `offset` is not an opcode.
    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    UnknownOpcode { offset: u32, byte: u8 },

    /// The stream ends inside the operand of `opcode`.
    #[error("truncated {opcode} operand at offset {offset}")]
    Truncated { offset: u32, opcode: Opcode },

    /// `offset` is past the end of the stream.
    #[error("offset {offset} is outside the bytecode (length {len})")]
    OutOfBounds { offset: u32, len: usize },
}

// =============================================================================
// Instruction
// =============================================================================

/// A single decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode byte.
    pub offset: u32,
    /// The operation.
    pub opcode: Opcode,
    /// Operand (zero when the opcode takes none).
    pub arg: u16,
}

impl Instruction {
    /// Encoded width in bytes.
    #[inline]
    pub fn width(&self) -> u32 {
        self.opcode.width()
    }

    /// Offset of the instruction that follows in the stream.
    #[inline]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.width()
    }

    /// Absolute branch target, for jump instructions.
    #[inline]
    pub fn jump_target(&self) -> Option<u32> {
        self.opcode.is_jump().then_some(self.arg as u32)
    }

    /// Whether this is a branch to an offset at or before itself.
    #[inline]
    pub fn is_backward_jump(&self) -> bool {
        self.jump_target().is_some_and(|target| target <= self.offset)
    }

    /// Encode into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode(self.opcode, self.arg, out);
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode.operand_kind() {
            OperandKind::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{:<18} {}", self.opcode.name(), self.arg),
        }
    }
}

// =============================================================================
// Encoding / Decoding
// =============================================================================

/// Append the encoding of `opcode` with `arg` to `out`.
///
/// Operands wider than the opcode's class are truncated; the builder
/// validates ranges before calling this.
pub fn encode(opcode: Opcode, arg: u16, out: &mut Vec<u8>) {
    out.push(opcode as u8);
    match opcode.operand_kind() {
        OperandKind::None => {}
        OperandKind::Byte => out.push(arg as u8),
        OperandKind::Word => out.extend_from_slice(&arg.to_le_bytes()),
    }
}

/// Decode the instruction starting at `offset`.
pub fn decode_at(bytes: &[u8], offset: u32) -> Result<Instruction, DecodeError> {
    let start = offset as usize;
    let byte = *bytes.get(start).ok_or(DecodeError::OutOfBounds {
        offset,
        len: bytes.len(),
    })?;
    let opcode = Opcode::from_u8(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })?;

    let arg = match opcode.operand_kind() {
        OperandKind::None => 0,
        OperandKind::Byte => *bytes
            .get(start + 1)
            .ok_or(DecodeError::Truncated { offset, opcode })? as u16,
        OperandKind::Word => {
            let lo = *bytes
                .get(start + 1)
                .ok_or(DecodeError::Truncated { offset, opcode })?;
            let hi = *bytes
                .get(start + 2)
                .ok_or(DecodeError::Truncated { offset, opcode })?;
            u16::from_le_bytes([lo, hi])
        }
    };

    Ok(Instruction {
        offset,
        opcode,
        arg,
    })
}

/// Decode a whole bytecode stream into instructions, in offset order.
pub fn decode(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::with_capacity(bytes.len() / 2);
    let mut offset = 0u32;
    while (offset as usize) < bytes.len() {
        let inst = decode_at(bytes, offset)?;
        offset = inst.next_offset();
        instructions.push(inst);
    }
    Ok(instructions)
}

/// Find the decoded instruction that starts exactly at `offset`.
///
/// `instructions` must be in offset order, as produced by [`decode`].
pub fn instruction_at(instructions: &[Instruction], offset: u32) -> Option<&Instruction> {
    instructions
        .binary_search_by_key(&offset, |inst| inst.offset)
        .ok()
        .map(|idx| &instructions[idx])
}
