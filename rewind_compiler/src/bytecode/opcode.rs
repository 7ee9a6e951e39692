//! Opcode table for the stack-based instruction set.
//!
//! Instructions are variable width. The operand class is encoded in the
//! opcode number itself so the decoder never needs a side table:
//!
//! | Range      | Operand          | Width   |
//! |------------|------------------|---------|
//! | `0..64`    | none             | 1 byte  |
//! | `64..128`  | `u8`             | 2 bytes |
//! | `128..256` | `u16` (LE)       | 3 bytes |

use std::fmt;

// =============================================================================
// Operand Classes
// =============================================================================

/// Operand class of an opcode, derived from its numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand bytes.
    None,
    /// One operand byte.
    Byte,
    /// Two operand bytes, little-endian.
    Word,
}

impl OperandKind {
    /// Number of operand bytes following the opcode byte.
    #[inline]
    pub const fn operand_bytes(self) -> u32 {
        match self {
            OperandKind::None => 0,
            OperandKind::Byte => 1,
            OperandKind::Word => 2,
        }
    }
}

// =============================================================================
// Opcodes
// =============================================================================

/// Bytecode operations.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ------------------------------------------------------------------------
    // No operand
    // ------------------------------------------------------------------------
    /// Do nothing.
    Nop = 0,
    /// Discard TOS.
    PopTop = 1,
    /// Swap TOS and TOS1.
    RotTwo = 2,
    /// Duplicate TOS.
    DupTop = 3,
    /// TOS = not TOS.
    UnaryNot = 4,

    /// TOS = TOS1 + TOS.
    BinaryAdd = 10,
    /// TOS = TOS1 - TOS.
    BinarySubtract = 11,
    /// TOS = TOS1 * TOS.
    BinaryMultiply = 12,

    /// TOS = iter(TOS). Leaves the iterator on the stack for the loop body.
    GetIter = 20,
    /// Return TOS to the caller.
    ReturnValue = 21,
    /// Pop the innermost `SetupExcept` block.
    PopBlock = 22,
    /// Leave an exception handler, restoring the previous exception state.
    PopExcept = 23,
    /// Raise TOS.
    Raise = 24,

    // ------------------------------------------------------------------------
    // u8 operand
    // ------------------------------------------------------------------------
    /// Push local slot `arg`.
    LoadFast = 64,
    /// Pop TOS into local slot `arg`.
    StoreFast = 65,
    /// Clear local slot `arg`.
    DeleteFast = 66,
    /// Compare TOS1 and TOS with the [`CompareKind`] in `arg`.
    CompareOp = 67,
    /// Pop `arg` items into a tuple.
    BuildTuple = 68,
    /// Pop `arg` items into a list.
    BuildList = 69,
    /// Pop `arg` key/value pairs into a dict.
    BuildMap = 70,

    /// Stack: callee, `arg` positional arguments.
    CallFunction = 80,
    /// Stack: method, receiver (or empty), `arg` arguments.
    CallMethod = 81,
    /// Stack: callee, `arg` keyword argument values, tuple of `arg` names.
    CallFunctionKw = 82,
    /// Stack: callee, argument tuple, and a kwargs dict when `arg & 1`.
    CallFunctionEx = 83,

    // ------------------------------------------------------------------------
    // u16 operand
    // ------------------------------------------------------------------------
    /// Push constant `arg`.
    LoadConst = 128,
    /// Push global `names[arg]`.
    LoadGlobal = 129,
    /// Pop TOS into global `names[arg]`.
    StoreGlobal = 130,
    /// TOS = TOS.names[arg].
    LoadAttr = 131,
    /// TOS.names[arg] = TOS1.
    StoreAttr = 132,
    /// Replace TOS with (method, receiver) for a following `CallMethod`.
    LoadMethod = 133,

    /// Jump to absolute offset `arg`.
    JumpAbsolute = 140,
    /// Pop TOS; jump to `arg` if falsy.
    PopJumpIfFalse = 141,
    /// Pop TOS; jump to `arg` if truthy.
    PopJumpIfTrue = 142,
    /// Loop head: push next(TOS), or pop the iterator and jump to `arg`.
    ForIter = 143,
    /// Push a `SetupExcept` block whose handler starts at `arg`.
    SetupExcept = 144,
}

impl Opcode {
    /// Every opcode, in numeric order.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Nop,
        Opcode::PopTop,
        Opcode::RotTwo,
        Opcode::DupTop,
        Opcode::UnaryNot,
        Opcode::BinaryAdd,
        Opcode::BinarySubtract,
        Opcode::BinaryMultiply,
        Opcode::GetIter,
        Opcode::ReturnValue,
        Opcode::PopBlock,
        Opcode::PopExcept,
        Opcode::Raise,
        Opcode::LoadFast,
        Opcode::StoreFast,
        Opcode::DeleteFast,
        Opcode::CompareOp,
        Opcode::BuildTuple,
        Opcode::BuildList,
        Opcode::BuildMap,
        Opcode::CallFunction,
        Opcode::CallMethod,
        Opcode::CallFunctionKw,
        Opcode::CallFunctionEx,
        Opcode::LoadConst,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::LoadAttr,
        Opcode::StoreAttr,
        Opcode::LoadMethod,
        Opcode::JumpAbsolute,
        Opcode::PopJumpIfFalse,
        Opcode::PopJumpIfTrue,
        Opcode::ForIter,
        Opcode::SetupExcept,
    ];

    /// Convert a raw byte to an opcode.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    /// Operand class of this opcode.
    #[inline]
    pub const fn operand_kind(self) -> OperandKind {
        match self as u8 {
            0..=63 => OperandKind::None,
            64..=127 => OperandKind::Byte,
            _ => OperandKind::Word,
        }
    }

    /// Encoded width in bytes (opcode byte plus operand bytes).
    #[inline]
    pub const fn width(self) -> u32 {
        1 + self.operand_kind().operand_bytes()
    }

    /// Whether the operand is an absolute jump target.
    #[inline]
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpAbsolute
                | Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
                | Opcode::ForIter
                | Opcode::SetupExcept
        )
    }

    /// Whether this opcode invokes a callable.
    #[inline]
    pub const fn is_call(self) -> bool {
        matches!(
            self,
            Opcode::CallFunction
                | Opcode::CallMethod
                | Opcode::CallFunctionKw
                | Opcode::CallFunctionEx
        )
    }

    /// Whether this opcode is the head of a for-style loop.
    ///
    /// The iterator it consumes stays on the operand stack for the whole loop.
    #[inline]
    pub const fn is_loop_head(self) -> bool {
        matches!(self, Opcode::ForIter)
    }

    /// Mnemonic used by the disassembler.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PopTop => "POP_TOP",
            Opcode::RotTwo => "ROT_TWO",
            Opcode::DupTop => "DUP_TOP",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinarySubtract => "BINARY_SUBTRACT",
            Opcode::BinaryMultiply => "BINARY_MULTIPLY",
            Opcode::GetIter => "GET_ITER",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::PopBlock => "POP_BLOCK",
            Opcode::PopExcept => "POP_EXCEPT",
            Opcode::Raise => "RAISE",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::DeleteFast => "DELETE_FAST",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::BuildList => "BUILD_LIST",
            Opcode::BuildMap => "BUILD_MAP",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::CallMethod => "CALL_METHOD",
            Opcode::CallFunctionKw => "CALL_FUNCTION_KW",
            Opcode::CallFunctionEx => "CALL_FUNCTION_EX",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::LoadAttr => "LOAD_ATTR",
            Opcode::StoreAttr => "STORE_ATTR",
            Opcode::LoadMethod => "LOAD_METHOD",
            Opcode::JumpAbsolute => "JUMP_ABSOLUTE",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::ForIter => "FOR_ITER",
            Opcode::SetupExcept => "SETUP_EXCEPT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Comparison Operand
// =============================================================================

/// Operand of [`Opcode::CompareOp`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

impl CompareKind {
    /// Decode a `CompareOp` operand.
    pub fn from_u8(byte: u8) -> Option<CompareKind> {
        Some(match byte {
            0 => CompareKind::Lt,
            1 => CompareKind::Le,
            2 => CompareKind::Eq,
            3 => CompareKind::Ne,
            4 => CompareKind::Gt,
            5 => CompareKind::Ge,
            _ => return None,
        })
    }

    /// Source-level operator symbol.
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareKind::Lt => "<",
            CompareKind::Le => "<=",
            CompareKind::Eq => "==",
            CompareKind::Ne => "!=",
            CompareKind::Gt => ">",
            CompareKind::Ge => ">=",
        }
    }
}
