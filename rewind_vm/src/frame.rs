//! Call frame with a unified slot array.
//!
//! A frame's `slots` hold the function's local variables followed by its
//! operand stack:
//!
//! ```text
//! slots: [ local 0 | local 1 | ... | local n-1 | stack 0 | stack 1 | ... ]
//!                                              ^ nlocals           ^ stack_top
//! ```
//!
//! Each slot is an `Option<Value>`; `None` marks an unbound local or an
//! empty stack slot (as pushed by `LoadMethod` when there is no receiver).
//! Keeping locals and stack in one array lets a continuation snapshot a
//! frame as a flat prefix of `slots`.

use crate::error::{VmError, VmResult};
use crate::value::{FunctionObject, Value};
use rewind_compiler::bytecode::{decode_at, CodeObject, Instruction};
use smallvec::SmallVec;
use std::rc::Rc;
use std::sync::Arc;

// =============================================================================
// Blocks
// =============================================================================

/// Kind of an entry on a frame's block stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Active `try` body. Holds no stack slots.
    SetupExcept,
    /// Active `except` handler. Keeps the previous exception triplet live
    /// in three slots starting at `level`.
    ExceptHandler,
}

/// An exception block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Stack top (absolute slot index) when the block was entered.
    pub level: u32,
    /// Handler offset for `SetupExcept`; unused for handlers.
    pub handler: u32,
}

impl Block {
    #[inline]
    pub fn setup_except(level: u32, handler: u32) -> Self {
        Self {
            kind: BlockKind::SetupExcept,
            level,
            handler,
        }
    }

    #[inline]
    pub fn except_handler(level: u32) -> Self {
        Self {
            kind: BlockKind::ExceptHandler,
            level,
            handler: 0,
        }
    }
}

/// Number of live slots an active handler keeps for the previous exception.
pub const EXC_TRIPLET_SLOTS: usize = 3;

// =============================================================================
// Frame
// =============================================================================

/// A call frame representing one bytecode function invocation.
#[derive(Debug)]
pub struct Frame {
    /// Function being executed.
    pub function: Rc<FunctionObject>,

    /// Code object being executed.
    pub code: Arc<CodeObject>,

    /// Byte offset of the next instruction to execute.
    pub ip: u32,

    /// Byte offset of the instruction currently executing.
    pub lasti: u32,

    /// Locals followed by the operand stack.
    pub slots: Vec<Option<Value>>,

    /// Active exception blocks, innermost last.
    pub blocks: SmallVec<[Block; 4]>,

    /// Index of the caller frame in the frame stack.
    /// None for the outermost frame.
    pub parent: Option<u32>,

    /// Number of declared parameters.
    pub arg_count: u16,
}

impl Frame {
    /// Create a blank frame: every local unbound, empty operand stack.
    pub fn new(function: Rc<FunctionObject>, parent: Option<u32>) -> Self {
        let code = function.code.clone();
        let nlocals = code.nlocals();
        Self {
            arg_count: code.arg_count,
            slots: vec![None; nlocals],
            code,
            function,
            ip: 0,
            lasti: 0,
            blocks: SmallVec::new(),
            parent,
        }
    }

    /// Create a frame whose locals are initialized from bound arguments.
    pub fn with_locals(
        function: Rc<FunctionObject>,
        parent: Option<u32>,
        locals: Vec<Option<Value>>,
    ) -> Self {
        let mut frame = Self::new(function, parent);
        for (slot, value) in frame.slots.iter_mut().zip(locals) {
            *slot = value;
        }
        frame
    }

    /// Qualified name of the executing function.
    #[inline]
    pub fn qualname(&self) -> &Arc<str> {
        &self.code.qualname
    }

    /// Number of declared local slots.
    #[inline]
    pub fn nlocals(&self) -> usize {
        self.code.nlocals()
    }

    /// One past the highest live slot.
    #[inline]
    pub fn stack_top(&self) -> usize {
        self.slots.len()
    }

    /// Number of values on the operand stack (excluding locals).
    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.slots.len().saturating_sub(self.nlocals())
    }

    // =========================================================================
    // Instruction Fetching
    // =========================================================================

    /// Whether `ip` is past the end of the bytecode.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.ip as usize >= self.code.bytecode.len()
    }

    /// Decode the instruction at `ip`, record it as `lasti` and advance.
    #[inline]
    pub fn fetch(&mut self) -> VmResult<Instruction> {
        let inst = decode_at(&self.code.bytecode, self.ip)?;
        self.lasti = self.ip;
        self.ip = inst.next_offset();
        Ok(inst)
    }

    // =========================================================================
    // Locals
    // =========================================================================

    #[inline]
    pub fn local(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn set_local(&mut self, index: usize, value: Option<Value>) -> VmResult<()> {
        if index >= self.nlocals() {
            return Err(VmError::internal(format!(
                "local slot {} out of range in {}",
                index,
                self.qualname()
            )));
        }
        self.slots[index] = value;
        Ok(())
    }

    // =========================================================================
    // Operand Stack
    // =========================================================================

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.slots.push(Some(value));
    }

    /// Push an empty slot.
    #[inline]
    pub fn push_empty(&mut self) {
        self.slots.push(None);
    }

    /// Pop a slot, which may be empty.
    pub fn pop_slot(&mut self) -> VmResult<Option<Value>> {
        if self.slots.len() <= self.nlocals() {
            return Err(self.underflow());
        }
        Ok(self.slots.pop().flatten())
    }

    /// Pop a value; popping an empty slot is an error.
    pub fn pop(&mut self) -> VmResult<Value> {
        self.pop_slot()?.ok_or_else(|| self.empty_slot())
    }

    /// Value `depth` slots below the top (0 = TOS).
    pub fn peek(&self, depth: usize) -> VmResult<&Value> {
        let top = self.slots.len();
        if depth >= self.stack_depth() {
            return Err(self.underflow());
        }
        self.slots[top - 1 - depth]
            .as_ref()
            .ok_or_else(|| self.empty_slot())
    }

    /// The top `count` slots, bottom first.
    pub fn top_slots(&self, count: usize) -> VmResult<&[Option<Value>]> {
        if count > self.stack_depth() {
            return Err(self.underflow());
        }
        Ok(&self.slots[self.slots.len() - count..])
    }

    /// Discard the top `count` slots.
    pub fn pop_n(&mut self, count: usize) -> VmResult<()> {
        if count > self.stack_depth() {
            return Err(self.underflow());
        }
        let len = self.slots.len() - count;
        self.slots.truncate(len);
        Ok(())
    }

    /// Unwind the stack down to an absolute slot level.
    #[inline]
    pub fn truncate(&mut self, level: usize) {
        self.slots.truncate(level.max(self.nlocals()));
    }

    fn underflow(&self) -> VmError {
        VmError::internal(format!(
            "operand stack underflow in {} at offset {}",
            self.qualname(),
            self.lasti
        ))
    }

    fn empty_slot(&self) -> VmError {
        VmError::internal(format!(
            "empty stack slot consumed in {} at offset {}",
            self.qualname(),
            self.lasti
        ))
    }
}
