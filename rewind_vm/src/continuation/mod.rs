//! First-class continuations.
//!
//! A continuation is a snapshot of the live call chain: for every bytecode
//! frame, the call instruction it is suspended in, its locals and operand
//! stack, and its exception blocks. Resuming a continuation rebuilds that
//! chain by re-invoking the outermost function and restoring one record into
//! each frame as it is entered, so execution continues as if none of the
//! captured calls had returned.
//!
//! # Capture
//!
//! ```text
//!   frame stack               Continuation (innermost first)
//!   ┌──────────────┐
//!   │ C  (top)     │ ───────► [0] FrameRecord { C @ CALL_FUNCTION capture }
//!   ├──────────────┤
//!   │ B            │ ───────► [1] FrameRecord { B @ CALL_FUNCTION C }
//!   ├──────────────┤
//!   │ A            │ ───────► [2] FrameRecord { A @ CALL_FUNCTION B }
//!   └──────────────┘
//! ```
//!
//! # Resume
//!
//! ```text
//!   resume(k)
//!     └─ run fresh A ── hook: restore [2] ── re-execute CALL B
//!          └─ run B ──── hook: restore [1] ── re-execute CALL C
//!               └─ run C ── hook: restore [0] ── re-execute capture()
//!                                                  └─ hook armed: disarm,
//!                                                     return empty
//! ```
//!
//! # Modules
//!
//! - [`analysis`] - loop nesting of a call site
//! - [`snapshot`] - live frame to [`FrameRecord`]
//! - [`restore`] - [`FrameRecord`] into a fresh frame
//! - [`driver`] - `capture`/`resume` and the resume hook

pub mod analysis;
pub mod driver;
pub mod restore;
pub mod snapshot;

pub use analysis::loop_nesting_level;
pub use driver::{capture, resume, ResumeHook};
pub use restore::restore;
pub use snapshot::{call_slots, snapshot};

use crate::frame::Block;
use crate::value::{FunctionObject, Value};
use rewind_compiler::bytecode::CodeObject;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

// =============================================================================
// Code Fingerprint
// =============================================================================

/// Identity of a function body: its bytecode plus a precomputed hash.
///
/// Equality compares the hash first and falls back to the bytes, so two
/// fingerprints are equal exactly when the bytecode is identical.
#[derive(Clone)]
pub struct CodeFingerprint {
    bytes: Arc<[u8]>,
    hash: u64,
}

impl CodeFingerprint {
    pub fn of(code: &CodeObject) -> Self {
        let mut hasher = FxHasher::default();
        code.bytecode.hash(&mut hasher);
        Self {
            bytes: code.bytecode.clone(),
            hash: hasher.finish(),
        }
    }

    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for CodeFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && (Arc::ptr_eq(&self.bytes, &other.bytes) || self.bytes == other.bytes)
    }
}

impl Eq for CodeFingerprint {}

impl fmt::Display for CodeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x} ({} bytes)", self.hash, self.bytes.len())
    }
}

impl fmt::Debug for CodeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeFingerprint({:016x})", self.hash)
    }
}

// =============================================================================
// Frame Record
// =============================================================================

/// Immutable snapshot of one suspended frame.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    resume_position: u32,
    operand_stack: Vec<Option<Value>>,
    code_fingerprint: CodeFingerprint,
    exception_blocks: Vec<Block>,
    function: Rc<FunctionObject>,
}

impl FrameRecord {
    pub(crate) fn new(
        resume_position: u32,
        operand_stack: Vec<Option<Value>>,
        code_fingerprint: CodeFingerprint,
        exception_blocks: Vec<Block>,
        function: Rc<FunctionObject>,
    ) -> Self {
        Self {
            resume_position,
            operand_stack,
            code_fingerprint,
            exception_blocks,
            function,
        }
    }

    /// Byte offset of the call instruction to re-execute.
    #[inline]
    pub fn resume_position(&self) -> u32 {
        self.resume_position
    }

    /// Locals followed by live stack slots; `None` marks an empty slot.
    #[inline]
    pub fn operand_stack(&self) -> &[Option<Value>] {
        &self.operand_stack
    }

    #[inline]
    pub fn code_fingerprint(&self) -> &CodeFingerprint {
        &self.code_fingerprint
    }

    /// Exception blocks, innermost last.
    #[inline]
    pub fn exception_blocks(&self) -> &[Block] {
        &self.exception_blocks
    }

    #[inline]
    pub fn function(&self) -> &Rc<FunctionObject> {
        &self.function
    }
}

// =============================================================================
// Continuation
// =============================================================================

/// A captured call chain, innermost frame first.
#[derive(Debug, Clone, Default)]
pub struct Continuation {
    records: Vec<FrameRecord>,
}

impl Continuation {
    pub fn new(records: Vec<FrameRecord>) -> Self {
        Self { records }
    }

    /// The continuation returned by a capture that found a resume in flight.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of captured frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// The frame that called `capture`.
    pub fn innermost(&self) -> Option<&FrameRecord> {
        self.records.first()
    }

    /// The frame `resume` re-invokes.
    pub fn outermost(&self) -> Option<&FrameRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<FrameRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Continuation {
    type Item = &'a FrameRecord;
    type IntoIter = std::slice::Iter<'a, FrameRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
