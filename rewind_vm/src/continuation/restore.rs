//! Frame restore engine.
//!
//! Writes a [`FrameRecord`] into a freshly pushed frame of the same function
//! so that the next dispatched instruction is the captured call. Only the
//! instruction pointer, the slots and the block stack are touched.

use super::FrameRecord;
use crate::error::ContinuationError;
use crate::frame::Frame;
use rewind_compiler::bytecode::decode_at;
use tracing::trace;

/// Restore `record` into `frame`.
///
/// Every check runs before the first write, so on error the frame is
/// untouched. Values are cloned in; the record keeps its own references.
pub fn restore(frame: &mut Frame, record: &FrameRecord) -> Result<(), ContinuationError> {
    let found = &frame.function.fingerprint;
    if found != record.code_fingerprint() {
        return Err(ContinuationError::CodeMismatch {
            function: frame.qualname().clone(),
            expected: record.code_fingerprint().clone(),
            found: found.clone(),
        });
    }

    let call = decode_at(&frame.code.bytecode, record.resume_position()).map_err(|source| {
        ContinuationError::MalformedBytecode {
            function: frame.qualname().clone(),
            source,
        }
    })?;

    frame.ip = call.offset;
    frame.lasti = call.offset;

    frame.slots.clear();
    frame.slots.extend(record.operand_stack().iter().cloned());

    frame.blocks.clear();
    frame.blocks.extend(record.exception_blocks().iter().copied());

    trace!(
        function = %frame.qualname(),
        ip = frame.ip,
        slots = frame.stack_top(),
        blocks = frame.blocks.len(),
        "restored frame"
    );

    Ok(())
}
