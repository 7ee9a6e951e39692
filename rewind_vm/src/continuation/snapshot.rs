//! Frame snapshot engine.
//!
//! Turns a frame suspended in a call into a [`FrameRecord`]. The minimum
//! number of live slots is computed from the code:
//!
//! ```text
//! stack_size = nlocals
//!            + 3 * active except handlers     (previous-exception triplet)
//!            + enclosing for-loops            (one iterator each)
//!            + call slots                     (callee, receiver, args, ...)
//! ```
//!
//! Anything the live stack holds above that is an intermediate operand
//! pushed before the callee and is captured with the rest. A live stack
//! shorter than `stack_size` is an error.
//!
//! | Call                 | Slots                      |
//! |----------------------|----------------------------|
//! | `CALL_FUNCTION n`    | callee + n                 |
//! | `CALL_METHOD n`      | method + receiver + n      |
//! | `CALL_FUNCTION_KW n` | callee + n + name tuple    |
//! | `CALL_FUNCTION_EX f` | callee + args (+ kwargs)   |

use super::analysis::loop_nesting_level;
use super::FrameRecord;
use crate::error::ContinuationError;
use crate::frame::{BlockKind, Frame, EXC_TRIPLET_SLOTS};
use crate::value::Value;
use rewind_compiler::bytecode::{decode, disassemble, instruction_at, Instruction, Opcode};
use tracing::{debug, error, trace};

/// Snapshot a frame whose `lasti` is a call instruction.
///
/// Captured values are cloned; the frame itself is not modified.
pub fn snapshot(frame: &Frame) -> Result<FrameRecord, ContinuationError> {
    let code = &frame.code;
    let position = frame.lasti;

    let handlers = frame
        .blocks
        .iter()
        .filter(|block| block.kind == BlockKind::ExceptHandler)
        .count();
    let mut stack_size = frame.nlocals() + EXC_TRIPLET_SLOTS * handlers;

    let instructions = decode(&code.bytecode).map_err(|source| {
        ContinuationError::MalformedBytecode {
            function: code.qualname.clone(),
            source,
        }
    })?;

    let call = match instruction_at(&instructions, position) {
        Some(inst) if inst.opcode.is_call() => *inst,
        other => return Err(unsupported(frame, other.map(|inst| inst.opcode))),
    };

    stack_size += loop_nesting_level(&instructions, position, position);
    stack_size += call_slots(frame, &call)?;

    let live = frame.stack_top();
    if live < stack_size {
        return Err(ContinuationError::StackUnderflow {
            function: code.qualname.clone(),
            offset: position,
            computed: stack_size,
            live,
        });
    }

    // Operands pushed before the callee (`100 + f()`) sit below the call
    // slots.
    let intermediates = live - stack_size;
    if intermediates > 0 {
        debug!(
            function = %code.qualname,
            offset = position,
            intermediates,
            "capturing intermediate operands below the call"
        );
    }

    let operand_stack: Vec<Option<Value>> = frame.slots[..live].to_vec();

    trace!(
        function = %code.qualname,
        offset = position,
        slots = live,
        blocks = frame.blocks.len(),
        "captured frame"
    );

    Ok(FrameRecord::new(
        position,
        operand_stack,
        frame.function.fingerprint.clone(),
        frame.blocks.to_vec(),
        frame.function.clone(),
    ))
}

/// Stack slots held by an in-flight call instruction.
pub fn call_slots(frame: &Frame, call: &Instruction) -> Result<usize, ContinuationError> {
    let argc = call.arg as usize;
    match call.opcode {
        Opcode::CallFunction => Ok(1 + argc),
        Opcode::CallMethod => Ok(2 + argc),
        Opcode::CallFunctionKw => {
            let found = match frame.slots.last() {
                Some(Some(Value::Tuple(names))) => names.len(),
                _ => 0,
            };
            if found != argc {
                return Err(ContinuationError::ArgumentCountIntegrityViolation {
                    function: frame.qualname().clone(),
                    expected: argc,
                    found,
                });
            }
            Ok(2 + argc)
        }
        Opcode::CallFunctionEx => Ok(2 + (argc & 1)),
        other => Err(unsupported(frame, Some(other))),
    }
}

fn unsupported(frame: &Frame, opcode: Option<Opcode>) -> ContinuationError {
    let disassembly = disassemble(&frame.code);
    let opcode = opcode.map_or("<no instruction>", Opcode::name);
    error!(
        function = %frame.qualname(),
        offset = frame.lasti,
        opcode,
        "unsupported call site for continuation capture\n{}",
        disassembly
    );
    ContinuationError::UnsupportedCallSite {
        function: frame.qualname().clone(),
        offset: frame.lasti,
        opcode,
        disassembly,
    }
}
