//! Instruction-stream analysis for the snapshot engine.
//!
//! Every active for-loop keeps its iterator on the operand stack for the
//! whole loop body. To size a suspended frame's stack the snapshot engine
//! needs to know how many for-loops enclose the call site, which this module
//! recovers from the flat instruction stream alone.
//!
//! # Algorithm
//!
//! A for-loop compiles to a `FOR_ITER` head and a backward jump to that head
//! at the end of the body:
//!
//! ```text
//!   head:  FOR_ITER exit        ◄──┐
//!          ...                     │
//!          CALL_FUNCTION n  ◄─ site│
//!          ...                     │
//!          JUMP_ABSOLUTE head   ───┘
//!   exit:
//! ```
//!
//! Scanning forward from the site, each backward jump whose target lies
//! before the current range and lands on a loop head closes a loop that
//! encloses the range; the range then widens to that head so only loops
//! enclosing it count next. Backward jumps to anything else (while-loops
//! keep no iterator) are skipped, and jumps before the site are never seen.

use rewind_compiler::bytecode::{instruction_at, Instruction};

/// Number of for-loops enclosing the byte range `[start, end]`.
///
/// `instructions` must be in offset order, as produced by `decode`.
pub fn loop_nesting_level(instructions: &[Instruction], start: u32, end: u32) -> usize {
    let mut start = start;
    let mut level = 0;

    let first = instructions.partition_point(|inst| inst.offset < end);
    for inst in &instructions[first..] {
        if !inst.is_backward_jump() {
            continue;
        }
        let Some(target) = inst.jump_target() else {
            continue;
        };
        if target >= start {
            continue;
        }
        let lands_on_head = instruction_at(instructions, target)
            .is_some_and(|head| head.opcode.is_loop_head());
        if lands_on_head {
            level += 1;
            start = target;
        }
    }

    level
}
