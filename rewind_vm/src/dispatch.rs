//! Opcode dispatch.
//!
//! Each opcode handler is a free function taking the interpreter and the
//! decoded instruction and returning a [`ControlFlow`] that tells the
//! evaluation loop what to do next. Handlers propagate catchable exceptions
//! as `Err(VmError::Exception(..))`; the loop turns those into
//! [`ControlFlow::Raise`].

use crate::error::VmResult;
use crate::interpreter::Interpreter;
use crate::ops::{arithmetic, attribute, calls, containers, control, exception, load_store};
use crate::value::Value;
use rewind_compiler::bytecode::{Instruction, Opcode};

/// Outcome of executing one instruction.
#[derive(Debug)]
pub enum ControlFlow {
    /// Fall through to the next instruction.
    Continue,
    /// Continue at an absolute byte offset.
    Jump(u32),
    /// Return from the current frame.
    Return(Value),
    /// Raise an exception in the current frame.
    Raise(Value),
}

/// Execute one instruction against the current frame.
pub fn dispatch(interp: &mut Interpreter, inst: Instruction) -> VmResult<ControlFlow> {
    match inst.opcode {
        // Stack
        Opcode::Nop => load_store::nop(interp, inst),
        Opcode::PopTop => load_store::pop_top(interp, inst),
        Opcode::RotTwo => load_store::rot_two(interp, inst),
        Opcode::DupTop => load_store::dup_top(interp, inst),

        // Load/Store
        Opcode::LoadConst => load_store::load_const(interp, inst),
        Opcode::LoadFast => load_store::load_fast(interp, inst),
        Opcode::StoreFast => load_store::store_fast(interp, inst),
        Opcode::DeleteFast => load_store::delete_fast(interp, inst),
        Opcode::LoadGlobal => load_store::load_global(interp, inst),
        Opcode::StoreGlobal => load_store::store_global(interp, inst),

        // Attributes
        Opcode::LoadAttr => attribute::load_attr(interp, inst),
        Opcode::StoreAttr => attribute::store_attr(interp, inst),
        Opcode::LoadMethod => attribute::load_method(interp, inst),

        // Arithmetic / Comparison
        Opcode::BinaryAdd => arithmetic::binary_add(interp, inst),
        Opcode::BinarySubtract => arithmetic::binary_subtract(interp, inst),
        Opcode::BinaryMultiply => arithmetic::binary_multiply(interp, inst),
        Opcode::UnaryNot => arithmetic::unary_not(interp, inst),
        Opcode::CompareOp => arithmetic::compare_op(interp, inst),

        // Containers
        Opcode::BuildTuple => containers::build_tuple(interp, inst),
        Opcode::BuildList => containers::build_list(interp, inst),
        Opcode::BuildMap => containers::build_map(interp, inst),

        // Control flow
        Opcode::JumpAbsolute => control::jump_absolute(interp, inst),
        Opcode::PopJumpIfFalse => control::pop_jump_if_false(interp, inst),
        Opcode::PopJumpIfTrue => control::pop_jump_if_true(interp, inst),
        Opcode::GetIter => control::get_iter(interp, inst),
        Opcode::ForIter => control::for_iter(interp, inst),
        Opcode::ReturnValue => control::return_value(interp, inst),

        // Exceptions
        Opcode::SetupExcept => exception::setup_except(interp, inst),
        Opcode::PopBlock => exception::pop_block(interp, inst),
        Opcode::PopExcept => exception::pop_except(interp, inst),
        Opcode::Raise => exception::raise(interp, inst),

        // Calls
        Opcode::CallFunction => calls::call_function(interp, inst),
        Opcode::CallMethod => calls::call_method(interp, inst),
        Opcode::CallFunctionKw => calls::call_function_kw(interp, inst),
        Opcode::CallFunctionEx => calls::call_function_ex(interp, inst),
    }
}
