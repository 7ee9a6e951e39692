//! Function builder for bytecode emission.
//!
//! The `FunctionBuilder` provides a high-level API for assembling the
//! variable-width stack bytecode, with label resolution and pooled
//! constants, names and locals.

use super::code_object::{CodeObject, Constant, LineTableEntry};
use super::instruction::encode;
use super::opcode::{CompareKind, OperandKind, Opcode};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// A label for jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A reference to a label whose operand must be patched at finish time.
#[derive(Debug)]
struct ForwardRef {
    /// Byte offset of the jump's operand.
    operand_offset: usize,
    /// The label being jumped to.
    label: Label,
}

/// Errors raised while assembling a code object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("label {0} was never bound")]
    UnboundLabel(u32),

    #[error("{opcode} operand {arg} does not fit in one byte")]
    OperandOverflow { opcode: Opcode, arg: usize },

    #[error("bytecode exceeds the 64 KiB jump range ({0} bytes)")]
    CodeTooLarge(usize),

    #[error("parameter '{0}' declared after local variables")]
    ParamAfterLocal(Arc<str>),

    #[error("{0} is not a jump opcode")]
    NotAJump(Opcode),
}

/// Key type for constant deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Names(Vec<Arc<str>>),
}

impl ConstantKey {
    fn from_constant(constant: &Constant) -> Option<Self> {
        match constant {
            Constant::None => Some(ConstantKey::None),
            Constant::Bool(b) => Some(ConstantKey::Bool(*b)),
            Constant::Int(i) => Some(ConstantKey::Int(*i)),
            Constant::Str(s) => Some(ConstantKey::Str(s.clone())),
            Constant::Names(names) => Some(ConstantKey::Names(names.to_vec())),
            // Code objects are never shared between sites
            Constant::Code(_) => None,
        }
    }
}

/// Builder for constructing code objects.
///
/// # Example
/// ```
/// use rewind_compiler::bytecode::FunctionBuilder;
///
/// let mut builder = FunctionBuilder::new("add");
/// let x = builder.add_param("x").unwrap();
/// let y = builder.add_param("y").unwrap();
///
/// builder.emit_load_fast(x);
/// builder.emit_load_fast(y);
/// builder.emit_binary_add();
/// builder.emit_return();
///
/// let code = builder.finish().unwrap();
/// assert_eq!(code.arg_count, 2);
/// ```
pub struct FunctionBuilder {
    name: Arc<str>,
    qualname: Arc<str>,
    filename: Arc<str>,
    first_lineno: u32,
    current_line: u32,

    /// Emitted bytes.
    bytecode: Vec<u8>,

    constants: Vec<Constant>,
    constant_map: FxHashMap<ConstantKey, u16>,

    /// Local variable names (parameters first).
    varnames: Vec<Arc<str>>,
    local_map: FxHashMap<Arc<str>, u8>,
    arg_count: u16,

    /// Global/attribute names.
    names: Vec<Arc<str>>,
    name_map: FxHashMap<Arc<str>, u16>,

    next_label: u32,
    labels: FxHashMap<Label, usize>,
    forward_refs: Vec<ForwardRef>,

    line_table: Vec<LineTableEntry>,
    line_start: u32,

    /// First operand-range violation, reported by `finish`.
    deferred_error: Option<BuildError>,
}

impl FunctionBuilder {
    /// Create a new function builder.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            filename: "<unknown>".into(),
            first_lineno: 1,
            current_line: 1,
            bytecode: Vec::new(),
            constants: Vec::new(),
            constant_map: FxHashMap::default(),
            varnames: Vec::new(),
            local_map: FxHashMap::default(),
            arg_count: 0,
            names: Vec::new(),
            name_map: FxHashMap::default(),
            next_label: 0,
            labels: FxHashMap::default(),
            forward_refs: Vec::new(),
            line_table: Vec::new(),
            line_start: 0,
            deferred_error: None,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the qualified name.
    pub fn set_qualname(&mut self, qualname: impl Into<Arc<str>>) {
        self.qualname = qualname.into();
    }

    /// Set the filename.
    pub fn set_filename(&mut self, filename: impl Into<Arc<str>>) {
        self.filename = filename.into();
    }

    /// Set the first line number.
    pub fn set_first_lineno(&mut self, line: u32) {
        self.first_lineno = line;
        self.current_line = line;
    }

    /// Set the current line number for subsequent instructions.
    pub fn set_line(&mut self, line: u32) {
        if line != self.current_line {
            let current = self.bytecode.len() as u32;
            if current > self.line_start {
                self.line_table.push(LineTableEntry {
                    start: self.line_start,
                    end: current,
                    line: self.current_line,
                });
            }
            self.current_line = line;
            self.line_start = current;
        }
    }

    // =========================================================================
    // Locals
    // =========================================================================

    /// Declare a parameter. Parameters must precede all other locals.
    pub fn add_param(&mut self, name: impl Into<Arc<str>>) -> Result<u8, BuildError> {
        let name = name.into();
        if self.varnames.len() != self.arg_count as usize {
            return Err(BuildError::ParamAfterLocal(name));
        }
        let slot = self.define_local(name);
        self.arg_count = self.varnames.len() as u16;
        Ok(slot)
    }

    /// Define a local variable and return its slot.
    pub fn define_local(&mut self, name: impl Into<Arc<str>>) -> u8 {
        let name = name.into();
        if let Some(&slot) = self.local_map.get(&name) {
            return slot;
        }
        let index = self.varnames.len();
        if index > u8::MAX as usize {
            self.defer(BuildError::OperandOverflow {
                opcode: Opcode::LoadFast,
                arg: index,
            });
        }
        let slot = index as u8;
        self.local_map.insert(name.clone(), slot);
        self.varnames.push(name);
        slot
    }

    /// Look up a local variable by name.
    pub fn lookup_local(&self, name: &str) -> Option<u8> {
        self.local_map.get(name).copied()
    }

    // =========================================================================
    // Constant Pool
    // =========================================================================

    /// Add a constant and return its index.
    pub fn add_constant(&mut self, constant: Constant) -> u16 {
        let key = ConstantKey::from_constant(&constant);
        if let Some(idx) = key.as_ref().and_then(|k| self.constant_map.get(k)) {
            return *idx;
        }
        let idx = self.constants.len() as u16;
        self.constants.push(constant);
        if let Some(key) = key {
            self.constant_map.insert(key, idx);
        }
        idx
    }

    /// Add an integer constant.
    pub fn add_int(&mut self, value: i64) -> u16 {
        self.add_constant(Constant::Int(value))
    }

    /// Add a string constant.
    pub fn add_str(&mut self, value: &str) -> u16 {
        self.add_constant(Constant::Str(value.into()))
    }

    /// Add a keyword-name tuple constant.
    pub fn add_names(&mut self, names: &[&str]) -> u16 {
        let names: Vec<Arc<str>> = names.iter().map(|n| Arc::from(*n)).collect();
        self.add_constant(Constant::Names(names.into()))
    }

    /// Add a nested code object constant.
    pub fn add_code(&mut self, code: CodeObject) -> u16 {
        self.add_constant(Constant::Code(Arc::new(code)))
    }

    // =========================================================================
    // Names (globals, attributes)
    // =========================================================================

    /// Add a name and return its index.
    pub fn add_name(&mut self, name: impl Into<Arc<str>>) -> u16 {
        let name = name.into();
        if let Some(&idx) = self.name_map.get(&name) {
            return idx;
        }
        let idx = self.names.len() as u16;
        self.name_map.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create a new label for a jump target.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Mark the current position as the target for a label.
    pub fn bind_label(&mut self, label: Label) {
        self.labels.insert(label, self.bytecode.len());
    }

    /// Byte offset at which the next instruction will be emitted.
    pub fn current_offset(&self) -> u32 {
        self.bytecode.len() as u32
    }

    // =========================================================================
    // Instruction Emission
    // =========================================================================

    /// Emit a raw instruction, returning its byte offset.
    pub fn emit(&mut self, opcode: Opcode, arg: u16) -> u32 {
        if opcode.operand_kind() == OperandKind::Byte && arg > u8::MAX as u16 {
            self.defer(BuildError::OperandOverflow {
                opcode,
                arg: arg as usize,
            });
        }
        let offset = self.current_offset();
        encode(opcode, arg, &mut self.bytecode);
        offset
    }

    /// Emit a jump to `label`, patched when the builder finishes.
    pub fn emit_jump(&mut self, opcode: Opcode, label: Label) -> u32 {
        if !opcode.is_jump() {
            self.defer(BuildError::NotAJump(opcode));
        }
        let offset = self.emit(opcode, 0);
        self.forward_refs.push(ForwardRef {
            operand_offset: offset as usize + 1,
            label,
        });
        offset
    }

    fn defer(&mut self, err: BuildError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(err);
        }
    }

    // --- Stack ---

    /// Emit a NOP instruction.
    pub fn emit_nop(&mut self) -> u32 {
        self.emit(Opcode::Nop, 0)
    }

    /// Discard TOS.
    pub fn emit_pop_top(&mut self) -> u32 {
        self.emit(Opcode::PopTop, 0)
    }

    /// Duplicate TOS.
    pub fn emit_dup_top(&mut self) -> u32 {
        self.emit(Opcode::DupTop, 0)
    }

    /// Swap the top two stack entries.
    pub fn emit_rot_two(&mut self) -> u32 {
        self.emit(Opcode::RotTwo, 0)
    }

    // --- Load/Store ---

    /// Push a constant by pool index.
    pub fn emit_load_const(&mut self, idx: u16) -> u32 {
        self.emit(Opcode::LoadConst, idx)
    }

    /// Push None.
    pub fn emit_load_none(&mut self) -> u32 {
        let idx = self.add_constant(Constant::None);
        self.emit_load_const(idx)
    }

    /// Push a boolean.
    pub fn emit_load_bool(&mut self, value: bool) -> u32 {
        let idx = self.add_constant(Constant::Bool(value));
        self.emit_load_const(idx)
    }

    /// Push an integer.
    pub fn emit_load_int(&mut self, value: i64) -> u32 {
        let idx = self.add_int(value);
        self.emit_load_const(idx)
    }

    /// Push a string.
    pub fn emit_load_str(&mut self, value: &str) -> u32 {
        let idx = self.add_str(value);
        self.emit_load_const(idx)
    }

    /// Push a keyword-name tuple.
    pub fn emit_load_names(&mut self, names: &[&str]) -> u32 {
        let idx = self.add_names(names);
        self.emit_load_const(idx)
    }

    /// Push a local variable.
    pub fn emit_load_fast(&mut self, slot: u8) -> u32 {
        self.emit(Opcode::LoadFast, slot as u16)
    }

    /// Pop TOS into a local variable.
    pub fn emit_store_fast(&mut self, slot: u8) -> u32 {
        self.emit(Opcode::StoreFast, slot as u16)
    }

    /// Clear a local variable.
    pub fn emit_delete_fast(&mut self, slot: u8) -> u32 {
        self.emit(Opcode::DeleteFast, slot as u16)
    }

    /// Push a global.
    pub fn emit_load_global(&mut self, name: &str) -> u32 {
        let idx = self.add_name(name);
        self.emit(Opcode::LoadGlobal, idx)
    }

    /// Pop TOS into a global.
    pub fn emit_store_global(&mut self, name: &str) -> u32 {
        let idx = self.add_name(name);
        self.emit(Opcode::StoreGlobal, idx)
    }

    /// Replace TOS with one of its attributes.
    pub fn emit_load_attr(&mut self, name: &str) -> u32 {
        let idx = self.add_name(name);
        self.emit(Opcode::LoadAttr, idx)
    }

    /// TOS.name = TOS1.
    pub fn emit_store_attr(&mut self, name: &str) -> u32 {
        let idx = self.add_name(name);
        self.emit(Opcode::StoreAttr, idx)
    }

    /// Replace TOS with (method, receiver).
    pub fn emit_load_method(&mut self, name: &str) -> u32 {
        let idx = self.add_name(name);
        self.emit(Opcode::LoadMethod, idx)
    }

    // --- Arithmetic / Comparison ---

    /// TOS = TOS1 + TOS.
    pub fn emit_binary_add(&mut self) -> u32 {
        self.emit(Opcode::BinaryAdd, 0)
    }

    /// TOS = TOS1 - TOS.
    pub fn emit_binary_subtract(&mut self) -> u32 {
        self.emit(Opcode::BinarySubtract, 0)
    }

    /// TOS = TOS1 * TOS.
    pub fn emit_binary_multiply(&mut self) -> u32 {
        self.emit(Opcode::BinaryMultiply, 0)
    }

    /// TOS = not TOS.
    pub fn emit_unary_not(&mut self) -> u32 {
        self.emit(Opcode::UnaryNot, 0)
    }

    /// Compare TOS1 with TOS.
    pub fn emit_compare(&mut self, kind: CompareKind) -> u32 {
        self.emit(Opcode::CompareOp, kind as u16)
    }

    // --- Containers ---

    /// Build a tuple from the top `count` items.
    pub fn emit_build_tuple(&mut self, count: u8) -> u32 {
        self.emit(Opcode::BuildTuple, count as u16)
    }

    /// Build a list from the top `count` items.
    pub fn emit_build_list(&mut self, count: u8) -> u32 {
        self.emit(Opcode::BuildList, count as u16)
    }

    /// Build a dict from the top `count` key/value pairs.
    pub fn emit_build_map(&mut self, count: u8) -> u32 {
        self.emit(Opcode::BuildMap, count as u16)
    }

    // --- Control Flow ---

    /// Return TOS.
    pub fn emit_return(&mut self) -> u32 {
        self.emit(Opcode::ReturnValue, 0)
    }

    /// Return None.
    pub fn emit_return_none(&mut self) -> u32 {
        let offset = self.emit_load_none();
        self.emit_return();
        offset
    }

    /// Unconditional jump to label.
    pub fn emit_jump_absolute(&mut self, label: Label) -> u32 {
        self.emit_jump(Opcode::JumpAbsolute, label)
    }

    /// Pop TOS and jump if falsy.
    pub fn emit_pop_jump_if_false(&mut self, label: Label) -> u32 {
        self.emit_jump(Opcode::PopJumpIfFalse, label)
    }

    /// Pop TOS and jump if truthy.
    pub fn emit_pop_jump_if_true(&mut self, label: Label) -> u32 {
        self.emit_jump(Opcode::PopJumpIfTrue, label)
    }

    /// TOS = iter(TOS).
    pub fn emit_get_iter(&mut self) -> u32 {
        self.emit(Opcode::GetIter, 0)
    }

    /// Loop head: push next item or exit to `exit`.
    pub fn emit_for_iter(&mut self, exit: Label) -> u32 {
        self.emit_jump(Opcode::ForIter, exit)
    }

    // --- Exceptions ---

    /// Enter a try block whose handler is at `handler`.
    pub fn emit_setup_except(&mut self, handler: Label) -> u32 {
        self.emit_jump(Opcode::SetupExcept, handler)
    }

    /// Leave the innermost try block.
    pub fn emit_pop_block(&mut self) -> u32 {
        self.emit(Opcode::PopBlock, 0)
    }

    /// Leave an exception handler.
    pub fn emit_pop_except(&mut self) -> u32 {
        self.emit(Opcode::PopExcept, 0)
    }

    /// Raise TOS.
    pub fn emit_raise(&mut self) -> u32 {
        self.emit(Opcode::Raise, 0)
    }

    // --- Calls ---

    /// Call with `argc` positional arguments.
    pub fn emit_call_function(&mut self, argc: u8) -> u32 {
        self.emit(Opcode::CallFunction, argc as u16)
    }

    /// Call a method loaded by `LoadMethod` with `argc` arguments.
    pub fn emit_call_method(&mut self, argc: u8) -> u32 {
        self.emit(Opcode::CallMethod, argc as u16)
    }

    /// Call with `argc` keyword arguments; a name tuple must be on TOS.
    pub fn emit_call_function_kw(&mut self, argc: u8) -> u32 {
        self.emit(Opcode::CallFunctionKw, argc as u16)
    }

    /// Call with an unpacked argument tuple (and kwargs dict if `with_kwargs`).
    pub fn emit_call_function_ex(&mut self, with_kwargs: bool) -> u32 {
        self.emit(Opcode::CallFunctionEx, with_kwargs as u16)
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Finish building and return the code object.
    pub fn finish(mut self) -> Result<CodeObject, BuildError> {
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        if self.bytecode.len() > u16::MAX as usize {
            return Err(BuildError::CodeTooLarge(self.bytecode.len()));
        }

        let end = self.bytecode.len() as u32;
        if end > self.line_start {
            self.line_table.push(LineTableEntry {
                start: self.line_start,
                end,
                line: self.current_line,
            });
        }

        for fwd in &self.forward_refs {
            let target = *self
                .labels
                .get(&fwd.label)
                .ok_or(BuildError::UnboundLabel(fwd.label.0))?;
            let bytes = (target as u16).to_le_bytes();
            self.bytecode[fwd.operand_offset] = bytes[0];
            self.bytecode[fwd.operand_offset + 1] = bytes[1];
        }

        Ok(CodeObject {
            name: self.name,
            qualname: self.qualname,
            filename: self.filename,
            first_lineno: self.first_lineno,
            bytecode: self.bytecode.into(),
            constants: self.constants.into_boxed_slice(),
            names: self.names.into_boxed_slice(),
            varnames: self.varnames.into_boxed_slice(),
            arg_count: self.arg_count,
            line_table: self.line_table.into_boxed_slice(),
        })
    }
}
