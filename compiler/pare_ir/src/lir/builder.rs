//! Instruction-level LIR builder.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::ir::{BinopKind, IfKind, IfType, InvokeKind, NumericType, Position};
use crate::{CallSite, FieldRef, MethodHandle, MethodRef, Name, Proto, TypeRef};

use super::encoding::{write_uleb, zigzag};
use super::{
    opcodes, LirCatchHandler, LirCode, LirConstant, LirError, LirWriter, PositionEntry,
    TryCatchTable,
};

/// Builds a [`LirCode`] one instruction at a time.
///
/// Value operands are given as absolute value indices (arguments first,
/// then one index per instruction) and encoded relative to the instruction
/// being added. Block operands are block start instruction indices.
///
/// Encoding errors are sticky: the first one is reported by [`build`](Self::build).
pub struct LirBuilder {
    writer: LirWriter,
    operands: Vec<u8>,
    constant_indices: FxHashMap<LirConstant, u32>,
    constants: Vec<LirConstant>,
    argument_count: u32,
    instruction_count: u32,
    positions: Vec<PositionEntry>,
    current_position: Position,
    flushed_position: Position,
    try_catch: BTreeMap<u32, Vec<LirCatchHandler>>,
    error: Option<LirError>,
}

impl Default for LirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LirBuilder {
    pub fn new() -> Self {
        LirBuilder {
            writer: LirWriter::new(),
            operands: Vec::with_capacity(16),
            constant_indices: FxHashMap::default(),
            constants: Vec::new(),
            argument_count: 0,
            instruction_count: 0,
            positions: Vec::new(),
            current_position: Position::NONE,
            flushed_position: Position::NONE,
            try_catch: BTreeMap::new(),
            error: None,
        }
    }

    /// Declare the next argument, returning its value index.
    pub fn add_argument(&mut self) -> u32 {
        debug_assert_eq!(self.instruction_count, 0, "arguments precede instructions");
        let index = self.argument_count;
        self.argument_count += 1;
        index
    }

    /// Value index the next instruction will get.
    pub fn next_value_index(&self) -> u32 {
        self.argument_count + self.instruction_count
    }

    /// Instruction index the next instruction will get.
    pub fn next_instruction_index(&self) -> u32 {
        self.instruction_count
    }

    pub fn set_position(&mut self, position: Position) {
        self.current_position = position;
    }

    // ── Operand encoding ────────────────────────────────────────

    fn constant_index(&mut self, constant: LirConstant) -> u32 {
        if let Some(&index) = self.constant_indices.get(&constant) {
            return index;
        }
        let index = u32::try_from(self.constants.len())
            .unwrap_or_else(|_| panic!("constant pool overflow"));
        self.constants.push(constant.clone());
        self.constant_indices.insert(constant, index);
        index
    }

    fn constant_operand(&mut self, constant: LirConstant) {
        let index = self.constant_index(constant);
        write_uleb(&mut self.operands, u64::from(index));
    }

    fn value_operand(&mut self, value: u32) {
        // Phi operands may refer forward, giving a negative distance.
        let current = i64::from(self.next_value_index());
        write_uleb(&mut self.operands, zigzag(current - i64::from(value)));
    }

    fn int_operand(&mut self, value: i64) {
        write_uleb(&mut self.operands, zigzag(value));
    }

    fn block_operand(&mut self, block: u32) {
        write_uleb(&mut self.operands, u64::from(block));
    }

    /// Flush the position if it changed and account for the instruction.
    fn advance(&mut self) {
        if self.current_position != self.flushed_position {
            self.positions.push(PositionEntry {
                from_instruction: self.instruction_count,
                position: self.current_position,
            });
            self.flushed_position = self.current_position;
        }
        self.instruction_count += 1;
    }

    fn emit(&mut self, opcode: u8) {
        self.advance();
        if opcodes::is_one_byte(opcode) {
            debug_assert!(self.operands.is_empty());
            self.writer.write_one_byte_instruction(opcode);
            return;
        }
        match self.writer.write_instruction(opcode, self.operands.len()) {
            Ok(()) => self.writer.write_operands(&self.operands),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self.operands.clear();
    }

    // ── Constants and allocation ────────────────────────────────

    pub fn add_const_null(&mut self) {
        self.emit(opcodes::ACONST_NULL);
    }

    pub fn add_const_int(&mut self, value: i32) {
        match value {
            0..=5 => {
                let small = u8::try_from(value).unwrap_or(0);
                self.emit(opcodes::ICONST_0 + small);
            }
            _ => {
                self.int_operand(i64::from(value));
                self.emit(opcodes::ICONST);
            }
        }
    }

    pub fn add_const_long(&mut self, value: i64) {
        self.int_operand(value);
        self.emit(opcodes::LCONST);
    }

    pub fn add_const_string(&mut self, value: Name) {
        self.constant_operand(LirConstant::String(value));
        self.emit(opcodes::LDC);
    }

    pub fn add_const_class(&mut self, ty: TypeRef) {
        self.constant_operand(LirConstant::Type(ty));
        self.emit(opcodes::LDC);
    }

    pub fn add_const_method_handle(&mut self, handle: MethodHandle) {
        self.constant_operand(LirConstant::MethodHandle(handle));
        self.emit(opcodes::LDC);
    }

    pub fn add_const_method_type(&mut self, proto: Proto) {
        self.constant_operand(LirConstant::Proto(proto));
        self.emit(opcodes::LDC);
    }

    pub fn add_new_instance(&mut self, ty: TypeRef) {
        self.constant_operand(LirConstant::Type(ty));
        self.emit(opcodes::NEW);
    }

    pub fn add_new_array(&mut self, ty: TypeRef, size: u32) {
        self.constant_operand(LirConstant::Type(ty));
        self.value_operand(size);
        self.emit(opcodes::NEWARRAY);
    }

    pub fn add_new_unboxed_enum(&mut self, ty: TypeRef, ordinal: i32) {
        self.constant_operand(LirConstant::Type(ty));
        self.int_operand(i64::from(ordinal));
        self.emit(opcodes::NEWUNBOXEDENUM);
    }

    // ── Arrays and fields ───────────────────────────────────────

    pub fn add_array_get(&mut self, ty: TypeRef, array: u32, index: u32) {
        self.constant_operand(LirConstant::Type(ty));
        self.value_operand(array);
        self.value_operand(index);
        self.emit(opcodes::ARRAYGET);
    }

    pub fn add_array_put(&mut self, array: u32, index: u32, value: u32) {
        self.value_operand(array);
        self.value_operand(index);
        self.value_operand(value);
        self.emit(opcodes::ARRAYPUT);
    }

    pub fn add_array_length(&mut self, array: u32) {
        self.value_operand(array);
        self.emit(opcodes::ARRAYLENGTH);
    }

    pub fn add_static_get(&mut self, field: FieldRef) {
        self.constant_operand(LirConstant::Field(field));
        self.emit(opcodes::GETSTATIC);
    }

    pub fn add_static_put(&mut self, field: FieldRef, value: u32) {
        self.constant_operand(LirConstant::Field(field));
        self.value_operand(value);
        self.emit(opcodes::PUTSTATIC);
    }

    pub fn add_instance_get(&mut self, field: FieldRef, object: u32) {
        self.constant_operand(LirConstant::Field(field));
        self.value_operand(object);
        self.emit(opcodes::GETFIELD);
    }

    pub fn add_instance_put(&mut self, field: FieldRef, object: u32, value: u32) {
        self.constant_operand(LirConstant::Field(field));
        self.value_operand(object);
        self.value_operand(value);
        self.emit(opcodes::PUTFIELD);
    }

    // ── Invokes, types, arithmetic ──────────────────────────────

    pub fn add_invoke(
        &mut self,
        kind: InvokeKind,
        method: MethodRef,
        is_interface: bool,
        args: &[u32],
    ) {
        self.constant_operand(LirConstant::Method(method));
        for &arg in args {
            self.value_operand(arg);
        }
        self.emit(opcodes::invoke_opcode(kind, is_interface));
    }

    pub fn add_invoke_custom(&mut self, call_site: std::sync::Arc<CallSite>, args: &[u32]) {
        self.constant_operand(LirConstant::CallSite(call_site));
        for &arg in args {
            self.value_operand(arg);
        }
        self.emit(opcodes::INVOKECUSTOM);
    }

    pub fn add_check_cast(&mut self, ty: TypeRef, value: u32) {
        self.constant_operand(LirConstant::Type(ty));
        self.value_operand(value);
        self.emit(opcodes::CHECKCAST);
    }

    pub fn add_instance_of(&mut self, ty: TypeRef, value: u32) {
        self.constant_operand(LirConstant::Type(ty));
        self.value_operand(value);
        self.emit(opcodes::INSTANCEOF);
    }

    pub fn add_binop(&mut self, op: BinopKind, ty: NumericType, lhs: u32, rhs: u32) {
        self.value_operand(lhs);
        self.value_operand(rhs);
        self.emit(opcodes::binop_opcode(op, ty));
    }

    pub fn add_debug_position(&mut self) {
        self.emit(opcodes::DEBUGPOS);
    }

    pub fn add_phi(&mut self, ty: TypeRef, operands: &[u32]) {
        self.constant_operand(LirConstant::Type(ty));
        for &operand in operands {
            self.value_operand(operand);
        }
        self.emit(opcodes::PHI);
    }

    // ── Control flow ────────────────────────────────────────────

    pub fn add_goto(&mut self, target: u32) {
        self.block_operand(target);
        self.emit(opcodes::GOTO);
    }

    /// Jump to the block starting right after this instruction.
    pub fn add_fallthrough(&mut self) {
        self.emit(opcodes::FALLTHROUGH);
    }

    pub fn add_if(
        &mut self,
        kind: IfKind,
        ty: IfType,
        target: u32,
        lhs: u32,
        rhs: Option<u32>,
    ) {
        let Some(opcode) = opcodes::if_opcode(kind, ty, rhs.is_some()) else {
            self.error
                .get_or_insert(LirError::UnsupportedBranch { kind });
            self.advance();
            return;
        };
        self.block_operand(target);
        self.value_operand(lhs);
        if let Some(rhs) = rhs {
            self.value_operand(rhs);
        }
        self.emit(opcode);
    }

    pub fn add_return(&mut self, value: Option<u32>) {
        match value {
            None => self.emit(opcodes::RETURN),
            Some(value) => {
                self.value_operand(value);
                self.emit(opcodes::RETURN_VALUE);
            }
        }
    }

    pub fn add_throw(&mut self, exception: u32) {
        self.value_operand(exception);
        self.emit(opcodes::THROW);
    }

    /// Record the handlers of the block starting at `block`.
    pub fn add_try_catch(&mut self, block: u32, handlers: Vec<LirCatchHandler>) {
        if !handlers.is_empty() {
            self.try_catch.insert(block, handlers);
        }
    }

    pub fn build(self) -> Result<LirCode, LirError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(LirCode {
            constants: self.constants.into(),
            bytes: self.writer.finish().into(),
            argument_count: self.argument_count,
            instruction_count: self.instruction_count,
            positions: self.positions.into(),
            try_catch: TryCatchTable {
                handlers: self.try_catch,
            },
        })
    }
}
