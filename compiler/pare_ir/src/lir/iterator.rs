//! Decoding the LIR instruction stream.

use smallvec::SmallVec;

use crate::ir::{BinopKind, IfKind, IfType, InvokeKind, NumericType};

use super::encoding::{read_uleb, unzigzag};
use super::{opcodes, LirCode, LirError};

/// A raw instruction: opcode plus undecoded operand bytes.
#[derive(Clone, Copy, Debug)]
pub struct LirInstructionView<'a> {
    /// Instruction index within the method.
    pub index: u32,
    /// Value index of this instruction (`argument_count + index`).
    pub value_index: u32,
    /// Byte offset of the opcode.
    pub offset: usize,
    pub opcode: u8,
    pub operands: &'a [u8],
}

/// A decoded instruction. Value operands are absolute value indices,
/// constant operands are pool indices and block operands are block start
/// instruction indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LirInstruction {
    ConstNull,
    ConstInt(i32),
    ConstLong(i64),
    /// String, type, method handle or prototype constant.
    Ldc(u32),
    NewInstance(u32),
    NewArray {
        ty: u32,
        size: u32,
    },
    NewUnboxedEnum {
        ty: u32,
        ordinal: i32,
    },
    ArrayGet {
        ty: u32,
        array: u32,
        index: u32,
    },
    ArrayPut {
        array: u32,
        index: u32,
        value: u32,
    },
    ArrayLength(u32),
    StaticGet(u32),
    StaticPut {
        field: u32,
        value: u32,
    },
    InstanceGet {
        field: u32,
        object: u32,
    },
    InstancePut {
        field: u32,
        object: u32,
        value: u32,
    },
    Invoke {
        kind: InvokeKind,
        is_interface: bool,
        method: u32,
        args: SmallVec<[u32; 4]>,
    },
    InvokeCustom {
        call_site: u32,
        args: SmallVec<[u32; 4]>,
    },
    CheckCast {
        ty: u32,
        value: u32,
    },
    InstanceOf {
        ty: u32,
        value: u32,
    },
    Binop {
        op: BinopKind,
        ty: NumericType,
        lhs: u32,
        rhs: u32,
    },
    DebugPosition,
    Goto(u32),
    Fallthrough,
    If {
        kind: IfKind,
        ty: IfType,
        target: u32,
        lhs: u32,
        rhs: Option<u32>,
    },
    Return(Option<u32>),
    Throw(u32),
    Phi {
        ty: u32,
        operands: SmallVec<[u32; 4]>,
    },
}

impl LirInstruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            LirInstruction::Goto(_)
                | LirInstruction::Fallthrough
                | LirInstruction::If { .. }
                | LirInstruction::Return(_)
                | LirInstruction::Throw(_)
        )
    }
}

struct OperandReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base_offset: usize,
    current_value: i64,
}

impl OperandReader<'_> {
    fn has_more(&self) -> bool {
        self.pos < self.bytes.len()
    }

    fn uleb(&mut self) -> Result<u64, LirError> {
        read_uleb(self.bytes, &mut self.pos)
            .map_err(|_| LirError::Truncated(self.base_offset + self.pos))
    }

    fn u32(&mut self) -> Result<u32, LirError> {
        let at = self.base_offset + self.pos;
        let raw = self.uleb()?;
        u32::try_from(raw).map_err(|_| LirError::Truncated(at))
    }

    fn constant(&mut self) -> Result<u32, LirError> {
        self.u32()
    }

    fn block(&mut self) -> Result<u32, LirError> {
        self.u32()
    }

    fn long(&mut self) -> Result<i64, LirError> {
        self.uleb().map(unzigzag)
    }

    fn int(&mut self) -> Result<i32, LirError> {
        let at = self.base_offset + self.pos;
        let v = self.long()?;
        i32::try_from(v).map_err(|_| LirError::Truncated(at))
    }

    fn value(&mut self) -> Result<u32, LirError> {
        let distance = self.long()?;
        let index = self.current_value - distance;
        u32::try_from(index).map_err(|_| LirError::ValueIndex(index))
    }

    fn values(&mut self) -> Result<SmallVec<[u32; 4]>, LirError> {
        let mut out = SmallVec::new();
        while self.has_more() {
            out.push(self.value()?);
        }
        Ok(out)
    }
}

impl LirInstructionView<'_> {
    /// Decode operands into a [`LirInstruction`].
    pub fn decode(&self) -> Result<LirInstruction, LirError> {
        use LirInstruction as I;

        let mut r = OperandReader {
            bytes: self.operands,
            pos: 0,
            base_offset: self.offset + 2,
            current_value: i64::from(self.value_index),
        };
        let insn = match self.opcode {
            opcodes::ACONST_NULL => I::ConstNull,
            op @ opcodes::ICONST_0..=opcodes::ICONST_5 => I::ConstInt(i32::from(op - opcodes::ICONST_0)),
            opcodes::RETURN => I::Return(None),
            opcodes::DEBUGPOS => I::DebugPosition,
            opcodes::FALLTHROUGH => I::Fallthrough,
            opcodes::ICONST => I::ConstInt(r.int()?),
            opcodes::LCONST => I::ConstLong(r.long()?),
            opcodes::LDC => I::Ldc(r.constant()?),
            opcodes::NEW => I::NewInstance(r.constant()?),
            opcodes::NEWARRAY => I::NewArray {
                ty: r.constant()?,
                size: r.value()?,
            },
            opcodes::NEWUNBOXEDENUM => I::NewUnboxedEnum {
                ty: r.constant()?,
                ordinal: r.int()?,
            },
            opcodes::ARRAYGET => I::ArrayGet {
                ty: r.constant()?,
                array: r.value()?,
                index: r.value()?,
            },
            opcodes::ARRAYPUT => I::ArrayPut {
                array: r.value()?,
                index: r.value()?,
                value: r.value()?,
            },
            opcodes::ARRAYLENGTH => I::ArrayLength(r.value()?),
            opcodes::GETSTATIC => I::StaticGet(r.constant()?),
            opcodes::PUTSTATIC => I::StaticPut {
                field: r.constant()?,
                value: r.value()?,
            },
            opcodes::GETFIELD => I::InstanceGet {
                field: r.constant()?,
                object: r.value()?,
            },
            opcodes::PUTFIELD => I::InstancePut {
                field: r.constant()?,
                object: r.value()?,
                value: r.value()?,
            },
            opcodes::INVOKECUSTOM => I::InvokeCustom {
                call_site: r.constant()?,
                args: r.values()?,
            },
            opcodes::CHECKCAST => I::CheckCast {
                ty: r.constant()?,
                value: r.value()?,
            },
            opcodes::INSTANCEOF => I::InstanceOf {
                ty: r.constant()?,
                value: r.value()?,
            },
            opcodes::GOTO => I::Goto(r.block()?),
            opcodes::RETURN_VALUE => I::Return(Some(r.value()?)),
            opcodes::THROW => I::Throw(r.value()?),
            opcodes::PHI => I::Phi {
                ty: r.constant()?,
                operands: r.values()?,
            },
            op => {
                if let Some((kind, is_interface)) = opcodes::decode_invoke(op) {
                    I::Invoke {
                        kind,
                        is_interface,
                        method: r.constant()?,
                        args: r.values()?,
                    }
                } else if let Some((binop, ty)) = opcodes::decode_binop(op) {
                    I::Binop {
                        op: binop,
                        ty,
                        lhs: r.value()?,
                        rhs: r.value()?,
                    }
                } else if let Some((kind, ty, has_rhs)) = opcodes::decode_if(op) {
                    let target = r.block()?;
                    let lhs = r.value()?;
                    let rhs = if has_rhs { Some(r.value()?) } else { None };
                    I::If {
                        kind,
                        ty,
                        target,
                        lhs,
                        rhs,
                    }
                } else {
                    return Err(LirError::UnknownOpcode {
                        opcode: op,
                        offset: self.offset,
                    });
                }
            }
        };
        if r.has_more() {
            return Err(LirError::Truncated(r.base_offset + r.pos));
        }
        Ok(insn)
    }
}

/// Iterates the raw instructions of a [`LirCode`].
pub struct LirIterator<'a> {
    bytes: &'a [u8],
    argument_count: u32,
    offset: usize,
    index: u32,
    failed: bool,
}

impl<'a> LirIterator<'a> {
    pub fn new(code: &'a LirCode) -> Self {
        LirIterator {
            bytes: code.bytes(),
            argument_count: code.argument_count(),
            offset: 0,
            index: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for LirIterator<'a> {
    type Item = Result<LirInstructionView<'a>, LirError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        let offset = self.offset;
        let opcode = self.bytes[offset];
        let operands: &'a [u8] = if opcodes::is_one_byte(opcode) {
            self.offset += 1;
            &[]
        } else {
            let Some(&len) = self.bytes.get(offset + 1) else {
                self.failed = true;
                return Some(Err(LirError::Truncated(offset + 1)));
            };
            let start = offset + 2;
            let end = start + usize::from(len);
            let Some(operands) = self.bytes.get(start..end) else {
                self.failed = true;
                return Some(Err(LirError::Truncated(self.bytes.len())));
            };
            self.offset = end;
            operands
        };
        let view = LirInstructionView {
            index: self.index,
            value_index: self.argument_count + self.index,
            offset,
            opcode,
            operands,
        };
        self.index += 1;
        Some(Ok(view))
    }
}
