//! Body access shared by the analyses.

use pare_ir::ir::{IrCode, Op, ValueId};
use pare_ir::lir::lir_to_ir;
use pare_ir::program::{InitializerValue, StaticValue};
use pare_ir::{Code, ProgramMethod};
use rustc_hash::FxHashMap;

use crate::error::EnumError;

/// The body of `method` as IR, in terms of its current signature.
pub(crate) fn decode(method: &ProgramMethod) -> Result<Option<IrCode>, EnumError> {
    match &method.code {
        None => Ok(None),
        Some(Code::Ir(ir)) => Ok(Some((**ir).clone())),
        Some(Code::Lir(lir)) => lir_to_ir(
            lir,
            method.reference.clone(),
            method.is_static(),
            &method.argument_types(),
        )
        .map(Some)
        .map_err(|source| EnumError::Decode {
            method: method.reference.clone(),
            source,
        }),
    }
}

/// The defining operation of every instruction-defined value.
pub(crate) struct Definitions<'a> {
    ops: FxHashMap<ValueId, &'a Op>,
}

impl<'a> Definitions<'a> {
    pub(crate) fn new(code: &'a IrCode) -> Self {
        let ops = code
            .instructions()
            .filter_map(|(_, insn)| insn.dest.map(|dest| (dest, &insn.op)))
            .collect();
        Definitions { ops }
    }

    pub(crate) fn op(&self, value: ValueId) -> Option<&'a Op> {
        self.ops.get(&value).copied()
    }

    pub(crate) fn constant(&self, value: ValueId) -> Option<StaticValue> {
        match self.op(value)? {
            Op::ConstInt(v) => Some(StaticValue::Int(i64::from(*v))),
            Op::ConstLong(v) => Some(StaticValue::Int(*v)),
            Op::ConstString(s) => Some(StaticValue::String(*s)),
            Op::ConstNull => Some(StaticValue::Null),
            _ => None,
        }
    }

    pub(crate) fn is_null(&self, value: ValueId) -> bool {
        matches!(self.op(value), Some(Op::ConstNull))
    }

    /// The value an initializer argument or constant stands for at a call
    /// passing `args`.
    pub(crate) fn resolve(&self, value: InitializerValue, args: &[ValueId]) -> Option<StaticValue> {
        match value {
            InitializerValue::Argument(i) => self.constant(*args.get(i as usize)?),
            InitializerValue::ConstantInt(v) => Some(StaticValue::Int(v)),
            InitializerValue::ConstantString(s) => Some(StaticValue::String(s)),
            InitializerValue::Null => Some(StaticValue::Null),
        }
    }
}
