//! LIR: the compact, immutable encoding methods are stored in between passes.
//!
//! # Wire format
//!
//! A method body is a byte stream of instructions plus side tables:
//!
//! - Opcodes below [`opcodes::FIRST_OPERAND_OPCODE`] take no operands and
//!   are a single byte.
//! - Every other instruction is `[opcode][operand length: u8][operands]`.
//!   Bodies whose instructions need more than 255 operand bytes cannot be
//!   encoded; see [`LirError::OperandsTooLarge`].
//! - Constant-pool and block operands are unsigned LEB128. Literal integers
//!   are zigzag-encoded LEB128.
//! - A value operand is the zigzag-encoded distance from the current
//!   instruction's value index back to the referenced value. Arguments take
//!   value indices `0..argument_count`; the instruction at index `i` has
//!   value index `argument_count + i`, whether or not it produces a value.
//! - Phis are ordinary instructions: a type constant followed by their
//!   operands, in canonical predecessor order.
//! - A block is addressed by the instruction index of its first instruction.
//!   The entry block starts at instruction 0.
//!
//! Side tables: the deduplicated constant pool, the position table (an
//! entry is recorded whenever the position changes) and the try/catch table
//! keyed by block start index.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ir::{IrError, Position};
use crate::{CallSite, FieldRef, MethodHandle, MethodRef, Name, Proto, TypeRef};

mod builder;
mod encoding;
mod ir_to_lir;
mod iterator;
mod lir_to_ir;
pub mod opcodes;
mod writer;

pub use builder::LirBuilder;
pub use ir_to_lir::ir_to_lir;
pub use iterator::{LirInstruction, LirInstructionView, LirIterator};
pub use lir_to_ir::lir_to_ir;
pub use writer::LirWriter;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LirError {
    #[error("instruction operands take {0} bytes, more than the 255-byte limit")]
    OperandsTooLarge(usize),
    #[error("instruction stream truncated at byte {0}")]
    Truncated(usize),
    #[error("unknown opcode {opcode:#04x} at byte {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("constant {index} is not a {expected} constant")]
    ConstantKind { index: u32, expected: &'static str },
    #[error("constant index {0} is out of range")]
    ConstantIndex(u32),
    #[error("value index {0} is out of range")]
    ValueIndex(i64),
    #[error("block target {0} does not start a block")]
    BlockTarget(u32),
    #[error("instruction {0} is a jump target in the middle of a block")]
    MalformedBlock(u32),
    #[error("value v{0} is referenced but never defined")]
    UnresolvedValue(u32),
    #[error("{kind:?} branches cannot compare references")]
    UnsupportedBranch { kind: crate::ir::IfKind },
    #[error("code has {actual} arguments but {expected} argument types were given")]
    ArgumentCount { expected: usize, actual: usize },
    #[error(transparent)]
    Ir(#[from] IrError),
}

// ── Constants and side tables ───────────────────────────────────────

/// A constant-pool entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LirConstant {
    Type(TypeRef),
    Field(FieldRef),
    Method(MethodRef),
    String(Name),
    Proto(Proto),
    MethodHandle(MethodHandle),
    CallSite(Arc<CallSite>),
}

/// Position in effect from `from_instruction` until the next entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionEntry {
    pub from_instruction: u32,
    pub position: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LirCatchHandler {
    pub guard: TypeRef,
    /// Start index of the handler block.
    pub target: u32,
}

/// Exceptional edges keyed by the start index of the guarded block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TryCatchTable {
    pub handlers: BTreeMap<u32, Vec<LirCatchHandler>>,
}

impl TryCatchTable {
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn guards(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.handlers.values().flatten().map(|h| h.guard)
    }
}

// ── Code ────────────────────────────────────────────────────────────

/// An encoded method body. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LirCode {
    constants: Arc<[LirConstant]>,
    bytes: Arc<[u8]>,
    argument_count: u32,
    instruction_count: u32,
    positions: Arc<[PositionEntry]>,
    try_catch: TryCatchTable,
}

impl LirCode {
    pub fn constants(&self) -> &[LirConstant] {
        &self.constants
    }

    pub fn constant(&self, index: u32) -> Result<&LirConstant, LirError> {
        self.constants
            .get(index as usize)
            .ok_or(LirError::ConstantIndex(index))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn argument_count(&self) -> u32 {
        self.argument_count
    }

    pub fn instruction_count(&self) -> u32 {
        self.instruction_count
    }

    pub fn positions(&self) -> &[PositionEntry] {
        &self.positions
    }

    pub fn try_catch(&self) -> &TryCatchTable {
        &self.try_catch
    }

    pub fn iter(&self) -> LirIterator<'_> {
        LirIterator::new(self)
    }

    /// Position in effect at an instruction.
    pub fn position_at(&self, instruction: u32) -> Position {
        let idx = self
            .positions
            .partition_point(|e| e.from_instruction <= instruction);
        idx.checked_sub(1)
            .map_or(Position::NONE, |i| self.positions[i].position)
    }

    /// Same instructions over a different constant pool.
    ///
    /// The new pool must resolve every index the instructions use.
    #[must_use]
    pub fn with_constants(&self, constants: Vec<LirConstant>) -> LirCode {
        debug_assert!(constants.len() >= self.constants.len());
        LirCode {
            constants: constants.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_try_catch(&self, try_catch: TryCatchTable) -> LirCode {
        LirCode {
            try_catch,
            ..self.clone()
        }
    }

    /// Same side tables over a re-encoded instruction stream with the same
    /// instruction count.
    #[must_use]
    pub fn with_instructions(&self, bytes: Vec<u8>, constants: Vec<LirConstant>) -> LirCode {
        LirCode {
            bytes: bytes.into(),
            constants: constants.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
