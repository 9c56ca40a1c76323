//! SSA IR: the form in which method bodies are analyzed and rewritten.
//!
//! # Architecture
//!
//! - **[`IrCode`]**: a method body. Owns the value arena and the block list.
//! - **[`Block`]**: phis, straight-line instructions, one terminator and the
//!   block's exceptional successors.
//! - **[`Op`]**: the operation of an [`Instruction`].
//! - **[`Terminator`]**: block exit.
//!
//! Values live in an arena indexed by [`ValueId`]; every value records its
//! type and how it is defined. The block list is in layout order: the entry
//! block comes first and an [`Terminator::If`] falls through to the next
//! block in the list.
//!
//! Predecessor lists are derived, not stored. [`IrCode::predecessors`]
//! computes them in a canonical order (layout order of the predecessor,
//! normal successors before exceptional ones), and phi operand `i` always
//! belongs to predecessor `i` in that order. Both the LIR decoder and every
//! rewrite rely on that contract.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{CallSite, FieldRef, MethodHandle, MethodRef, Name, Proto, TypeRef};

mod builder;

pub use builder::IrBuilder;

// ── ID newtypes ─────────────────────────────────────────────────────

/// SSA value within one [`IrCode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block within one [`IrCode`]; also its position in layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source position attached to instructions. Line 0 means "none".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
}

impl Position {
    pub const NONE: Position = Position { line: 0 };

    pub fn line(line: u32) -> Self {
        Position { line }
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// How a value is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Method argument at this index (receiver is 0 for instance methods).
    Argument(u32),
    Instruction,
    Phi,
    /// Referenced before its definition was seen; only exists while a
    /// decoder is still building the body.
    Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueData {
    pub ty: TypeRef,
    pub def: ValueDef,
}

// ── Operations ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    /// Non-virtual instance call: constructors and private methods.
    Direct,
    Super,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericType {
    Int,
    Long,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinopKind {
    pub const ALL: [BinopKind; 11] = [
        BinopKind::Add,
        BinopKind::Sub,
        BinopKind::Mul,
        BinopKind::Div,
        BinopKind::Rem,
        BinopKind::And,
        BinopKind::Or,
        BinopKind::Xor,
        BinopKind::Shl,
        BinopKind::Shr,
        BinopKind::Ushr,
    ];

    /// Position in [`BinopKind::ALL`].
    pub fn ordinal(self) -> u8 {
        match self {
            BinopKind::Add => 0,
            BinopKind::Sub => 1,
            BinopKind::Mul => 2,
            BinopKind::Div => 3,
            BinopKind::Rem => 4,
            BinopKind::And => 5,
            BinopKind::Or => 6,
            BinopKind::Xor => 7,
            BinopKind::Shl => 8,
            BinopKind::Shr => 9,
            BinopKind::Ushr => 10,
        }
    }
}

/// An instruction's operation. Operand values appear in read positions only;
/// the defined value lives in [`Instruction::dest`].
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    ConstNull,
    /// Also used for `boolean`, `char`, `byte` and `short` constants.
    ConstInt(i32),
    ConstLong(i64),
    ConstString(Name),
    ConstClass(TypeRef),
    ConstMethodHandle(MethodHandle),
    ConstMethodType(Proto),

    NewInstance(TypeRef),
    NewArray {
        ty: TypeRef,
        size: ValueId,
    },
    /// Placeholder for an enum instance whose class is being unboxed.
    /// Replaced by an integer constant before the method is emitted.
    NewUnboxedEnumInstance {
        ty: TypeRef,
        ordinal: i32,
    },

    ArrayGet {
        /// Element type being read.
        ty: TypeRef,
        array: ValueId,
        index: ValueId,
    },
    ArrayPut {
        array: ValueId,
        index: ValueId,
        value: ValueId,
    },
    ArrayLength(ValueId),

    StaticGet(FieldRef),
    StaticPut {
        field: FieldRef,
        value: ValueId,
    },
    InstanceGet {
        field: FieldRef,
        object: ValueId,
    },
    InstancePut {
        field: FieldRef,
        object: ValueId,
        value: ValueId,
    },

    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        /// Receiver first for instance calls.
        args: Vec<ValueId>,
        is_interface: bool,
    },
    InvokeCustom {
        call_site: Arc<CallSite>,
        args: Vec<ValueId>,
    },

    CheckCast {
        value: ValueId,
        ty: TypeRef,
    },
    InstanceOf {
        value: ValueId,
        ty: TypeRef,
    },
    Binop {
        op: BinopKind,
        ty: NumericType,
        lhs: ValueId,
        rhs: ValueId,
    },

    /// Materializes the current position; no runtime effect.
    DebugPosition,
}

impl Op {
    /// Values read by this operation, in operand order.
    pub fn used_values(&self) -> SmallVec<[ValueId; 4]> {
        let mut used = SmallVec::new();
        match self {
            Op::ConstNull
            | Op::ConstInt(_)
            | Op::ConstLong(_)
            | Op::ConstString(_)
            | Op::ConstClass(_)
            | Op::ConstMethodHandle(_)
            | Op::ConstMethodType(_)
            | Op::NewInstance(_)
            | Op::NewUnboxedEnumInstance { .. }
            | Op::StaticGet(_)
            | Op::DebugPosition => {}
            Op::NewArray { size, .. } => used.push(*size),
            Op::ArrayGet { array, index, .. } => {
                used.push(*array);
                used.push(*index);
            }
            Op::ArrayPut {
                array,
                index,
                value,
            } => {
                used.push(*array);
                used.push(*index);
                used.push(*value);
            }
            Op::ArrayLength(array) => used.push(*array),
            Op::StaticPut { value, .. } => used.push(*value),
            Op::InstanceGet { object, .. } => used.push(*object),
            Op::InstancePut { object, value, .. } => {
                used.push(*object);
                used.push(*value);
            }
            Op::Invoke { args, .. } | Op::InvokeCustom { args, .. } => {
                used.extend_from_slice(args);
            }
            Op::CheckCast { value, .. } | Op::InstanceOf { value, .. } => used.push(*value),
            Op::Binop { lhs, rhs, .. } => {
                used.push(*lhs);
                used.push(*rhs);
            }
        }
        used
    }

    /// Visit every operand slot mutably.
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Op::ConstNull
            | Op::ConstInt(_)
            | Op::ConstLong(_)
            | Op::ConstString(_)
            | Op::ConstClass(_)
            | Op::ConstMethodHandle(_)
            | Op::ConstMethodType(_)
            | Op::NewInstance(_)
            | Op::NewUnboxedEnumInstance { .. }
            | Op::StaticGet(_)
            | Op::DebugPosition => {}
            Op::NewArray { size, .. } => f(size),
            Op::ArrayGet { array, index, .. } => {
                f(array);
                f(index);
            }
            Op::ArrayPut {
                array,
                index,
                value,
            } => {
                f(array);
                f(index);
                f(value);
            }
            Op::ArrayLength(array) => f(array),
            Op::StaticPut { value, .. } => f(value),
            Op::InstanceGet { object, .. } => f(object),
            Op::InstancePut { object, value, .. } => {
                f(object);
                f(value);
            }
            Op::Invoke { args, .. } | Op::InvokeCustom { args, .. } => {
                args.iter_mut().for_each(f);
            }
            Op::CheckCast { value, .. } | Op::InstanceOf { value, .. } => f(value),
            Op::Binop { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
        }
    }

    /// Replace all occurrences of `old` in read positions with `new`.
    pub fn substitute_value(&mut self, old: ValueId, new: ValueId) {
        self.for_each_use_mut(|v| {
            if *v == old {
                *v = new;
            }
        });
    }

    /// Operations that can be deleted when their result is unused.
    pub fn is_removable_if_unused(&self) -> bool {
        matches!(
            self,
            Op::ConstNull
                | Op::ConstInt(_)
                | Op::ConstLong(_)
                | Op::ConstString(_)
                | Op::ConstMethodType(_)
                | Op::NewUnboxedEnumInstance { .. }
        )
    }
}

/// One straight-line instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub dest: Option<ValueId>,
    pub op: Op,
    pub position: Position,
}

impl Instruction {
    pub fn new(dest: Option<ValueId>, op: Op, position: Position) -> Self {
        Instruction { dest, op, position }
    }
}

/// A phi; operand `i` flows in from predecessor `i` in canonical order.
#[derive(Clone, Debug, PartialEq)]
pub struct Phi {
    pub dest: ValueId,
    pub operands: Vec<ValueId>,
}

// ── Terminators ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IfKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Operand type of a conditional branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IfType {
    Int,
    /// Reference comparison; only `Eq` and `Ne` are meaningful.
    Object,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Goto(BlockId),
    /// Branch to `target` when `lhs <kind> rhs` holds, where a missing `rhs`
    /// means zero (or null); otherwise fall through to the next block.
    If {
        kind: IfKind,
        ty: IfType,
        lhs: ValueId,
        rhs: Option<ValueId>,
        target: BlockId,
    },
    Return(Option<ValueId>),
    Throw(ValueId),
}

impl Terminator {
    pub fn used_values(&self) -> SmallVec<[ValueId; 2]> {
        let mut used = SmallVec::new();
        match self {
            Terminator::Goto(_) | Terminator::Return(None) => {}
            Terminator::If { lhs, rhs, .. } => {
                used.push(*lhs);
                used.extend(rhs.iter().copied());
            }
            Terminator::Return(Some(v)) | Terminator::Throw(v) => used.push(*v),
        }
        used
    }

    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Terminator::Goto(_) | Terminator::Return(None) => {}
            Terminator::If { lhs, rhs, .. } => {
                f(lhs);
                if let Some(rhs) = rhs {
                    f(rhs);
                }
            }
            Terminator::Return(Some(v)) | Terminator::Throw(v) => f(v),
        }
    }

    /// Normal successors of a terminator in block `at`.
    pub fn successors(&self, at: BlockId) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Goto(target) => smallvec::smallvec![*target],
            Terminator::If { target, .. } => {
                let fallthrough = BlockId::new(at.raw() + 1);
                if *target == fallthrough {
                    smallvec::smallvec![fallthrough]
                } else {
                    smallvec::smallvec![*target, fallthrough]
                }
            }
            Terminator::Return(_) | Terminator::Throw(_) => SmallVec::new(),
        }
    }

    pub fn map_targets(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Goto(target) | Terminator::If { target, .. } => *target = f(*target),
            Terminator::Return(_) | Terminator::Throw(_) => {}
        }
    }
}

/// Exceptional edge: exceptions of `guard` type raised in the block go to `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchHandler {
    pub guard: TypeRef,
    pub target: BlockId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub phis: Vec<Phi>,
    pub body: Vec<Instruction>,
    pub terminator: Terminator,
    pub terminator_position: Position,
    pub catch_handlers: Vec<CatchHandler>,
}

impl Block {
    pub fn new(terminator: Terminator) -> Self {
        Block {
            phis: Vec::new(),
            body: Vec::new(),
            terminator,
            terminator_position: Position::NONE,
            catch_handlers: Vec::new(),
        }
    }
}

// ── Code ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IrError {
    #[error("block {block} targets missing block {target}")]
    MissingBlock { block: u32, target: u32 },
    #[error("block {block} has a phi with {operands} operands but {predecessors} predecessors")]
    PhiArity {
        block: u32,
        operands: usize,
        predecessors: usize,
    },
    #[error("the entry block must not have predecessors")]
    EntryHasPredecessors,
    #[error("conditional branch in the last block has no fallthrough")]
    MissingFallthrough,
    #[error("value v{0} is used but never defined")]
    UndefinedValue(u32),
    #[error("block {0} was never terminated")]
    UnterminatedBlock(u32),
}

/// An SSA method body.
#[derive(Clone, Debug, PartialEq)]
pub struct IrCode {
    /// The method this body belongs to, in the signature the body was built for.
    pub method: MethodRef,
    pub is_static: bool,
    pub arguments: Vec<ValueId>,
    pub blocks: Vec<Block>,
    pub values: Vec<ValueData>,
}

impl IrCode {
    /// Empty body with argument values typed after `method`'s signature.
    pub fn new(method: MethodRef, is_static: bool) -> Self {
        let argument_types = method.argument_types(is_static);
        Self::with_argument_types(method, is_static, &argument_types)
    }

    /// Empty body with explicitly typed arguments.
    pub fn with_argument_types(
        method: MethodRef,
        is_static: bool,
        argument_types: &[TypeRef],
    ) -> Self {
        let mut code = IrCode {
            method,
            is_static,
            arguments: Vec::with_capacity(argument_types.len()),
            blocks: Vec::new(),
            values: Vec::new(),
        };
        for (i, &ty) in argument_types.iter().enumerate() {
            let index = u32::try_from(i).unwrap_or_else(|_| panic!("argument count overflow"));
            let value = code.new_value(ty, ValueDef::Argument(index));
            code.arguments.push(value);
        }
        code
    }

    /// Allocate a fresh value.
    pub fn new_value(&mut self, ty: TypeRef, def: ValueDef) -> ValueId {
        let id = ValueId::new(
            u32::try_from(self.values.len()).unwrap_or_else(|_| panic!("value count overflow")),
        );
        self.values.push(ValueData { ty, def });
        id
    }

    #[inline]
    pub fn value_type(&self, value: ValueId) -> TypeRef {
        self.values[value.index()].ty
    }

    #[inline]
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(|i| BlockId::new(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Normal successors followed by exception handler targets, without duplicates.
    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 4]> {
        let block = self.block(id);
        let mut out: SmallVec<[BlockId; 4]> = SmallVec::new();
        let handlers = block.catch_handlers.iter().map(|h| h.target);
        for succ in block.terminator.successors(id).into_iter().chain(handlers) {
            if !out.contains(&succ) {
                out.push(succ);
            }
        }
        out
    }

    /// Predecessor lists in canonical order.
    pub fn predecessors(&self) -> Vec<SmallVec<[BlockId; 4]>> {
        let mut preds = vec![SmallVec::new(); self.blocks.len()];
        for id in self.block_ids() {
            for succ in self.successors(id) {
                if let Some(list) = preds.get_mut(succ.index()) {
                    list.push(id);
                }
            }
        }
        preds
    }

    /// Every straight-line instruction with its block.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, &Instruction)> {
        self.block_ids()
            .zip(self.blocks.iter())
            .flat_map(|(id, block)| block.body.iter().map(move |insn| (id, insn)))
    }

    /// Number of reads of each value (phis, instructions and terminators).
    pub fn use_counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.values.len()];
        for block in &self.blocks {
            for phi in &block.phis {
                for v in &phi.operands {
                    counts[v.index()] += 1;
                }
            }
            for insn in &block.body {
                for v in insn.op.used_values() {
                    counts[v.index()] += 1;
                }
            }
            for v in block.terminator.used_values() {
                counts[v.index()] += 1;
            }
        }
        counts
    }

    /// Instructions reading `value`, as (block, body index) pairs in layout order.
    pub fn users(&self, value: ValueId) -> Vec<(BlockId, usize)> {
        let mut out = Vec::new();
        for (id, block) in self.block_ids().zip(self.blocks.iter()) {
            for (i, insn) in block.body.iter().enumerate() {
                if insn.op.used_values().contains(&value) {
                    out.push((id, i));
                }
            }
        }
        out
    }

    /// Replace every read of `old` with `new`.
    pub fn replace_uses(&mut self, old: ValueId, new: ValueId) {
        for block in &mut self.blocks {
            for phi in &mut block.phis {
                for v in &mut phi.operands {
                    if *v == old {
                        *v = new;
                    }
                }
            }
            for insn in &mut block.body {
                insn.op.substitute_value(old, new);
            }
            block.terminator.for_each_use_mut(|v| {
                if *v == old {
                    *v = new;
                }
            });
        }
    }

    /// Drop blocks unreachable from the entry, trimming phi operands of the
    /// survivors. Returns whether anything was removed.
    pub fn remove_unreachable_blocks(&mut self) -> bool {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![BlockId::ENTRY];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id.index()], true) {
                continue;
            }
            stack.extend(
                self.successors(id)
                    .into_iter()
                    .filter(|s| !reachable[s.index()]),
            );
        }
        if reachable.iter().all(|&r| r) {
            return false;
        }

        let preds = self.predecessors();
        let mut remap = vec![None; self.blocks.len()];
        let mut next = 0u32;
        for (i, &live) in reachable.iter().enumerate() {
            if live {
                remap[i] = Some(BlockId::new(next));
                next += 1;
            }
        }

        let old_blocks = std::mem::take(&mut self.blocks);
        for (i, mut block) in old_blocks.into_iter().enumerate() {
            if !reachable[i] {
                continue;
            }
            let keep: SmallVec<[bool; 4]> =
                preds[i].iter().map(|p| reachable[p.index()]).collect();
            for phi in &mut block.phis {
                let mut k = keep.iter();
                phi.operands.retain(|_| k.next().copied().unwrap_or(true));
            }
            block
                .terminator
                .map_targets(|t| remap[t.index()].unwrap_or(t));
            for handler in &mut block.catch_handlers {
                handler.target = remap[handler.target.index()].unwrap_or(handler.target);
            }
            self.blocks.push(block);
        }
        true
    }

    /// Delete unused side-effect-free instructions and phis until nothing
    /// changes. Returns the number removed.
    pub fn remove_dead_instructions(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let counts = self.use_counts();
            let dead = |v: ValueId| counts[v.index()] == 0;
            let mut round = 0;
            for block in &mut self.blocks {
                let before = block.phis.len() + block.body.len();
                block.phis.retain(|phi| !dead(phi.dest));
                block.body.retain(|insn| match insn.dest {
                    Some(dest) => !(dead(dest) && insn.op.is_removable_if_unused()),
                    None => true,
                });
                round += before - (block.phis.len() + block.body.len());
            }
            if round == 0 {
                return removed;
            }
            removed += round;
        }
    }

    /// Check structural well-formedness.
    pub fn verify(&self) -> Result<(), IrError> {
        let n = self.blocks.len();
        for id in self.block_ids() {
            let block = self.block(id);
            let targets = block
                .terminator
                .successors(id)
                .into_iter()
                .chain(block.catch_handlers.iter().map(|h| h.target));
            for target in targets {
                if target.index() >= n {
                    if matches!(block.terminator, Terminator::If { .. })
                        && target.raw() == id.raw() + 1
                    {
                        return Err(IrError::MissingFallthrough);
                    }
                    return Err(IrError::MissingBlock {
                        block: id.raw(),
                        target: target.raw(),
                    });
                }
            }
        }

        let preds = self.predecessors();
        if preds.first().is_some_and(|p| !p.is_empty()) {
            return Err(IrError::EntryHasPredecessors);
        }
        for (i, block) in self.blocks.iter().enumerate() {
            for phi in &block.phis {
                if phi.operands.len() != preds[i].len() {
                    return Err(IrError::PhiArity {
                        block: u32::try_from(i).unwrap_or(u32::MAX),
                        operands: phi.operands.len(),
                        predecessors: preds[i].len(),
                    });
                }
            }
        }

        let mut defined = vec![false; self.values.len()];
        for &arg in &self.arguments {
            defined[arg.index()] = true;
        }
        for block in &self.blocks {
            for phi in &block.phis {
                defined[phi.dest.index()] = true;
            }
            for dest in block.body.iter().filter_map(|insn| insn.dest) {
                defined[dest.index()] = true;
            }
        }
        let counts = self.use_counts();
        for (i, (&def, &uses)) in defined.iter().zip(counts.iter()).enumerate() {
            let unresolved = self.values[i].def == ValueDef::Unresolved;
            if uses > 0 && (!def || unresolved) {
                return Err(IrError::UndefinedValue(
                    u32::try_from(i).unwrap_or(u32::MAX),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
