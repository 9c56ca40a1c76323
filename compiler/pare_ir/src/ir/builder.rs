//! Incremental construction of [`IrCode`] for synthesized method bodies.

use crate::types::known;
use crate::{FieldRef, MethodRef, Name, TypeRef};

use super::{
    Block, BlockId, CatchHandler, Instruction, InvokeKind, IrCode, IrError, Op, Phi, Position,
    Terminator, ValueDef, ValueId,
};

struct PendingBlock {
    phis: Vec<Phi>,
    body: Vec<Instruction>,
    terminator: Option<(Terminator, Position)>,
    catch_handlers: Vec<CatchHandler>,
}

impl PendingBlock {
    fn new() -> Self {
        PendingBlock {
            phis: Vec::new(),
            body: Vec::new(),
            terminator: None,
            catch_handlers: Vec::new(),
        }
    }
}

/// Builds a method body block by block.
///
/// Blocks are laid out in creation order, so a conditional branch's
/// fallthrough is whichever block was created right after the branching one.
pub struct IrBuilder {
    code: IrCode,
    blocks: Vec<PendingBlock>,
    current: BlockId,
    position: Position,
}

impl IrBuilder {
    /// Start a body for `method`; the entry block is current.
    pub fn new(method: MethodRef, is_static: bool) -> Self {
        IrBuilder {
            code: IrCode::new(method, is_static),
            blocks: vec![PendingBlock::new()],
            current: BlockId::ENTRY,
            position: Position::NONE,
        }
    }

    pub fn arguments(&self) -> &[ValueId] {
        &self.code.arguments
    }

    pub fn argument(&self, index: usize) -> ValueId {
        self.code.arguments[index]
    }

    pub fn value_type(&self, value: ValueId) -> TypeRef {
        self.code.value_type(value)
    }

    /// Append a new, empty block to the layout.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len()).unwrap_or_else(|_| panic!("block count overflow")),
        );
        self.blocks.push(PendingBlock::new());
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    fn current_block(&mut self) -> &mut PendingBlock {
        &mut self.blocks[self.current.index()]
    }

    /// Emit an instruction without a result.
    pub fn emit(&mut self, op: Op) {
        let position = self.position;
        self.current_block()
            .body
            .push(Instruction::new(None, op, position));
    }

    /// Emit an instruction whose result has type `ty`.
    pub fn emit_value(&mut self, op: Op, ty: TypeRef) -> ValueId {
        let dest = self.code.new_value(ty, ValueDef::Instruction);
        let position = self.position;
        self.current_block()
            .body
            .push(Instruction::new(Some(dest), op, position));
        dest
    }

    pub fn phi(&mut self, ty: TypeRef, operands: Vec<ValueId>) -> ValueId {
        let dest = self.code.new_value(ty, ValueDef::Phi);
        self.current_block().phis.push(Phi { dest, operands });
        dest
    }

    pub fn add_catch_handler(&mut self, guard: TypeRef, target: BlockId) {
        self.current_block()
            .catch_handlers
            .push(CatchHandler { guard, target });
    }

    pub fn terminate(&mut self, terminator: Terminator) {
        let position = self.position;
        self.current_block().terminator = Some((terminator, position));
    }

    // ── Shorthands ──────────────────────────────────────────────

    pub fn const_int(&mut self, value: i32) -> ValueId {
        self.emit_value(Op::ConstInt(value), known::int())
    }

    pub fn const_null(&mut self) -> ValueId {
        self.emit_value(Op::ConstNull, known::object())
    }

    pub fn const_string(&mut self, value: Name) -> ValueId {
        self.emit_value(Op::ConstString(value), known::string())
    }

    /// Emit a call; the result value exists iff the callee returns a value.
    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        method: MethodRef,
        args: Vec<ValueId>,
    ) -> Option<ValueId> {
        let return_type = method.proto.return_type;
        let op = Op::Invoke {
            kind,
            method,
            args,
            is_interface: kind == InvokeKind::Interface,
        };
        if return_type.is_void() {
            self.emit(op);
            None
        } else {
            Some(self.emit_value(op, return_type))
        }
    }

    pub fn static_get(&mut self, field: FieldRef) -> ValueId {
        self.emit_value(Op::StaticGet(field), field.ty)
    }

    pub fn instance_get(&mut self, field: FieldRef, object: ValueId) -> ValueId {
        self.emit_value(Op::InstanceGet { field, object }, field.ty)
    }

    pub fn instance_put(&mut self, field: FieldRef, object: ValueId, value: ValueId) {
        self.emit(Op::InstancePut {
            field,
            object,
            value,
        });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Return(value));
    }

    /// Finish the body, checking that every block was terminated and that
    /// the result is well formed.
    pub fn finish(self) -> Result<IrCode, IrError> {
        let IrBuilder {
            mut code, blocks, ..
        } = self;
        for (i, pending) in blocks.into_iter().enumerate() {
            let Some((terminator, terminator_position)) = pending.terminator else {
                return Err(IrError::UnterminatedBlock(
                    u32::try_from(i).unwrap_or(u32::MAX),
                ));
            };
            code.blocks.push(Block {
                phis: pending.phis,
                body: pending.body,
                terminator,
                terminator_position,
                catch_handlers: pending.catch_handlers,
            });
        }
        code.verify()?;
        Ok(code)
    }
}
