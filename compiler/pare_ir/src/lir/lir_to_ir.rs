//! Decoding LIR into SSA IR in a single pass.
//!
//! Values are created on first mention. A forward reference (a phi operand
//! reaching around a loop back edge) creates an unresolved value that is
//! completed in place when its definition is decoded. Blocks are keyed by
//! their start instruction index while decoding and laid out in index order
//! at the end.

use std::collections::BTreeMap;

use crate::ir::{
    Block, BlockId, CatchHandler, Instruction, IrCode, Op, Phi, Position, Terminator, ValueDef,
    ValueId,
};
use crate::types::known;
use crate::{MethodRef, TypeRef};

use super::{LirCode, LirConstant, LirError, LirInstruction};

struct PendingBlock {
    phis: Vec<Phi>,
    body: Vec<Instruction>,
    terminator: Option<(Terminator, Position)>,
}

impl PendingBlock {
    fn new() -> Self {
        PendingBlock {
            phis: Vec::new(),
            body: Vec::new(),
            terminator: None,
        }
    }
}

struct Parser<'a> {
    lir: &'a LirCode,
    code: IrCode,
    /// Encoded value index to IR value.
    slots: Vec<Option<ValueId>>,
    blocks: BTreeMap<u32, PendingBlock>,
    current: Option<u32>,
}

impl Parser<'_> {
    fn value(&mut self, index: u32) -> Result<ValueId, LirError> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(LirError::ValueIndex(i64::from(index)))?;
        if let Some(v) = *slot {
            return Ok(v);
        }
        let v = self.code.new_value(known::void(), ValueDef::Unresolved);
        *slot = Some(v);
        Ok(v)
    }

    fn values(&mut self, indices: &[u32]) -> Result<Vec<ValueId>, LirError> {
        indices.iter().map(|&i| self.value(i)).collect()
    }

    fn define(&mut self, index: u32, ty: TypeRef, def: ValueDef) -> Result<ValueId, LirError> {
        let v = self.value(index)?;
        let data = &mut self.code.values[v.index()];
        data.ty = ty;
        data.def = def;
        Ok(v)
    }

    fn ensure_block(&mut self, start: u32) -> Result<(), LirError> {
        if start == 0 || start >= self.lir.instruction_count() {
            return Err(LirError::BlockTarget(start));
        }
        self.blocks.entry(start).or_insert_with(PendingBlock::new);
        Ok(())
    }

    fn current_block(&mut self) -> &mut PendingBlock {
        let key = self.current.unwrap_or(0);
        self.blocks.entry(key).or_insert_with(PendingBlock::new)
    }

    fn type_constant(&self, index: u32) -> Result<TypeRef, LirError> {
        match self.lir.constant(index)? {
            LirConstant::Type(ty) => Ok(*ty),
            _ => Err(LirError::ConstantKind {
                index,
                expected: "type",
            }),
        }
    }

    fn field_constant(&self, index: u32) -> Result<crate::FieldRef, LirError> {
        match self.lir.constant(index)? {
            LirConstant::Field(field) => Ok(*field),
            _ => Err(LirError::ConstantKind {
                index,
                expected: "field",
            }),
        }
    }

    fn method_constant(&self, index: u32) -> Result<MethodRef, LirError> {
        match self.lir.constant(index)? {
            LirConstant::Method(method) => Ok(method.clone()),
            _ => Err(LirError::ConstantKind {
                index,
                expected: "method",
            }),
        }
    }

    fn push(
        &mut self,
        value_index: u32,
        op: Op,
        result: Option<TypeRef>,
        position: Position,
    ) -> Result<(), LirError> {
        let dest = match result {
            Some(ty) => Some(self.define(value_index, ty, ValueDef::Instruction)?),
            None => None,
        };
        self.current_block()
            .body
            .push(Instruction::new(dest, op, position));
        Ok(())
    }

    fn terminate(&mut self, terminator: Terminator, position: Position) {
        self.current_block().terminator = Some((terminator, position));
        self.current = None;
    }

    fn instruction(
        &mut self,
        index: u32,
        value_index: u32,
        insn: LirInstruction,
        position: Position,
    ) -> Result<(), LirError> {
        use LirInstruction as I;

        let next = index + 1;
        match insn {
            I::ConstNull => self.push(value_index, Op::ConstNull, Some(known::object()), position),
            I::ConstInt(v) => self.push(value_index, Op::ConstInt(v), Some(known::int()), position),
            I::ConstLong(v) => {
                self.push(value_index, Op::ConstLong(v), Some(known::long()), position)
            }
            I::Ldc(c) => {
                let (op, ty) = match self.lir.constant(c)? {
                    LirConstant::String(s) => (Op::ConstString(*s), known::string()),
                    LirConstant::Type(ty) => (Op::ConstClass(*ty), known::class()),
                    LirConstant::MethodHandle(h) => {
                        (Op::ConstMethodHandle(h.clone()), known::method_handle())
                    }
                    LirConstant::Proto(p) => (Op::ConstMethodType(p.clone()), known::method_type()),
                    _ => {
                        return Err(LirError::ConstantKind {
                            index: c,
                            expected: "loadable",
                        })
                    }
                };
                self.push(value_index, op, Some(ty), position)
            }
            I::NewInstance(c) => {
                let ty = self.type_constant(c)?;
                self.push(value_index, Op::NewInstance(ty), Some(ty), position)
            }
            I::NewArray { ty, size } => {
                let ty = self.type_constant(ty)?;
                let size = self.value(size)?;
                self.push(value_index, Op::NewArray { ty, size }, Some(ty), position)
            }
            I::NewUnboxedEnum { ty, ordinal } => {
                let ty = self.type_constant(ty)?;
                let op = Op::NewUnboxedEnumInstance { ty, ordinal };
                self.push(value_index, op, Some(ty), position)
            }
            I::ArrayGet { ty, array, index } => {
                let ty = self.type_constant(ty)?;
                let op = Op::ArrayGet {
                    ty,
                    array: self.value(array)?,
                    index: self.value(index)?,
                };
                self.push(value_index, op, Some(ty), position)
            }
            I::ArrayPut {
                array,
                index,
                value,
            } => {
                let op = Op::ArrayPut {
                    array: self.value(array)?,
                    index: self.value(index)?,
                    value: self.value(value)?,
                };
                self.push(value_index, op, None, position)
            }
            I::ArrayLength(array) => {
                let op = Op::ArrayLength(self.value(array)?);
                self.push(value_index, op, Some(known::int()), position)
            }
            I::StaticGet(c) => {
                let field = self.field_constant(c)?;
                self.push(value_index, Op::StaticGet(field), Some(field.ty), position)
            }
            I::StaticPut { field, value } => {
                let op = Op::StaticPut {
                    field: self.field_constant(field)?,
                    value: self.value(value)?,
                };
                self.push(value_index, op, None, position)
            }
            I::InstanceGet { field, object } => {
                let field = self.field_constant(field)?;
                let op = Op::InstanceGet {
                    field,
                    object: self.value(object)?,
                };
                self.push(value_index, op, Some(field.ty), position)
            }
            I::InstancePut {
                field,
                object,
                value,
            } => {
                let op = Op::InstancePut {
                    field: self.field_constant(field)?,
                    object: self.value(object)?,
                    value: self.value(value)?,
                };
                self.push(value_index, op, None, position)
            }
            I::Invoke {
                kind,
                is_interface,
                method,
                args,
            } => {
                let method = self.method_constant(method)?;
                let ret = method.proto.return_type;
                let op = Op::Invoke {
                    kind,
                    method,
                    args: self.values(&args)?,
                    is_interface,
                };
                self.push(value_index, op, (!ret.is_void()).then_some(ret), position)
            }
            I::InvokeCustom { call_site, args } => {
                let call_site = match self.lir.constant(call_site)? {
                    LirConstant::CallSite(cs) => std::sync::Arc::clone(cs),
                    _ => {
                        return Err(LirError::ConstantKind {
                            index: call_site,
                            expected: "call site",
                        })
                    }
                };
                let ret = call_site.proto.return_type;
                let op = Op::InvokeCustom {
                    call_site,
                    args: self.values(&args)?,
                };
                self.push(value_index, op, (!ret.is_void()).then_some(ret), position)
            }
            I::CheckCast { ty, value } => {
                let ty = self.type_constant(ty)?;
                let op = Op::CheckCast {
                    value: self.value(value)?,
                    ty,
                };
                self.push(value_index, op, Some(ty), position)
            }
            I::InstanceOf { ty, value } => {
                let ty = self.type_constant(ty)?;
                let op = Op::InstanceOf {
                    value: self.value(value)?,
                    ty,
                };
                self.push(value_index, op, Some(known::boolean()), position)
            }
            I::Binop { op, ty, lhs, rhs } => {
                let result = match ty {
                    crate::ir::NumericType::Int => known::int(),
                    crate::ir::NumericType::Long => known::long(),
                };
                let op = Op::Binop {
                    op,
                    ty,
                    lhs: self.value(lhs)?,
                    rhs: self.value(rhs)?,
                };
                self.push(value_index, op, Some(result), position)
            }
            I::DebugPosition => self.push(value_index, Op::DebugPosition, None, position),
            I::Phi { ty, operands } => {
                let ty = self.type_constant(ty)?;
                let dest = self.define(value_index, ty, ValueDef::Phi)?;
                let operands = self.values(&operands)?;
                self.current_block().phis.push(Phi { dest, operands });
                Ok(())
            }
            I::Goto(target) => {
                self.ensure_block(target)?;
                self.terminate(Terminator::Goto(BlockId::new(target)), position);
                Ok(())
            }
            I::Fallthrough => {
                self.ensure_block(next)?;
                self.terminate(Terminator::Goto(BlockId::new(next)), position);
                Ok(())
            }
            I::If {
                kind,
                ty,
                target,
                lhs,
                rhs,
            } => {
                self.ensure_block(target)?;
                self.ensure_block(next)?;
                let terminator = Terminator::If {
                    kind,
                    ty,
                    lhs: self.value(lhs)?,
                    rhs: rhs.map(|r| self.value(r)).transpose()?,
                    target: BlockId::new(target),
                };
                self.terminate(terminator, position);
                Ok(())
            }
            I::Return(value) => {
                let value = value.map(|v| self.value(v)).transpose()?;
                self.terminate(Terminator::Return(value), position);
                Ok(())
            }
            I::Throw(exception) => {
                let exception = self.value(exception)?;
                self.terminate(Terminator::Throw(exception), position);
                Ok(())
            }
        }
    }

    fn finish(mut self) -> Result<IrCode, LirError> {
        if let Some(start) = self.current {
            return Err(crate::ir::IrError::UnterminatedBlock(start).into());
        }
        // Blocks are laid out by start index; targets were recorded as start
        // indices and are renumbered here.
        let ids: BTreeMap<u32, BlockId> = self
            .blocks
            .keys()
            .zip(0u32..)
            .map(|(&start, id)| (start, BlockId::new(id)))
            .collect();
        let remap = |b: BlockId| -> Result<BlockId, LirError> {
            ids.get(&b.raw()).copied().ok_or(LirError::BlockTarget(b.raw()))
        };

        for (&start, handlers) in &self.lir.try_catch().handlers {
            if !ids.contains_key(&start) {
                return Err(LirError::BlockTarget(start));
            }
            for h in handlers {
                remap(BlockId::new(h.target))?;
            }
        }

        let blocks = std::mem::take(&mut self.blocks);
        for (start, pending) in blocks {
            let Some((mut terminator, terminator_position)) = pending.terminator else {
                return Err(LirError::BlockTarget(start));
            };
            let mut bad_target = None;
            terminator.map_targets(|t| match remap(t) {
                Ok(id) => id,
                Err(_) => {
                    bad_target = Some(t.raw());
                    t
                }
            });
            if let Some(t) = bad_target {
                return Err(LirError::BlockTarget(t));
            }
            let catch_handlers = match self.lir.try_catch().handlers.get(&start) {
                Some(handlers) => handlers
                    .iter()
                    .map(|h| {
                        Ok(CatchHandler {
                            guard: h.guard,
                            target: remap(BlockId::new(h.target))?,
                        })
                    })
                    .collect::<Result<Vec<_>, LirError>>()?,
                None => Vec::new(),
            };
            self.code.blocks.push(Block {
                phis: pending.phis,
                body: pending.body,
                terminator,
                terminator_position,
                catch_handlers,
            });
        }

        if let Some(unresolved) = self
            .code
            .values
            .iter()
            .position(|v| v.def == ValueDef::Unresolved)
        {
            return Err(LirError::UnresolvedValue(
                u32::try_from(unresolved).unwrap_or(u32::MAX),
            ));
        }
        self.code.verify()?;
        Ok(self.code)
    }
}

/// Decode `lir` into IR for `method`.
///
/// `argument_types` types the arguments (receiver first for instance
/// methods) and must match the encoded argument count.
pub fn lir_to_ir(
    lir: &LirCode,
    method: MethodRef,
    is_static: bool,
    argument_types: &[TypeRef],
) -> Result<IrCode, LirError> {
    let argc = lir.argument_count() as usize;
    if argument_types.len() != argc {
        return Err(LirError::ArgumentCount {
            expected: argc,
            actual: argument_types.len(),
        });
    }
    let code = IrCode::with_argument_types(method, is_static, argument_types);
    let mut slots = vec![None; argc + lir.instruction_count() as usize];
    for (slot, &arg) in slots.iter_mut().zip(code.arguments.iter()) {
        *slot = Some(arg);
    }
    let mut parser = Parser {
        lir,
        code,
        slots,
        blocks: BTreeMap::new(),
        current: None,
    };

    let mut next_position = 0usize;
    let mut position = Position::NONE;
    let positions = lir.positions();
    for view in lir.iter() {
        let view = view?;
        let index = view.index;
        while next_position < positions.len() && positions[next_position].from_instruction <= index
        {
            position = positions[next_position].position;
            next_position += 1;
        }
        match parser.current {
            None => {
                parser.current = Some(index);
                parser.blocks.entry(index).or_insert_with(PendingBlock::new);
            }
            Some(start) if start != index && parser.blocks.contains_key(&index) => {
                return Err(LirError::MalformedBlock(index));
            }
            Some(_) => {}
        }
        let insn = view.decode()?;
        parser.instruction(index, view.value_index, insn, position)?;
    }
    if lir.instruction_count() == 0 {
        return Err(crate::ir::IrError::UnterminatedBlock(0).into());
    }
    let code = parser.finish()?;
    tracing::trace!(
        method = %code.method,
        blocks = code.blocks.len(),
        values = code.values.len(),
        "decoded method"
    );
    Ok(code)
}

