//! Encoding SSA IR into LIR.

use crate::ir::{BlockId, IrCode, Op, Terminator, ValueId};

use super::{LirBuilder, LirCatchHandler, LirCode, LirError};

/// Value and block numbering of an IR body in the LIR instruction space.
struct Layout {
    value_index: Vec<Option<u32>>,
    block_start: Vec<u32>,
}

impl Layout {
    fn compute(code: &IrCode) -> Self {
        let argc = u32::try_from(code.arguments.len())
            .unwrap_or_else(|_| panic!("argument count overflow"));
        let mut value_index = vec![None; code.values.len()];
        for (i, arg) in (0u32..).zip(code.arguments.iter()) {
            value_index[arg.index()] = Some(i);
        }
        let mut block_start = Vec::with_capacity(code.blocks.len());
        let mut next = 0u32;
        for block in &code.blocks {
            block_start.push(next);
            for phi in &block.phis {
                value_index[phi.dest.index()] = Some(argc + next);
                next += 1;
            }
            for insn in &block.body {
                if let Some(dest) = insn.dest {
                    value_index[dest.index()] = Some(argc + next);
                }
                next += 1;
            }
            next += 1;
        }
        Layout {
            value_index,
            block_start,
        }
    }

    fn value(&self, v: ValueId) -> Result<u32, LirError> {
        self.value_index
            .get(v.index())
            .copied()
            .flatten()
            .ok_or(LirError::UnresolvedValue(v.raw()))
    }

    fn values(&self, vs: &[ValueId]) -> Result<Vec<u32>, LirError> {
        vs.iter().map(|&v| self.value(v)).collect()
    }

    fn block(&self, b: BlockId) -> u32 {
        self.block_start[b.index()]
    }
}

/// Encode `code`. Fails if an instruction's operands do not fit the
/// encoding or the body references undefined values.
pub fn ir_to_lir(code: &IrCode) -> Result<LirCode, LirError> {
    let layout = Layout::compute(code);
    let mut builder = LirBuilder::new();
    for _ in &code.arguments {
        builder.add_argument();
    }

    for (id, block) in code.block_ids().zip(code.blocks.iter()) {
        let start = layout.block(id);
        debug_assert_eq!(start, builder.next_instruction_index());
        builder.add_try_catch(
            start,
            block
                .catch_handlers
                .iter()
                .map(|h| LirCatchHandler {
                    guard: h.guard,
                    target: layout.block(h.target),
                })
                .collect(),
        );

        for phi in &block.phis {
            let operands = layout.values(&phi.operands)?;
            builder.add_phi(code.value_type(phi.dest), &operands);
        }

        for insn in &block.body {
            builder.set_position(insn.position);
            encode_op(&mut builder, &layout, &insn.op)?;
        }

        builder.set_position(block.terminator_position);
        match &block.terminator {
            Terminator::Goto(target) if target.raw() == id.raw() + 1 => builder.add_fallthrough(),
            Terminator::Goto(target) => builder.add_goto(layout.block(*target)),
            Terminator::If {
                kind,
                ty,
                lhs,
                rhs,
                target,
            } => {
                let rhs = rhs.map(|r| layout.value(r)).transpose()?;
                builder.add_if(*kind, *ty, layout.block(*target), layout.value(*lhs)?, rhs);
            }
            Terminator::Return(value) => {
                let value = value.map(|v| layout.value(v)).transpose()?;
                builder.add_return(value);
            }
            Terminator::Throw(exception) => builder.add_throw(layout.value(*exception)?),
        }
    }

    let lir = builder.build()?;
    tracing::trace!(
        method = %code.method,
        instructions = lir.instruction_count(),
        bytes = lir.bytes().len(),
        constants = lir.constants().len(),
        "encoded method"
    );
    Ok(lir)
}

fn encode_op(builder: &mut LirBuilder, layout: &Layout, op: &Op) -> Result<(), LirError> {
    match op {
        Op::ConstNull => builder.add_const_null(),
        Op::ConstInt(v) => builder.add_const_int(*v),
        Op::ConstLong(v) => builder.add_const_long(*v),
        Op::ConstString(s) => builder.add_const_string(*s),
        Op::ConstClass(ty) => builder.add_const_class(*ty),
        Op::ConstMethodHandle(handle) => builder.add_const_method_handle(handle.clone()),
        Op::ConstMethodType(proto) => builder.add_const_method_type(proto.clone()),
        Op::NewInstance(ty) => builder.add_new_instance(*ty),
        Op::NewArray { ty, size } => builder.add_new_array(*ty, layout.value(*size)?),
        Op::NewUnboxedEnumInstance { ty, ordinal } => builder.add_new_unboxed_enum(*ty, *ordinal),
        Op::ArrayGet { ty, array, index } => {
            builder.add_array_get(*ty, layout.value(*array)?, layout.value(*index)?);
        }
        Op::ArrayPut {
            array,
            index,
            value,
        } => builder.add_array_put(
            layout.value(*array)?,
            layout.value(*index)?,
            layout.value(*value)?,
        ),
        Op::ArrayLength(array) => builder.add_array_length(layout.value(*array)?),
        Op::StaticGet(field) => builder.add_static_get(*field),
        Op::StaticPut { field, value } => builder.add_static_put(*field, layout.value(*value)?),
        Op::InstanceGet { field, object } => {
            builder.add_instance_get(*field, layout.value(*object)?);
        }
        Op::InstancePut {
            field,
            object,
            value,
        } => builder.add_instance_put(*field, layout.value(*object)?, layout.value(*value)?),
        Op::Invoke {
            kind,
            method,
            args,
            is_interface,
        } => builder.add_invoke(*kind, method.clone(), *is_interface, &layout.values(args)?),
        Op::InvokeCustom { call_site, args } => {
            builder.add_invoke_custom(std::sync::Arc::clone(call_site), &layout.values(args)?);
        }
        Op::CheckCast { value, ty } => builder.add_check_cast(*ty, layout.value(*value)?),
        Op::InstanceOf { value, ty } => builder.add_instance_of(*ty, layout.value(*value)?),
        Op::Binop { op, ty, lhs, rhs } => {
            builder.add_binop(*op, *ty, layout.value(*lhs)?, layout.value(*rhs)?);
        }
        Op::DebugPosition => builder.add_debug_position(),
    }
    Ok(())
}
