//! Class initializer fixing.
//!
//! An unboxed enum has no instances, so every `new E(...)` in `E.<clinit>`
//! becomes a [`Op::NewUnboxedEnumInstance`] placeholder carrying the
//! ordinal, and the constructor call disappears. The same walk resolves the
//! name of each constant and the constant values of its read instance
//! fields into [`EnumData`].

use std::collections::{BTreeMap, BTreeSet};

use pare_ir::ir::{BlockId, InvokeKind, IrCode, Op, ValueId};
use pare_ir::program::{InstanceInitializerInfo, StaticValue};
use pare_ir::{FieldRef, MethodRef, ProgramClass, TypeRef};
use rayon::prelude::*;

use crate::code::{decode, Definitions};
use crate::enum_data::{EnumConstant, EnumData};
use crate::error::EnumError;
use crate::members::is_constant_field;
use crate::report::Reason;

/// A candidate after class initializer fixing.
#[derive(Debug)]
pub(crate) struct FixedEnum {
    pub(crate) data: EnumData,
    /// The rewritten class initializer, if the enum has one.
    pub(crate) class_initializer: Option<IrCode>,
}

pub(crate) type Fixing = Result<FixedEnum, Vec<Reason>>;

/// Fix the class initializer of every class in `candidates`, in parallel.
pub(crate) fn fix_class_initializers(
    candidates: &[&ProgramClass],
    read_fields: &BTreeSet<FieldRef>,
) -> Result<Vec<(TypeRef, Fixing)>, EnumError> {
    candidates
        .par_iter()
        .map(|class| Ok((class.ty, fix_class(class, read_fields)?)))
        .collect()
}

/// One `new E(...)` and its constructor call.
struct Allocation {
    value: ValueId,
    new_instance: (BlockId, usize),
    constructor_call: (BlockId, usize),
    ordinal: i32,
    name: pare_ir::Name,
    field_values: BTreeMap<FieldRef, Option<StaticValue>>,
}

fn fix_class(class: &ProgramClass, read_fields: &BTreeSet<FieldRef>) -> Result<Fixing, EnumError> {
    let enum_type = class.ty;
    let constant_fields: Vec<FieldRef> = class
        .fields
        .iter()
        .filter(|f| is_constant_field(f, enum_type))
        .map(|f| f.reference)
        .collect();
    let Some(clinit) = class.class_initializer() else {
        if constant_fields.is_empty() {
            return Ok(Ok(FixedEnum {
                data: EnumData::default(),
                class_initializer: None,
            }));
        }
        return Ok(Err(vec![Reason::UnsupportedClassInitializer]));
    };
    let Some(mut code) = decode(clinit)? else {
        return Ok(Err(vec![Reason::UnsupportedClassInitializer]));
    };

    let initializers: BTreeMap<&MethodRef, &InstanceInitializerInfo> = class
        .instance_initializers()
        .filter_map(|m| Some((&m.reference, m.info.instance_initializer.as_ref()?)))
        .collect();

    let allocations = match find_allocations(&code, enum_type, &initializers) {
        Ok(allocations) => allocations,
        Err(reason) => return Ok(Err(vec![reason])),
    };
    let Some(assignments) = assign_constants(&code, &constant_fields, &allocations) else {
        return Ok(Err(vec![Reason::UnsupportedClassInitializer]));
    };

    let constants: Vec<EnumConstant> = assignments
        .iter()
        .map(|(&field, &index)| EnumConstant {
            field,
            ordinal: allocations[index].ordinal,
            name: allocations[index].name,
        })
        .collect();

    let mut reasons = Vec::new();
    let mut instance_values = BTreeMap::new();
    let mut by_ordinal: Vec<&Allocation> = allocations.iter().collect();
    by_ordinal.sort_by_key(|a| a.ordinal);
    for &field in read_fields.iter().filter(|f| f.holder == enum_type) {
        let values: Option<Vec<StaticValue>> = by_ordinal
            .iter()
            .map(|a| match a.field_values.get(&field) {
                Some(value) => *value,
                None => Some(default_value(field)),
            })
            .collect();
        match values {
            Some(values) => {
                instance_values.insert(field, values);
            }
            None => reasons.push(Reason::MissingInstanceFieldData(field)),
        }
    }
    if !reasons.is_empty() {
        return Ok(Err(reasons));
    }

    replace_allocations(&mut code, enum_type, &allocations);
    tracing::trace!(
        enum_type = %enum_type,
        constants = constants.len(),
        "fixed enum class initializer"
    );
    Ok(Ok(FixedEnum {
        data: EnumData::new(constants, instance_values),
        class_initializer: Some(code),
    }))
}

fn find_allocations(
    code: &IrCode,
    enum_type: TypeRef,
    initializers: &BTreeMap<&MethodRef, &InstanceInitializerInfo>,
) -> Result<Vec<Allocation>, Reason> {
    let defs = Definitions::new(code);
    let mut allocations = Vec::new();
    for block_id in code.block_ids() {
        for (index, insn) in code.block(block_id).body.iter().enumerate() {
            let (Op::NewInstance(ty), Some(value)) = (&insn.op, insn.dest) else {
                continue;
            };
            if *ty != enum_type {
                continue;
            }
            let mut calls = code.users(value).into_iter().filter(|&(b, i)| {
                matches!(
                    &code.block(b).body[i].op,
                    Op::Invoke { kind: InvokeKind::Direct, method, args, .. }
                        if method.is_instance_initializer()
                            && method.holder == enum_type
                            && args.first() == Some(&value)
                )
            });
            let (Some(call), None) = (calls.next(), calls.next()) else {
                return Err(Reason::UnsupportedClassInitializer);
            };
            let Op::Invoke { method, args, .. } = &code.block(call.0).body[call.1].op else {
                return Err(Reason::UnsupportedClassInitializer);
            };
            let Some(info) = initializers.get(method) else {
                return Err(Reason::UnsupportedInstanceInitializer(method.clone()));
            };
            let ordinal = info.ordinal.and_then(|v| defs.resolve(v, args));
            let name = info.name.and_then(|v| defs.resolve(v, args));
            let (Some(StaticValue::Int(ordinal)), Some(StaticValue::String(name))) = (ordinal, name)
            else {
                return Err(Reason::UnsupportedClassInitializer);
            };
            let Ok(ordinal) = i32::try_from(ordinal) else {
                return Err(Reason::UnsupportedClassInitializer);
            };
            let field_values = info
                .field_writes
                .iter()
                .map(|(&field, &v)| (field, defs.resolve(v, args)))
                .collect();
            allocations.push(Allocation {
                value,
                new_instance: (block_id, index),
                constructor_call: call,
                ordinal,
                name,
                field_values,
            });
        }
    }
    Ok(allocations)
}

/// Each constant field, mapped to the allocation stored into it. `None`
/// unless every constant field is stored exactly once, every allocation
/// lands in one of them, and the ordinals are `0..n`.
fn assign_constants(
    code: &IrCode,
    constant_fields: &[FieldRef],
    allocations: &[Allocation],
) -> Option<BTreeMap<FieldRef, usize>> {
    let mut assignments = BTreeMap::new();
    for (_, insn) in code.instructions() {
        let Op::StaticPut { field, value } = &insn.op else {
            continue;
        };
        if !constant_fields.contains(field) {
            continue;
        }
        let index = allocations.iter().position(|a| a.value == *value)?;
        if assignments.insert(*field, index).is_some() {
            return None;
        }
    }
    if assignments.len() != constant_fields.len() || allocations.len() != constant_fields.len() {
        return None;
    }
    let ordinals: BTreeSet<i32> = allocations.iter().map(|a| a.ordinal).collect();
    let expected = (0..).take(allocations.len());
    (ordinals.len() == allocations.len() && ordinals.into_iter().eq(expected))
        .then_some(assignments)
}

fn replace_allocations(code: &mut IrCode, enum_type: TypeRef, allocations: &[Allocation]) {
    let mut removed: BTreeMap<BlockId, BTreeSet<usize>> = BTreeMap::new();
    for allocation in allocations {
        let (block, index) = allocation.new_instance;
        code.blocks[block.index()].body[index].op = Op::NewUnboxedEnumInstance {
            ty: enum_type,
            ordinal: allocation.ordinal,
        };
        let (block, index) = allocation.constructor_call;
        removed.entry(block).or_default().insert(index);
    }
    for (block, indices) in removed {
        let body = &mut code.blocks[block.index()].body;
        let mut index = 0;
        body.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }
    code.remove_dead_instructions();
}

/// What an instance field holds when no constructor assigns it.
fn default_value(field: FieldRef) -> StaticValue {
    if field.ty.is_primitive() {
        StaticValue::Int(0)
    } else {
        StaticValue::Null
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
