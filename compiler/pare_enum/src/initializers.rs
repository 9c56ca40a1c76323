//! Instance initializer analysis of enum classes.
//!
//! For every enum constructor, records where the ordinal and name passed to
//! `java.lang.Enum.<init>` come from and what each instance field is set to.
//! Only straight-line constructors that do nothing but delegate and store
//! get an [`InstanceInitializerInfo`]; unboxing drops constructor bodies, so
//! any other effect would be lost.

use std::collections::BTreeMap;
use std::sync::Arc;

use pare_ir::ir::{InvokeKind, IrCode, Op, Terminator, ValueDef, ValueId};
use pare_ir::program::{InitializerValue, InstanceInitializerInfo, StaticValue};
use pare_ir::{known, MethodRef, Program, ProgramClass, Proto, TypeRef};
use rayon::prelude::*;

use crate::code::{decode, Definitions};
use crate::error::EnumError;

/// `program` with [`InstanceInitializerInfo`] attached to every enum
/// constructor that supports it.
pub fn analyze_instance_initializers(program: &Program) -> Result<Program, EnumError> {
    let enums: Vec<&Arc<ProgramClass>> = program
        .program_classes()
        .filter(|c| c.is_enum())
        .collect();
    let analyzed = enums
        .par_iter()
        .map(|class| analyze_class(class))
        .collect::<Result<Vec<_>, EnumError>>()?;

    let mut out = program.clone();
    let mut supported = 0usize;
    for (class, count) in analyzed {
        supported += count;
        out.insert(class);
    }
    tracing::debug!(
        enums = enums.len(),
        supported_initializers = supported,
        "analyzed enum instance initializers"
    );
    Ok(out)
}

fn analyze_class(class: &Arc<ProgramClass>) -> Result<(Arc<ProgramClass>, usize), EnumError> {
    let mut bodies: Vec<(MethodRef, IrCode)> = Vec::new();
    for method in class.instance_initializers() {
        if let Some(code) = decode(method)? {
            bodies.push((method.reference.clone(), code));
        }
    }

    // Constructors delegating to `this(...)` need their callee first.
    let mut resolved: BTreeMap<MethodRef, InstanceInitializerInfo> = BTreeMap::new();
    let mut pending: Vec<&(MethodRef, IrCode)> = bodies.iter().collect();
    loop {
        let before = pending.len();
        pending.retain(|(reference, code)| match analyze(code, class.ty, &resolved) {
            Outcome::Supported(info) => {
                resolved.insert(reference.clone(), info);
                false
            }
            Outcome::Unsupported => false,
            Outcome::Pending => true,
        });
        if pending.len() == before {
            break;
        }
    }

    if resolved.is_empty() {
        return Ok((Arc::clone(class), 0));
    }
    let count = resolved.len();
    let mut updated = (**class).clone();
    for method in &mut updated.methods {
        if let Some(info) = resolved.remove(&method.reference) {
            tracing::trace!(constructor = %method.reference, "supported enum initializer");
            method.info.instance_initializer = Some(info);
        }
    }
    Ok((Arc::new(updated), count))
}

enum Outcome {
    Supported(InstanceInitializerInfo),
    Unsupported,
    /// Delegates to a constructor that is not analyzed yet.
    Pending,
}

/// `Enum.<init>(String, int)`.
fn enum_base_initializer() -> MethodRef {
    MethodRef::new(
        known::enum_base(),
        known::init(),
        Proto::new(known::void(), vec![known::string(), known::int()]),
    )
}

fn analyze(
    code: &IrCode,
    enum_type: TypeRef,
    resolved: &BTreeMap<MethodRef, InstanceInitializerInfo>,
) -> Outcome {
    let [block] = code.blocks.as_slice() else {
        return Outcome::Unsupported;
    };
    if block.terminator != Terminator::Return(None) || !block.catch_handlers.is_empty() {
        return Outcome::Unsupported;
    }
    let Some(&receiver) = code.arguments.first() else {
        return Outcome::Unsupported;
    };
    let defs = Definitions::new(code);
    let source = |value: ValueId| trace(code, &defs, value);

    let mut info: Option<InstanceInitializerInfo> = None;
    let mut field_writes = BTreeMap::new();
    for insn in &block.body {
        match &insn.op {
            Op::ConstNull
            | Op::ConstInt(_)
            | Op::ConstLong(_)
            | Op::ConstString(_)
            | Op::DebugPosition => {}
            Op::Invoke {
                kind: InvokeKind::Direct,
                method,
                args,
                ..
            } if method.is_instance_initializer()
                && args.first() == Some(&receiver)
                && info.is_none() =>
            {
                if *method == enum_base_initializer() {
                    let name = args.get(1).and_then(|&v| source(v));
                    let ordinal = args.get(2).and_then(|&v| source(v));
                    let (Some(name), Some(ordinal)) = (name, ordinal) else {
                        return Outcome::Unsupported;
                    };
                    info = Some(InstanceInitializerInfo {
                        ordinal: Some(ordinal),
                        name: Some(name),
                        field_writes: BTreeMap::new(),
                    });
                } else if method.holder == enum_type {
                    let Some(callee) = resolved.get(method) else {
                        return Outcome::Pending;
                    };
                    let Some(delegated) = compose(callee, args, &source) else {
                        return Outcome::Unsupported;
                    };
                    field_writes.extend(delegated.field_writes.iter().map(|(&f, &v)| (f, v)));
                    info = Some(delegated);
                } else {
                    return Outcome::Unsupported;
                }
            }
            Op::InstancePut {
                field,
                object,
                value,
            } if *object == receiver && field.holder == enum_type => {
                // Straight-line code: the last store wins.
                let Some(v) = source(*value) else {
                    return Outcome::Unsupported;
                };
                field_writes.insert(*field, v);
            }
            _ => return Outcome::Unsupported,
        }
    }
    match info {
        Some(mut info) => {
            info.field_writes = field_writes;
            Outcome::Supported(info)
        }
        None => Outcome::Unsupported,
    }
}

/// Where `value` comes from: an argument of the constructor or a constant.
fn trace(code: &IrCode, defs: &Definitions<'_>, value: ValueId) -> Option<InitializerValue> {
    if let ValueDef::Argument(index) = code.value(value).def {
        return Some(InitializerValue::Argument(index));
    }
    Some(match defs.constant(value)? {
        StaticValue::Int(v) => InitializerValue::ConstantInt(v),
        StaticValue::String(s) => InitializerValue::ConstantString(s),
        StaticValue::Null => InitializerValue::Null,
    })
}

/// A delegating constructor's info: the callee's, with its arguments
/// replaced by what the delegating call passes.
fn compose(
    callee: &InstanceInitializerInfo,
    args: &[ValueId],
    trace: &impl Fn(ValueId) -> Option<InitializerValue>,
) -> Option<InstanceInitializerInfo> {
    let map = |value: InitializerValue| match value {
        InitializerValue::Argument(i) => trace(*args.get(i as usize)?),
        other => Some(other),
    };
    Some(InstanceInitializerInfo {
        ordinal: Some(map(callee.ordinal?)?),
        name: Some(map(callee.name?)?),
        field_writes: callee
            .field_writes
            .iter()
            .filter_map(|(&field, &value)| Some((field, map(value)?)))
            .collect(),
    })
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
