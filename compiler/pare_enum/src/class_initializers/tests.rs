use std::collections::BTreeSet;

use pare_app::{AppView, KeepInfo};
use pare_ir::ir::{InvokeKind, IrBuilder, Op, ValueId};
use pare_ir::program::StaticValue;
use pare_ir::{AccessFlags, FieldRef, Name, ProgramClass, ProgramField};
use pretty_assertions::assert_eq;

use super::{fix_class_initializers, Fixing};
use crate::report::Reason;
use crate::test_helpers::{
    app, color_enum, enum_base_initializer, enum_class, enum_constructor_ref, field, ty,
    with_body, COLOR, USER,
};

fn fix(classes: Vec<ProgramClass>, read_fields: &[FieldRef]) -> Fixing {
    let app: AppView = app(classes, KeepInfo::new());
    let color = app.definition_for(ty(COLOR)).unwrap();
    let read_fields: BTreeSet<FieldRef> = read_fields.iter().copied().collect();
    let mut fixed = fix_class_initializers(&[&**color], &read_fields).unwrap();
    assert_eq!(fixed.len(), 1);
    fixed.pop().unwrap().1
}

/// An enum whose constructor stores its extra `int` into `code`.
fn coded_enum(extra: impl Fn(&mut IrBuilder, i32) -> Vec<ValueId>) -> ProgramClass {
    let code = field(COLOR, "code", "I");
    let constructor = with_body(
        enum_constructor_ref(COLOR, &["I"]),
        AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR,
        |b| {
            let args = b.arguments().to_vec();
            b.invoke(InvokeKind::Direct, enum_base_initializer(), args[..3].to_vec());
            b.instance_put(code, args[0], args[3]);
            b.ret(None);
        },
    );
    let mut class = enum_class(COLOR, &["RED", "GREEN", "BLUE"], constructor, extra);
    class
        .fields
        .push(ProgramField::new(code, AccessFlags::PRIVATE | AccessFlags::FINAL));
    class
}

#[test]
fn constants_are_resolved_in_ordinal_order() {
    let fixed = fix(vec![color_enum()], &[]).unwrap();
    let constants: Vec<(Name, i32, i32)> = fixed
        .data
        .constants()
        .iter()
        .map(|c| (c.name, c.ordinal, c.unboxed_value()))
        .collect();
    assert_eq!(
        constants,
        vec![
            (Name::intern("RED"), 0, 1),
            (Name::intern("GREEN"), 1, 2),
            (Name::intern("BLUE"), 2, 3),
        ]
    );
    assert_eq!(
        fixed
            .data
            .constant_for_field(&field(COLOR, "GREEN", COLOR))
            .map(|c| c.ordinal),
        Some(1)
    );
}

#[test]
fn allocations_become_placeholders() {
    let fixed = fix(vec![color_enum()], &[]).unwrap();
    let code = fixed.class_initializer.unwrap();
    let ops: Vec<&Op> = code.instructions().map(|(_, insn)| &insn.op).collect();

    let placeholders: Vec<i32> = ops
        .iter()
        .filter_map(|op| match op {
            Op::NewUnboxedEnumInstance { ordinal, .. } => Some(*ordinal),
            _ => None,
        })
        .collect();
    assert_eq!(placeholders, vec![0, 1, 2]);
    assert!(!ops.iter().any(|op| matches!(op, Op::NewInstance(_))));
    assert!(!ops
        .iter()
        .any(|op| matches!(op, Op::Invoke { method, .. } if method.is_instance_initializer())));
}

#[test]
fn read_instance_fields_are_evaluated_per_constant() {
    let code = field(COLOR, "code", "I");
    let color = coded_enum(|b, ordinal| vec![b.const_int(ordinal * 10)]);
    let fixed = fix(vec![color], &[code]).unwrap();
    assert_eq!(
        fixed.data.instance_field_values(&code),
        Some(&[StaticValue::Int(0), StaticValue::Int(10), StaticValue::Int(20)][..])
    );
    assert_eq!(fixed.data.instance_fields().collect::<Vec<_>>(), vec![&code]);
}

#[test]
fn unread_instance_fields_are_not_evaluated() {
    let color = coded_enum(|b, _| vec![b.static_get(field(USER, "seed", "I"))]);
    let fixed = fix(vec![color], &[]).unwrap();
    assert_eq!(fixed.data.instance_fields().count(), 0);
}

#[test]
fn non_constant_field_values_reject() {
    let code = field(COLOR, "code", "I");
    let color = coded_enum(|b, _| vec![b.static_get(field(USER, "seed", "I"))]);
    let reasons = fix(vec![color], &[code]).unwrap_err();
    assert_eq!(reasons, vec![Reason::MissingInstanceFieldData(code)]);
}

#[test]
fn duplicate_ordinals_reject() {
    let constructor = with_body(
        enum_constructor_ref(COLOR, &[]),
        AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR,
        |b| {
            let (this, name) = (b.argument(0), b.argument(1));
            let zero = b.const_int(0);
            b.invoke(InvokeKind::Direct, enum_base_initializer(), vec![this, name, zero]);
            b.ret(None);
        },
    );
    let color = enum_class(COLOR, &["RED", "GREEN"], constructor, |_, _| Vec::new());
    let reasons = fix(vec![color], &[]).unwrap_err();
    assert_eq!(reasons, vec![Reason::UnsupportedClassInitializer]);
}
