use std::collections::BTreeMap;

use pare_app::{FieldAccessInfoCollection, FieldAccessInfoModifier};
use pare_ir::ir::{IrCode, Op, Terminator};
use pare_ir::program::StaticValue;
use pare_ir::{known, Code, FieldRef, Name, Program, ProgramClass, ProgramMethod};
use pretty_assertions::assert_eq;

use super::{LocalUtility, SharedUtility};
use crate::enum_data::{EnumConstant, EnumData};
use crate::test_helpers::{class, field, ty, COLOR, OBJECT};

fn ir(method: &ProgramMethod) -> &IrCode {
    match &method.code {
        Some(Code::Ir(ir)) => &**ir,
        other => panic!("expected an IR body for {}, got {other:?}", method.reference),
    }
}

fn ops(method: &ProgramMethod) -> Vec<Op> {
    ir(method).instructions().map(|(_, insn)| insn.op.clone()).collect()
}

fn color_data(instance_values: BTreeMap<FieldRef, Vec<StaticValue>>) -> EnumData {
    let constants = ["RED", "GREEN", "BLUE"]
        .into_iter()
        .zip(0..)
        .map(|(name, ordinal)| EnumConstant {
            field: field(COLOR, name, COLOR),
            ordinal,
            name: Name::intern(name),
        })
        .collect();
    EnumData::new(constants, instance_values)
}

#[test]
fn shared_utility_lives_next_to_the_smallest_enum() {
    let program = Program::new();
    let shared = SharedUtility::new(&program, ty(COLOR), 3);
    assert_eq!(shared.ty(), ty("Lp/$$EnumUnboxingSharedUtility;"));

    let taken: Program = [class("Lp/$$EnumUnboxingSharedUtility;", OBJECT)]
        .into_iter()
        .collect();
    let shared = SharedUtility::new(&taken, ty(COLOR), 3);
    assert_eq!(shared.ty(), ty("Lp/$$EnumUnboxingSharedUtility1;"));
}

#[test]
fn local_utility_is_named_after_its_enum() {
    let local = LocalUtility::new(&Program::new(), ty(COLOR));
    assert_eq!(local.ty(), ty("Lp/Color$$EnumUnboxingLocalUtility;"));
    assert_eq!(
        local.name_method().to_string(),
        "Lp/Color$$EnumUnboxingLocalUtility;->$name(I)Ljava/lang/String;"
    );
}

#[test]
fn shared_values_array_has_a_null_slot() {
    let shared = SharedUtility::new(&Program::new(), ty(COLOR), 3);
    let mut field_access = FieldAccessInfoModifier::new();
    let (class, synthesized): (ProgramClass, _) = shared.build(&mut field_access).unwrap();

    assert_eq!(class.methods.len(), 7);
    assert_eq!(
        synthesized,
        class
            .methods
            .iter()
            .map(|m| m.reference.clone())
            .collect::<Vec<_>>()
    );
    let clinit = class.class_initializer().unwrap();
    let ops = ops(clinit);
    assert_eq!(ops.first(), Some(&Op::ConstInt(4)));
    let stores = ops
        .iter()
        .filter(|op| matches!(op, Op::ArrayPut { .. }))
        .count();
    assert_eq!(stores, 4);

    let collection = field_access.apply(&FieldAccessInfoCollection::default());
    let info = collection.get(&shared.values_field()).unwrap();
    assert_eq!(info.readers().collect::<Vec<_>>(), vec![&shared.values()]);
    assert!(info.is_written());
}

#[test]
fn shared_values_loops_over_the_lookup_array() {
    let shared = SharedUtility::new(&Program::new(), ty(COLOR), 3);
    let (class, _) = shared.build(&mut FieldAccessInfoModifier::new()).unwrap();
    let values = class.method(&shared.values()).unwrap();
    let code = ir(values);

    let header = &code.blocks[1];
    assert_eq!(header.phis.len(), 1);
    let back_edge = header.phis[0].operands[1];
    assert!(code.users(back_edge).iter().any(|&(block, _)| block.index() == 2));
    assert!(matches!(code.blocks[3].terminator, Terminator::Return(Some(_))));
    code.verify().unwrap();
}

#[test]
fn name_method_answers_every_constant() {
    let local = LocalUtility::new(&Program::new(), ty(COLOR));
    let name = local.build_name_method(&color_data(BTreeMap::new())).unwrap();

    let names: Vec<Name> = ops(&name)
        .into_iter()
        .filter_map(|op| match op {
            Op::ConstString(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec![Name::intern("RED"), Name::intern("GREEN"), Name::intern("BLUE")]
    );
    let expected: Vec<i32> = ops(&name)
        .into_iter()
        .filter_map(|op| match op {
            Op::ConstInt(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(expected, vec![1, 2, 3]);
    let throws = ir(&name)
        .blocks
        .iter()
        .filter(|b| matches!(b.terminator, Terminator::Throw(_)))
        .count();
    assert_eq!(throws, 1);
}

#[test]
fn value_of_matches_names_and_returns_unboxed_values() {
    let local = LocalUtility::new(&Program::new(), ty(COLOR));
    let value_of = local.build_value_of(&color_data(BTreeMap::new())).unwrap();
    assert_eq!(value_of.reference, local.value_of());
    assert_eq!(value_of.reference.proto.return_type, known::int());

    let returned: Vec<i32> = ir(&value_of)
        .blocks
        .iter()
        .filter_map(|block| match block.terminator {
            Terminator::Return(Some(v)) => block.body.iter().find_map(|insn| match insn.op {
                Op::ConstInt(c) if insn.dest == Some(v) => Some(c),
                _ => None,
            }),
            _ => None,
        })
        .collect();
    assert_eq!(returned, vec![1, 2, 3]);
    let equals_calls = ops(&value_of)
        .iter()
        .filter(|op| matches!(op, Op::Invoke { method, .. } if method.name == known::equals()))
        .count();
    assert_eq!(equals_calls, 3);
}

#[test]
fn getter_folds_missing_references_to_zero() {
    let label = field(COLOR, "label", "Lp/Color;");
    let code = field(COLOR, "code", "J");
    let data = color_data(BTreeMap::from([
        (
            label,
            vec![StaticValue::Null, StaticValue::Null, StaticValue::Null],
        ),
        (
            code,
            vec![StaticValue::Int(1), StaticValue::Int(2), StaticValue::Int(3)],
        ),
    ]));
    let local = LocalUtility::new(&Program::new(), ty(COLOR));

    // A field of the unboxed enum's own type is an `int` now.
    let label_getter = local.build_getter(&data, label, known::int()).unwrap();
    assert_eq!(label_getter.reference.name, Name::intern("get$label"));
    assert!(ops(&label_getter)
        .iter()
        .all(|op| !matches!(op, Op::ConstNull)));

    let code_getter = local.build_getter(&data, code, known::long()).unwrap();
    let longs: Vec<i64> = ops(&code_getter)
        .into_iter()
        .filter_map(|op| match op {
            Op::ConstLong(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(longs, vec![1, 2, 3]);
}
