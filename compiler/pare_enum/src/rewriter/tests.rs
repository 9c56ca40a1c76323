use std::collections::BTreeMap;
use std::sync::Arc;

use pare_ir::ir::{IfKind, IfType, InvokeKind, IrBuilder, IrCode, Op, Terminator, ValueId};
use pare_ir::lir::ir_to_lir;
use pare_ir::{known, AccessFlags, MethodRef, Name, Program, ProgramField};
use pretty_assertions::assert_eq;

use super::{EnumCodeRewriter, UnboxedEnums};
use crate::enum_data::{EnumConstant, EnumData, EnumDataMap};
use crate::test_helpers::{
    color_enum, field, method, ty, COLOR, COLOR_ARRAY, ENUM, OBJECT, STRING, USER,
};
use crate::utility::{LocalUtility, SharedUtility};

fn unboxed() -> (UnboxedEnums, EnumDataMap) {
    let mut color = color_enum();
    color.fields.push(ProgramField::new(
        field(COLOR, "code", "I"),
        AccessFlags::PRIVATE | AccessFlags::FINAL,
    ));
    let program = Program::new();
    let enums = UnboxedEnums {
        classes: BTreeMap::from([(ty(COLOR), Arc::new(color))]),
        shared: SharedUtility::new(&program, ty(COLOR), 3),
        locals: BTreeMap::from([(ty(COLOR), LocalUtility::new(&program, ty(COLOR)))]),
    };
    let constants = ["RED", "GREEN", "BLUE"]
        .into_iter()
        .zip(0..)
        .map(|(name, ordinal)| EnumConstant {
            field: field(COLOR, name, COLOR),
            ordinal,
            name: Name::intern(name),
        })
        .collect();
    let mut data = EnumDataMap::default();
    data.insert(ty(COLOR), EnumData::new(constants, BTreeMap::new()));
    (enums, data)
}

fn body(ret: &str, params: &[&str], build: impl FnOnce(&mut IrBuilder)) -> IrCode {
    let mut b = IrBuilder::new(method(USER, "run", ret, params), true);
    build(&mut b);
    b.finish().unwrap()
}

fn rewritten(mut code: IrCode) -> IrCode {
    let (enums, data) = unboxed();
    EnumCodeRewriter::new(&enums, &data).rewrite(&mut code);
    code
}

fn insns(code: &IrCode) -> Vec<(Option<ValueId>, Op)> {
    code.instructions()
        .map(|(_, insn)| (insn.dest, insn.op.clone()))
        .collect()
}

fn ops(code: &IrCode) -> Vec<Op> {
    insns(code).into_iter().map(|(_, op)| op).collect()
}

fn static_call(method: MethodRef, args: Vec<ValueId>) -> Op {
    Op::Invoke {
        kind: InvokeKind::Static,
        method,
        args,
        is_interface: false,
    }
}

#[test]
fn ordinal_of_a_constant_folds() {
    let code = rewritten(body("I", &[], |b| {
        let red = b.static_get(field(COLOR, "RED", COLOR));
        let ordinal = b
            .invoke(InvokeKind::Virtual, method(ENUM, "ordinal", "I", &[]), vec![red])
            .unwrap();
        b.ret(Some(ordinal));
    }));
    assert_eq!(ops(&code), vec![Op::ConstInt(0)]);
}

#[test]
fn constants_become_their_unboxed_values() {
    let code = rewritten(body(COLOR, &[], |b| {
        let blue = b.static_get(field(COLOR, "BLUE", COLOR));
        b.ret(Some(blue));
    }));
    assert_eq!(ops(&code), vec![Op::ConstInt(3)]);
}

#[test]
fn enum_methods_call_the_shared_utility() {
    let (enums, _) = unboxed();
    let code = rewritten(body("I", &[COLOR, COLOR], |b| {
        let (c, d) = (b.argument(0), b.argument(1));
        let compared = b
            .invoke(InvokeKind::Virtual, method(ENUM, "compareTo", "I", &[ENUM]), vec![c, d])
            .unwrap();
        b.ret(Some(compared));
    }));
    let c = code.arguments[0];
    let d = code.arguments[1];
    assert_eq!(ops(&code), vec![static_call(enums.shared.compare_to(), vec![c, d])]);

    let code = rewritten(body("I", &[COLOR], |b| {
        let c = b.argument(0);
        let hash = b
            .invoke(InvokeKind::Virtual, method(OBJECT, "hashCode", "I", &[]), vec![c])
            .unwrap();
        b.ret(Some(hash));
    }));
    assert_eq!(
        ops(&code),
        vec![static_call(enums.shared.ordinal(), vec![code.arguments[0]])]
    );
}

#[test]
fn name_calls_the_local_utility() {
    let (enums, _) = unboxed();
    let code = rewritten(body(STRING, &[COLOR], |b| {
        let c = b.argument(0);
        let name = b
            .invoke(InvokeKind::Virtual, method(COLOR, "toString", STRING, &[]), vec![c])
            .unwrap();
        b.ret(Some(name));
    }));
    let local = &enums.locals[&ty(COLOR)];
    assert_eq!(
        ops(&code),
        vec![static_call(local.name_method(), vec![code.arguments[0]])]
    );
}

#[test]
fn null_argument_becomes_zero() {
    let (enums, _) = unboxed();
    let code = rewritten(body("Z", &[COLOR], |b| {
        let c = b.argument(0);
        let null = b.emit_value(Op::ConstNull, ty(COLOR));
        let same = b
            .invoke(
                InvokeKind::Virtual,
                method(ENUM, "equals", "Z", &[OBJECT]),
                vec![c, null],
            )
            .unwrap();
        b.ret(Some(same));
    }));
    let insns = insns(&code);
    let (Some(zero), Op::ConstInt(0)) = insns[0].clone() else {
        panic!("expected zero first, got {insns:?}");
    };
    assert_eq!(
        insns[1..].iter().map(|(_, op)| op.clone()).collect::<Vec<_>>(),
        vec![static_call(enums.shared.equals(), vec![code.arguments[0], zero])]
    );
}

#[test]
fn values_reads_the_shared_lookup_array() {
    let (enums, _) = unboxed();
    let code = rewritten(body(COLOR_ARRAY, &[], |b| {
        let values = b
            .invoke(InvokeKind::Static, method(COLOR, "values", COLOR_ARRAY, &[]), vec![])
            .unwrap();
        b.ret(Some(values));
    }));
    let insns = insns(&code);
    let (Some(size), Op::ConstInt(3)) = insns[0].clone() else {
        panic!("expected the constant count first, got {insns:?}");
    };
    assert_eq!(insns[1].1, static_call(enums.shared.values(), vec![size]));
}

#[test]
fn require_non_null_checks_for_zero() {
    let (enums, _) = unboxed();
    let require = method("Ljava/util/Objects;", "requireNonNull", OBJECT, &[OBJECT]);
    let code = rewritten(body("V", &[COLOR], |b| {
        let c = b.argument(0);
        b.invoke(InvokeKind::Static, require, vec![c]);
        b.ret(None);
    }));
    assert_eq!(
        insns(&code),
        vec![(
            None,
            static_call(enums.shared.check_not_zero(), vec![code.arguments[0]])
        )]
    );
}

#[test]
fn instance_field_reads_call_the_getter() {
    let (enums, _) = unboxed();
    let code_field = field(COLOR, "code", "I");
    let code = rewritten(body("I", &[COLOR], |b| {
        let c = b.argument(0);
        let value = b.instance_get(code_field, c);
        b.ret(Some(value));
    }));
    let getter = enums.locals[&ty(COLOR)].getter(code_field, known::int());
    assert_eq!(ops(&code), vec![static_call(getter, vec![code.arguments[0]])]);
}

#[test]
fn null_checks_compare_against_zero() {
    let code = rewritten(body("Z", &[COLOR], |b| {
        let c = b.argument(0);
        let null = b.emit_value(Op::ConstNull, ty(COLOR));
        let not_null = b.new_block();
        let is_null = b.new_block();
        b.terminate(Terminator::If {
            kind: IfKind::Eq,
            ty: IfType::Object,
            lhs: c,
            rhs: Some(null),
            target: is_null,
        });
        b.switch_to(not_null);
        let yes = b.emit_value(Op::ConstInt(1), known::boolean());
        b.ret(Some(yes));
        b.switch_to(is_null);
        let no = b.emit_value(Op::ConstInt(0), known::boolean());
        b.ret(Some(no));
    }));
    let entry = &code.blocks[0];
    let zero = entry.body[0].dest;
    assert_eq!(entry.body[0].op, Op::ConstInt(0));
    let Terminator::If { ty, lhs, rhs, .. } = &entry.terminator else {
        panic!("expected a branch, got {:?}", entry.terminator);
    };
    assert_eq!(*ty, IfType::Int);
    assert_eq!(*lhs, code.arguments[0]);
    assert_eq!(*rhs, zero);
}

#[test]
fn returned_null_becomes_zero() {
    let code = rewritten(body(COLOR, &[], |b| {
        let null = b.emit_value(Op::ConstNull, ty(COLOR));
        b.ret(Some(null));
    }));
    let entry = &code.blocks[0];
    assert_eq!(ops(&code), vec![Op::ConstInt(0)]);
    assert_eq!(entry.terminator, Terminator::Return(entry.body[0].dest));
}

#[test]
fn casts_to_the_enum_disappear() {
    let (enums, _) = unboxed();
    let code = rewritten(body("I", &[COLOR], |b| {
        let o = b.argument(0);
        let c = b.emit_value(
            Op::CheckCast {
                value: o,
                ty: ty(COLOR),
            },
            ty(COLOR),
        );
        let ordinal = b
            .invoke(InvokeKind::Virtual, method(ENUM, "ordinal", "I", &[]), vec![c])
            .unwrap();
        b.ret(Some(ordinal));
    }));
    assert_eq!(
        ops(&code),
        vec![static_call(enums.shared.ordinal(), vec![code.arguments[0]])]
    );
}

#[test]
fn encoded_bodies_are_checked_for_enum_mentions() {
    let (enums, _) = unboxed();
    let mentions = body("V", &[], |b| {
        b.static_get(field(COLOR, "RED", COLOR));
        b.ret(None);
    });
    let unrelated = body("I", &["I"], |b| {
        let seed = b.static_get(field(USER, "seed", "I"));
        b.ret(Some(seed));
    });
    assert!(enums.mentioned_by(&ir_to_lir(&mentions).unwrap()));
    assert!(enums.method_mentions(&method(USER, "paint", "V", &[COLOR_ARRAY])));
    assert!(!enums.mentioned_by(&ir_to_lir(&unrelated).unwrap()));
    assert!(!enums.method_mentions(&unrelated.method));
    assert_eq!(enums.map_type(ty(COLOR_ARRAY)), known::int_array());
}
