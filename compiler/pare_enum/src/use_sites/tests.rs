use std::collections::BTreeSet;

use pare_app::KeepInfo;
use pare_ir::ir::{InvokeKind, IrBuilder, Op};
use pare_ir::{known, AccessFlags, MethodRef, Name, ProgramClass, ProgramField};
use pretty_assertions::assert_eq;

use super::{analyze_use_sites, UseSites};
use crate::report::{Reason, Reasons, UnboxingReport};
use crate::test_helpers::{
    app, color_enum, field, method, ty, user_of, COLOR, ENUM, OBJECT, STRING, USER,
};

fn scan(classes: Vec<ProgramClass>) -> (UseSites, Vec<Reason>) {
    let app = app(classes, KeepInfo::new());
    let tracked = BTreeSet::from([ty(COLOR)]);
    let mut reasons = Reasons::new(false);
    let sites = analyze_use_sites(&app, &tracked, false, &mut reasons).unwrap();
    let mut report = UnboxingReport::new();
    report.record_rejections(reasons);
    (sites, report.reasons(ty(COLOR)).to_vec())
}

fn user_method(
    name: &str,
    ret: &str,
    params: &[&str],
    body: impl FnOnce(&mut IrBuilder),
) -> (MethodRef, ProgramClass) {
    let reference = method(USER, name, ret, params);
    (reference.clone(), user_of(reference, body))
}

#[test]
fn enum_declaration_alone_is_fine() {
    let (sites, reasons) = scan(vec![color_enum()]);
    assert!(reasons.is_empty());
    assert!(sites.read_instance_fields.is_empty());
}

#[test]
fn supported_enum_methods_are_fine() {
    let (_, user) = user_method("use", "I", &[COLOR, COLOR], |b| {
        let (c, d) = (b.argument(0), b.argument(1));
        b.invoke(InvokeKind::Virtual, method(ENUM, "compareTo", "I", &[ENUM]), vec![c, d]);
        b.invoke(InvokeKind::Virtual, method(COLOR, "name", STRING, &[]), vec![c]);
        let ordinal = b
            .invoke(InvokeKind::Virtual, method(ENUM, "ordinal", "I", &[]), vec![c])
            .unwrap();
        b.ret(Some(ordinal));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert!(reasons.is_empty());
}

#[test]
fn passing_to_object_parameter_escapes() {
    let (context, user) = user_method("leak", "V", &[COLOR], |b| {
        let c = b.argument(0);
        b.invoke(InvokeKind::Static, method(USER, "take", "V", &[OBJECT]), vec![c]);
        b.ret(None);
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(reasons, vec![Reason::EscapesToNonEnumContext(context)]);
}

#[test]
fn null_may_flow_into_enum_context() {
    let (_, user) = user_method("none", COLOR, &[], |b| {
        let null = b.emit_value(Op::ConstNull, ty(COLOR));
        b.invoke(InvokeKind::Static, method(USER, "paint", "V", &[COLOR]), vec![null]);
        b.ret(Some(null));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert!(reasons.is_empty());
}

#[test]
fn reflective_uses_are_rejected() {
    let (_, user) = user_method("reflect", "Z", &[COLOR], |b| {
        let c = b.argument(0);
        b.emit_value(Op::ConstClass(ty(COLOR)), known::class());
        let is = b.emit_value(
            Op::InstanceOf {
                value: c,
                ty: ty(COLOR),
            },
            known::boolean(),
        );
        b.ret(Some(is));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(
        reasons,
        vec![Reason::InvalidConstClass, Reason::InvalidInstanceOf]
    );
}

#[test]
fn instantiation_outside_the_class_initializer_is_rejected() {
    let (context, user) = user_method("make", "V", &[], |b| {
        b.emit_value(Op::NewInstance(ty(COLOR)), ty(COLOR));
        b.ret(None);
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(reasons, vec![Reason::UnexpectedNewInstance(context)]);
}

#[test]
fn instance_field_reads_are_collected() {
    let mut color = color_enum();
    let code = field(COLOR, "code", "I");
    color
        .fields
        .push(ProgramField::new(code, AccessFlags::PRIVATE | AccessFlags::FINAL));
    let (_, user) = user_method("code", "I", &[COLOR], |b| {
        let c = b.argument(0);
        let value = b.instance_get(code, c);
        b.ret(Some(value));
    });
    let (sites, reasons) = scan(vec![color, user]);
    assert!(reasons.is_empty());
    assert_eq!(sites.read_instance_fields, BTreeSet::from([code]));
}

#[test]
fn require_non_null_result_must_be_dropped() {
    let require = method("Ljava/util/Objects;", "requireNonNull", OBJECT, &[OBJECT]);
    let (_, dropped) = user_method("check", "V", &[COLOR], |b| {
        let c = b.argument(0);
        b.invoke(InvokeKind::Static, require.clone(), vec![c]);
        b.ret(None);
    });
    let (_, reasons) = scan(vec![color_enum(), dropped]);
    assert!(reasons.is_empty());

    let (context, kept) = user_method("checked", OBJECT, &[COLOR], |b| {
        let c = b.argument(0);
        let result = b.invoke(InvokeKind::Static, require.clone(), vec![c]).unwrap();
        b.ret(Some(result));
    });
    let (_, reasons) = scan(vec![color_enum(), kept]);
    assert_eq!(reasons, vec![Reason::EscapesToNonEnumContext(context)]);
}

#[test]
fn unknown_static_call_into_enum_is_rejected() {
    let missing = method(COLOR, "lookup", COLOR, &["I"]);
    let (_, user) = user_method("find", "V", &[], |b| {
        let zero = b.const_int(0);
        b.invoke(InvokeKind::Static, missing.clone(), vec![zero]);
        b.ret(None);
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(reasons, vec![Reason::InvalidInvoke(missing)]);
}

#[test]
fn untracked_types_are_ignored() {
    let (_, user) = user_method("leak", "V", &["Lp/Other;"], |b| {
        let o = b.argument(0);
        b.invoke(InvokeKind::Static, method(USER, "take", "V", &[OBJECT]), vec![o]);
        b.ret(None);
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert!(reasons.is_empty());
}

#[test]
fn equals_with_a_non_enum_argument_is_rejected() {
    let equals = method(ENUM, "equals", "Z", &[OBJECT]);
    let (_, user) = user_method("same", "Z", &[], |b| {
        let red = b.static_get(field(COLOR, "RED", COLOR));
        let text = b.const_string(Name::intern("RED"));
        let same = b
            .invoke(InvokeKind::Virtual, equals.clone(), vec![red, text])
            .unwrap();
        b.ret(Some(same));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(reasons, vec![Reason::InvalidInvoke(equals)]);
}

#[test]
fn equals_with_an_object_argument_is_rejected() {
    let equals = method(ENUM, "equals", "Z", &[OBJECT]);
    let (_, user) = user_method("same", "Z", &[COLOR, OBJECT], |b| {
        let (c, other) = (b.argument(0), b.argument(1));
        let same = b
            .invoke(InvokeKind::Virtual, equals.clone(), vec![c, other])
            .unwrap();
        b.ret(Some(same));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert_eq!(reasons, vec![Reason::InvalidInvoke(equals)]);
}

#[test]
fn equals_with_the_same_enum_or_null_is_fine() {
    let equals = method(ENUM, "equals", "Z", &[OBJECT]);
    let (_, user) = user_method("same", "Z", &[COLOR, COLOR], |b| {
        let (c, d) = (b.argument(0), b.argument(1));
        b.invoke(InvokeKind::Virtual, equals.clone(), vec![c, d]);
        let null = b.emit_value(Op::ConstNull, ty(COLOR));
        let same = b
            .invoke(InvokeKind::Virtual, equals.clone(), vec![c, null])
            .unwrap();
        b.ret(Some(same));
    });
    let (_, reasons) = scan(vec![color_enum(), user]);
    assert!(reasons.is_empty());
}
