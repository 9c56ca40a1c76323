use std::collections::BTreeSet;

use pare_app::KeepInfo;
use pare_ir::ir::{InvokeKind, Op};
use pare_ir::{known, Name, ProgramClass};
use pretty_assertions::assert_eq;

use super::{CodeScanner, ScanResult};
use crate::abstract_value::AbstractValue;
use crate::dynamic_type::{DynamicType, Nullability};
use crate::in_flow::{InFlow, MethodParameter};
use crate::method_state::MethodState;
use crate::test_helpers::{
    app, field, main_class, method, public_static, returns_nothing, shapes, static_field, ty,
    with_body, CIRCLE, MAIN, SHAPE, STRING,
};
use crate::value_state::{ConcreteValueState, StateJoiner, ValueState};

fn scanned(classes: Vec<ProgramClass>, keep_info: KeepInfo) -> ScanResult {
    let app = app(classes, keep_info);
    let joiner = StateJoiner::new(&app, 16);
    CodeScanner::new(&app, &joiner)
        .run()
        .unwrap_or_else(|e| panic!("scan failed: {e}"))
}

fn int(value: i64) -> ValueState {
    ValueState::primitive(AbstractValue::Single(value))
}

#[test]
fn constant_arguments_are_concrete() {
    let sink = method(MAIN, "sink", "V", &["I", STRING]);
    let caller = with_body(method(MAIN, "run", "V", &[]), public_static(), |b| {
        let seven = b.const_int(7);
        let hello = b.const_string(Name::intern("hello"));
        b.invoke(InvokeKind::Static, sink.clone(), vec![seven, hello]);
        b.ret(None);
    });
    let result = scanned(
        vec![main_class([caller, returns_nothing(sink.clone(), public_static())])],
        KeepInfo::new(),
    );
    assert_eq!(
        result.methods.get(&sink),
        &MethodState::Monomorphic(vec![
            int(7),
            ValueState::class(
                AbstractValue::String(Name::intern("hello")),
                DynamicType::exact(known::string())
            ),
        ])
    );
}

#[test]
fn forwarded_parameters_become_in_flow() {
    let sink = method(MAIN, "sink", "V", &["I"]);
    let forward = method(MAIN, "forward", "V", &["I"]);
    let caller = with_body(forward.clone(), public_static(), |b| {
        let x = b.argument(0);
        b.invoke(InvokeKind::Static, sink.clone(), vec![x]);
        b.ret(None);
    });
    let result = scanned(
        vec![main_class([caller, returns_nothing(sink.clone(), public_static())])],
        KeepInfo::new(),
    );
    let arguments = result.methods.get(&sink).arguments().unwrap_or_default().to_vec();
    assert_eq!(
        arguments[0].in_flow(),
        Some(&BTreeSet::from([InFlow::Parameter(MethodParameter::new(forward, 0))]))
    );
}

#[test]
fn kept_methods_and_fields_are_unknown() {
    let sink = method(MAIN, "sink", "V", &["I"]);
    let count = field(MAIN, "count", "I");
    let caller = with_body(method(MAIN, "run", "V", &[]), public_static(), |b| {
        let one = b.const_int(1);
        b.invoke(InvokeKind::Static, sink.clone(), vec![one]);
        b.emit(Op::StaticPut {
            field: count,
            value: one,
        });
        b.ret(None);
    });
    let mut main = main_class([caller, returns_nothing(sink.clone(), public_static())]);
    main.fields.push(static_field(count));

    let mut keep_info = KeepInfo::new().with_pinned_method(sink.clone());
    let plain = scanned(vec![main.clone()], keep_info.clone());
    assert!(plain.methods.get(&sink).is_unknown());
    assert_eq!(plain.fields.get(&count), &int(1));

    keep_info.pin_field(count);
    let kept = scanned(vec![main], keep_info);
    assert!(kept.fields.get(&count).is_unknown());
}

#[test]
fn virtual_calls_record_the_receiver_bound() {
    let draw = method(SHAPE, "draw", "V", &["I"]);
    let caller = with_body(method(MAIN, "run", "V", &[]), public_static(), |b| {
        let circle = b.emit_value(Op::NewInstance(ty(CIRCLE)), ty(CIRCLE));
        b.invoke(
            InvokeKind::Direct,
            method(CIRCLE, "<init>", "V", &[]),
            vec![circle],
        );
        let two = b.const_int(2);
        b.invoke(InvokeKind::Virtual, draw.clone(), vec![circle, two]);
        b.ret(None);
    });
    let mut classes = shapes();
    classes.push(main_class([caller]));
    let result = scanned(classes, KeepInfo::new());

    let MethodState::Polymorphic(bounds) = result.methods.get(&draw) else {
        panic!("expected a polymorphic state for {draw}");
    };
    let receiver = ValueState::Concrete(ConcreteValueState::Receiver {
        dynamic_type: DynamicType::exact(ty(CIRCLE)),
        in_flow: BTreeSet::new(),
    });
    assert_eq!(
        bounds.get(&DynamicType::exact(ty(CIRCLE))),
        Some(&MethodState::Monomorphic(vec![receiver, int(2)]))
    );
}

#[test]
fn calls_on_null_are_ignored() {
    let draw = method(SHAPE, "draw", "V", &["I"]);
    let caller = with_body(method(MAIN, "run", "V", &[]), public_static(), |b| {
        let null = b.emit_value(Op::ConstNull, ty(SHAPE));
        let two = b.const_int(2);
        b.invoke(InvokeKind::Virtual, draw.clone(), vec![null, two]);
        b.ret(None);
    });
    let mut classes = shapes();
    classes.push(main_class([caller]));
    let result = scanned(classes, KeepInfo::new());
    assert!(result.methods.get(&draw).is_bottom());
}

#[test]
fn null_arrays_and_objects_keep_their_nullability() {
    let sink = method(MAIN, "sink", "V", &["[I", SHAPE]);
    let caller = with_body(method(MAIN, "run", "V", &[]), public_static(), |b| {
        let array = b.emit_value(Op::ConstNull, ty("[I"));
        let shape = b.emit_value(Op::ConstNull, ty(SHAPE));
        b.invoke(InvokeKind::Static, sink.clone(), vec![array, shape]);
        b.ret(None);
    });
    let mut classes = shapes();
    classes.push(main_class([caller, returns_nothing(sink.clone(), public_static())]));
    let result = scanned(classes, KeepInfo::new());
    assert_eq!(
        result.methods.get(&sink),
        &MethodState::Monomorphic(vec![
            ValueState::array(Nullability::DefinitelyNull),
            ValueState::class(
                AbstractValue::Null,
                DynamicType::bounded(ty(SHAPE), Nullability::DefinitelyNull)
            ),
        ])
    );
}
