use pare_app::{AppView, KeepInfo};
use pare_ir::ir::{InvokeKind, IrCode, Op};
use pare_ir::{known, MethodRef, Program, ProgramClass};
use pretty_assertions::assert_eq;

use crate::code::decode;
use crate::test_helpers::{
    app, class, color_enum, field, method, public_static, ty, with_body, COLOR, COLOR_ARRAY, ENUM,
    OBJECT, STRING, USER,
};
use crate::{unboxed_value, EnumUnboxer, Reason, UnboxerOptions, UnboxingResult};

const LOCAL: &str = "Lp/Color$$EnumUnboxingLocalUtility;";
const SHARED: &str = "Lp/$$EnumUnboxingSharedUtility;";

/// `User` with `useRed()`, `describe(Color)` and `all()`.
fn user() -> ProgramClass {
    let mut user = class(USER, OBJECT);
    user.methods.push(with_body(
        method(USER, "useRed", "I", &[]),
        public_static(),
        |b| {
            let red = b.static_get(field(COLOR, "RED", COLOR));
            let ordinal = b
                .invoke(InvokeKind::Virtual, method(ENUM, "ordinal", "I", &[]), vec![red])
                .unwrap();
            b.ret(Some(ordinal));
        },
    ));
    user.methods.push(with_body(
        method(USER, "describe", STRING, &[COLOR]),
        public_static(),
        |b| {
            let c = b.argument(0);
            let name = b
                .invoke(InvokeKind::Virtual, method(COLOR, "name", STRING, &[]), vec![c])
                .unwrap();
            b.ret(Some(name));
        },
    ));
    user.methods.push(with_body(
        method(USER, "all", COLOR_ARRAY, &[]),
        public_static(),
        |b| {
            let values = b
                .invoke(InvokeKind::Static, method(COLOR, "values", COLOR_ARRAY, &[]), vec![])
                .unwrap();
            b.ret(Some(values));
        },
    ));
    user
}

fn unbox(app: &AppView) -> UnboxingResult {
    EnumUnboxer::new(app, &UnboxerOptions::default())
        .run()
        .unwrap()
}

/// Run the unboxer and rewrite every body; the program is in final form.
fn unbox_and_rewrite(app: &AppView) -> (UnboxingResult, Program) {
    let result = unbox(app);
    let rewritten = app.rewritten_with_lens(result.program.clone(), result.lens.clone());
    let (program, stats) = result.rewrite_code(&rewritten).unwrap();
    assert!(stats.rebuilt > 0);
    (result, program)
}

fn body(program: &Program, reference: &MethodRef) -> IrCode {
    let method = program
        .method(reference)
        .unwrap_or_else(|| panic!("{reference} is missing"));
    decode(method).unwrap().unwrap()
}

fn ops(code: &IrCode) -> Vec<Op> {
    code.instructions().map(|(_, insn)| insn.op.clone()).collect()
}

#[test]
fn color_is_unboxed() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let result = unbox(&app);

    assert!(result.report.is_unboxed(ty(COLOR)));
    assert_eq!(result.report.rejected().count(), 0);
    let data = result.enums.get(ty(COLOR)).unwrap();
    let red = data.constant_for_field(&field(COLOR, "RED", COLOR)).unwrap();
    assert_eq!(red.unboxed_value(), 1);
    assert_eq!(unboxed_value(2), 3);
    assert_eq!(result.enums.max_values_size(), 3);
    assert_eq!(result.lens.get_renamed_type(ty(COLOR)), known::int());
    assert!(result.program.contains(ty(SHARED)));
    assert!(result.program.contains(ty(LOCAL)));
    assert!(!result.program.contains(ty(COLOR)));
}

#[test]
fn constant_ordinal_folds_after_rewriting() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let (_, program) = unbox_and_rewrite(&app);

    let use_red = body(&program, &method(USER, "useRed", "I", &[]));
    assert_eq!(ops(&use_red), vec![Op::ConstInt(0)]);
}

#[test]
fn name_calls_are_rewritten_against_the_new_signature() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let (_, program) = unbox_and_rewrite(&app);

    let describe = method(USER, "describe$enumunboxing$", STRING, &["I"]);
    let code = body(&program, &describe);
    assert_eq!(
        ops(&code),
        vec![Op::Invoke {
            kind: InvokeKind::Static,
            method: method(LOCAL, "$name", STRING, &["I"]),
            args: vec![code.arguments[0]],
            is_interface: false,
        }]
    );
}

#[test]
fn values_array_has_room_for_null() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let (_, program) = unbox_and_rewrite(&app);

    let clinit = body(&program, &method(SHARED, "<clinit>", "V", &[]));
    assert_eq!(ops(&clinit).first(), Some(&Op::ConstInt(4)));

    // `all()` returned `Color[]`, so it is renamed along with its return type.
    assert!(program.method(&method(USER, "all", "[I", &[])).is_none());
    let all = body(&program, &method(USER, "all$enumunboxing$", "[I", &[]));
    let all_ops = ops(&all);
    assert_eq!(all_ops[0], Op::ConstInt(3));
    assert!(matches!(
        &all_ops[1],
        Op::Invoke { method: callee, .. } if *callee == method(SHARED, "values", "[I", &["I"])
    ));
}

#[test]
fn constants_are_stored_as_ints() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let (_, program) = unbox_and_rewrite(&app);

    let clinit = body(&program, &method(LOCAL, "<clinit>", "V", &[]));
    let stored: Vec<(String, Op)> = clinit
        .instructions()
        .filter_map(|(_, insn)| match &insn.op {
            Op::StaticPut { field, value } if field.ty == known::int() => {
                let def = clinit
                    .instructions()
                    .find(|(_, i)| i.dest == Some(*value))
                    .map(|(_, i)| i.op.clone())?;
                Some((field.name.to_string(), def))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        stored,
        vec![
            ("RED".to_owned(), Op::ConstInt(1)),
            ("GREEN".to_owned(), Op::ConstInt(2)),
            ("BLUE".to_owned(), Op::ConstInt(3)),
        ]
    );
    assert!(!ops(&clinit)
        .iter()
        .any(|op| matches!(op, Op::NewInstance(_) | Op::NewUnboxedEnumInstance { .. })));
}

#[test]
fn kept_enum_leaves_the_program_alone() {
    let app = app(
        [color_enum(), user()],
        KeepInfo::new().with_pinned_type(ty(COLOR)),
    );
    let result = unbox(&app);

    assert!(!result.report.is_unboxed(ty(COLOR)));
    assert_eq!(result.report.reasons(ty(COLOR)), &[Reason::Pinned]);
    assert!(result.lens.ptr_eq(app.lens()));
    assert!(result.synthesized.is_empty());
    assert!(result.program.contains(ty(COLOR)));

    let (program, stats) = result.rewrite_code(&app).unwrap();
    assert_eq!(stats.skipped, 0);
    assert_eq!(program.len(), app.program().len());
}

#[test]
fn escaping_enum_is_rejected_with_every_reason() {
    let mut leaky = user();
    let leak = method(USER, "leak", OBJECT, &[COLOR]);
    leaky.methods.push(with_body(leak.clone(), public_static(), |b| {
        let c = b.argument(0);
        b.emit_value(Op::ConstClass(ty(COLOR)), known::class());
        b.ret(Some(c));
    }));
    let app = app([color_enum(), leaky], KeepInfo::new());
    let result = unbox(&app);

    assert_eq!(
        result.report.reasons(ty(COLOR)),
        &[Reason::InvalidConstClass, Reason::EscapesToNonEnumContext(leak)]
    );
    assert!(result.enums.is_empty());
}

#[test]
fn runs_are_deterministic() {
    let app = app([color_enum(), user()], KeepInfo::new());
    let (first, first_program) = unbox_and_rewrite(&app);
    let (second, second_program) = unbox_and_rewrite(&app);

    assert_eq!(first.lens.describe(), second.lens.describe());
    assert_eq!(first.synthesized, second.synthesized);
    let types = |program: &Program| program.classes().map(|c| c.ty).collect::<Vec<_>>();
    assert_eq!(types(&first_program), types(&second_program));
    for class in first_program.program_classes() {
        let other = second_program.class(class.ty).unwrap();
        assert_eq!(**class, **other);
    }
}
