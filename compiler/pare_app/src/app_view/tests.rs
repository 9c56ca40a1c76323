use pare_ir::ir::IrBuilder;
use pare_ir::{known, AccessFlags, Program};
use pare_lens::{LensBuilder, LensKind};
use pretty_assertions::assert_eq;

use super::AppView;
use crate::test_helpers::{class, method, object_class, ty, with_body};
use crate::KeepInfo;

fn return_void(b: &mut IrBuilder) {
    b.ret(None);
}

/// `A`, `B extends A implements I`, `C extends A`, unrelated `D`, interface
/// `I` with a default method.
fn sample_app() -> AppView {
    let mut a = class("Lp/A;", "Ljava/lang/Object;");
    a.methods.push(with_body(
        method("Lp/A;", "m", "V", &[]),
        AccessFlags::PUBLIC,
        return_void,
    ));
    let mut b = class("Lp/B;", "Lp/A;");
    b.interfaces.push(ty("Lp/I;"));
    let mut i = class("Lp/I;", "Ljava/lang/Object;");
    i.access = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
    i.methods.push(with_body(
        method("Lp/I;", "n", "V", &[]),
        AccessFlags::PUBLIC,
        return_void,
    ));
    let program: Program = [
        object_class(),
        a,
        b,
        class("Lp/C;", "Lp/A;"),
        class("Lp/D;", "Ljava/lang/Object;"),
        i,
    ]
    .into_iter()
    .collect();
    AppView::new(program, KeepInfo::new())
}

#[test]
fn subtyping_follows_classes_interfaces_and_arrays() {
    let app = sample_app();
    assert!(app.is_subtype(ty("Lp/B;"), ty("Lp/A;")));
    assert!(!app.is_subtype(ty("Lp/A;"), ty("Lp/B;")));
    assert!(app.is_subtype(ty("Lp/B;"), ty("Lp/I;")));
    assert!(app.is_subtype(ty("[Lp/B;"), ty("[Lp/A;")));
    assert!(app.is_subtype(ty("[I"), known::object()));
    assert!(!app.is_subtype(ty("[I"), ty("[Ljava/lang/Object;")));
    assert!(!app.is_subtype(known::int(), known::object()));
}

#[test]
fn least_upper_bound_ignores_interfaces() {
    let app = sample_app();
    assert_eq!(app.least_upper_bound(ty("Lp/B;"), ty("Lp/C;")), ty("Lp/A;"));
    assert_eq!(app.least_upper_bound(ty("Lp/B;"), ty("Lp/A;")), ty("Lp/A;"));
    assert_eq!(app.least_upper_bound(ty("Lp/B;"), ty("Lp/D;")), known::object());
    assert_eq!(
        app.least_upper_bound(ty("[Lp/B;"), ty("[Lp/C;")),
        ty("[Lp/A;")
    );
    assert_eq!(app.least_upper_bound(ty("[I"), ty("[J")), known::object());
}

#[test]
fn superclass_chain_is_nearest_first() {
    let app = sample_app();
    assert_eq!(
        app.superclass_chain(ty("Lp/B;")),
        vec![ty("Lp/A;"), known::object()]
    );
    assert!(app.superclass_chain(known::object()).is_empty());
    assert!(app.has_subtypes(ty("Lp/A;")));
    assert!(!app.has_subtypes(ty("Lp/C;")));
}

#[test]
fn methods_resolve_through_superclasses_then_interfaces() {
    let app = sample_app();
    let inherited = app.resolve_method(&method("Lp/B;", "m", "V", &[]));
    assert_eq!(
        inherited.map(|m| m.reference.holder),
        Some(ty("Lp/A;"))
    );
    let default = app.resolve_method(&method("Lp/B;", "n", "V", &[]));
    assert_eq!(default.map(|m| m.reference.holder), Some(ty("Lp/I;")));
    assert!(app.resolve_method(&method("Lp/C;", "n", "V", &[])).is_none());
}

#[test]
fn program_definitions_exclude_library_classes() {
    let app = sample_app();
    assert!(app.definition_for(known::object()).is_some());
    assert!(app.program_definition_for(known::object()).is_none());
    assert!(app.program_definition_for(ty("Lp/D;")).is_some());
}

#[test]
fn committing_a_lens_carries_keep_info_and_leaves_code_lens() {
    let app = sample_app().with_keep_info(KeepInfo::new().with_pinned_type(ty("Lp/C;")));
    let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
    builder.move_type(ty("Lp/C;"), ty("Lp/B;"));
    let lens = builder.build(app.lens()).unwrap_or_else(|e| panic!("{e}"));
    let mut program = app.program().clone();
    program.remove(ty("Lp/C;"));

    let next = app.rewritten_with_lens(program, lens);
    assert!(next.keep_info().is_pinned_type(ty("Lp/B;")));
    assert!(next.code_lens().is_identity());
    assert!(!next.has_subtypes(ty("Lp/B;")));
    assert_eq!(next.lens().lookup_type(ty("Lp/C;"), next.code_lens()), ty("Lp/B;"));

    let cleared = next.with_cleared_code_rewriting(next.program().clone());
    assert!(cleared.code_lens().ptr_eq(cleared.lens()));
}
