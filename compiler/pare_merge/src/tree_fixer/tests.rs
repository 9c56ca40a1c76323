use pare_app::KeepInfo;
use pare_ir::ir::InvokeKind;
use pare_ir::{known, AccessFlags, Name, TypeRef};
use pare_lens::ExtraParameter;
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use super::{fresh_name, top_down};
use crate::test_helpers::{app, class, constructor, empty, field, method, ty, OBJECT};
use crate::{HorizontalClassMerger, MergerOptions};

#[test]
fn supertypes_come_first() {
    let mut supertypes: FxHashMap<TypeRef, Vec<TypeRef>> = FxHashMap::default();
    supertypes.insert(ty("Lp/Z;"), vec![known::object()]);
    supertypes.insert(ty("Lp/A;"), vec![ty("Lp/Z;"), ty("Lp/I;")]);
    supertypes.insert(ty("Lp/I;"), vec![known::object()]);
    supertypes.insert(known::object(), vec![]);

    assert_eq!(
        top_down(&supertypes),
        vec![known::object(), ty("Lp/I;"), ty("Lp/Z;"), ty("Lp/A;")]
    );
}

#[test]
fn fresh_names_count_up() {
    let taken = [Name::intern("run$1"), Name::intern("run$2")];
    assert_eq!(
        fresh_name(Name::intern("run"), |n| !taken.contains(&n)),
        Name::intern("run$3")
    );
}

#[test]
fn colliding_constructors_of_one_class_get_null_arguments() {
    let mut a = class("Lp/A;", OBJECT);
    a.methods.push(constructor("Lp/A;", &["Lp/A;"]));
    a.methods.push(constructor("Lp/A;", &["Lp/C;"]));
    let c = class("Lp/C;", OBJECT);
    let app = app([a, c], KeepInfo::new());
    let result = HorizontalClassMerger::new(&app, &MergerOptions::default())
        .run()
        .unwrap();

    let argument = ty("Lp/A$$MergedConstructorArgument;");
    let lookup = result.lens.lookup_method(
        &method("Lp/A;", "<init>", "V", &["Lp/C;"]),
        None,
        InvokeKind::Direct,
        app.lens(),
    );
    assert_eq!(
        lookup.reference,
        method(
            "Lp/A;",
            "<init>",
            "V",
            &["Lp/A;", "Lp/A$$MergedConstructorArgument;"]
        )
    );
    assert_eq!(
        lookup.prototype_changes.extra_parameters(),
        &[ExtraParameter::UnusedNull(argument)]
    );
    assert!(result.program.contains(argument));
    assert!(result.synthesized.is_empty());
}

#[test]
fn colliding_static_fields_get_fresh_names() {
    let statics = AccessFlags::PUBLIC | AccessFlags::STATIC;
    let mut a = class("Lp/A;", OBJECT);
    a.fields
        .push(pare_ir::ProgramField::new(field("Lp/A;", "INSTANCE", "Lp/A;"), statics));
    let mut c = class("Lp/C;", OBJECT);
    c.fields
        .push(pare_ir::ProgramField::new(field("Lp/C;", "INSTANCE", "Lp/C;"), statics));
    let app = app([a, c], KeepInfo::new());
    let result = HorizontalClassMerger::new(&app, &MergerOptions::default())
        .run()
        .unwrap();

    let merged = result.program.class(ty("Lp/A;")).unwrap();
    let fields: Vec<_> = merged.static_fields().map(|f| f.reference).collect();
    assert_eq!(
        fields,
        vec![
            field("Lp/A;", "INSTANCE", "Lp/A;"),
            field("Lp/A;", "INSTANCE$1", "Lp/A;"),
        ]
    );
    assert_eq!(
        result
            .lens
            .lookup_field(field("Lp/C;", "INSTANCE", "Lp/C;"), app.lens())
            .reference,
        field("Lp/A;", "INSTANCE$1", "Lp/A;")
    );
}

#[test]
fn renamed_members_are_reachable_through_inheritors() {
    let statics = AccessFlags::PUBLIC | AccessFlags::STATIC;
    let mut a = class("Lp/A;", OBJECT);
    a.methods.push(empty(method("Lp/A;", "of", "V", &["Lp/A;"]), statics));
    let mut c = class("Lp/C;", OBJECT);
    c.methods.push(empty(method("Lp/C;", "of", "V", &["Lp/C;"]), statics));
    let sub = class("Lp/Sub;", "Lp/C;");
    let app = app([a, c, sub], KeepInfo::new());
    let result = HorizontalClassMerger::new(&app, &MergerOptions::default())
        .run()
        .unwrap();

    let lookup = result.lens.lookup_method(
        &method("Lp/Sub;", "of", "V", &["Lp/C;"]),
        None,
        InvokeKind::Static,
        app.lens(),
    );
    assert_eq!(lookup.reference, method("Lp/Sub;", "of$1", "V", &["Lp/A;"]));
}
