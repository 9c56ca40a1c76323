use pare_app::KeepInfo;
use pare_ir::ir::Op;
use pare_ir::{AccessFlags, ProgramField};
use pretty_assertions::assert_eq;

use super::{
    FinalizeMergeGroup, LimitGroupSize, MultiClassPolicy, NoDirectRuntimeTypeChecks, NoEnums,
    NoKeepRules, Policy, PolicyExecutor, SameParentClass, SingleClassPolicy,
};
use crate::group::MergeGroup;
use crate::report::MergeReport;
use crate::test_helpers::{app, class, constructor, field, method, ty, with_body, OBJECT};

fn group(classes: &[&str]) -> MergeGroup {
    MergeGroup::new(classes.iter().map(|c| ty(c)).collect(), false)
}

fn names(groups: &[MergeGroup]) -> Vec<Vec<&'static str>> {
    groups
        .iter()
        .map(|g| g.classes().iter().map(|c| c.descriptor()).collect())
        .collect()
}

#[test]
fn executor_reports_what_each_policy_removed() {
    let mut color = class("Lp/Color;", "Ljava/lang/Enum;");
    color.access |= AccessFlags::ENUM;
    let app = app(
        [
            class("Lp/A;", OBJECT),
            class("Lp/B;", OBJECT),
            class("Lp/C;", OBJECT),
            color,
        ],
        KeepInfo::new().with_pinned_type(ty("Lp/B;")),
    );
    let policies = vec![
        Policy::Single(Box::new(NoKeepRules::new(app.keep_info()))),
        Policy::Single(Box::new(NoEnums)),
    ];
    let mut report = MergeReport::new();
    let groups = PolicyExecutor::new(&app, policies)
        .run(vec![group(&["Lp/A;", "Lp/B;", "Lp/C;", "Lp/Color;"])], &mut report)
        .unwrap();

    assert_eq!(names(&groups), vec![vec!["Lp/A;", "Lp/C;"]]);
    assert_eq!(report.removal_reason(ty("Lp/B;")), Some("NoKeepRules"));
    assert_eq!(report.removal_reason(ty("Lp/Color;")), Some("NoEnums"));
    assert_eq!(report.removal_reason(ty("Lp/A;")), None);
}

#[test]
fn groups_shrunk_to_one_class_are_dropped() {
    let app = app(
        [class("Lp/A;", OBJECT), class("Lp/B;", OBJECT)],
        KeepInfo::new().with_pinned_type(ty("Lp/B;")),
    );
    let policies = vec![Policy::Single(Box::new(NoKeepRules::new(app.keep_info())))];
    let mut report = MergeReport::new();
    let groups = PolicyExecutor::new(&app, policies)
        .run(vec![group(&["Lp/A;", "Lp/B;"])], &mut report)
        .unwrap();

    assert!(groups.is_empty());
    assert_eq!(
        report.removed_by("NoKeepRules").collect::<Vec<_>>(),
        vec![ty("Lp/A;"), ty("Lp/B;")]
    );
}

#[test]
fn classes_in_pinned_signatures_are_not_merged() {
    let keep_info = KeepInfo::new().with_pinned_method(method(
        "Lp/Api;",
        "make",
        "Lp/A;",
        &["[Lp/B;"],
    ));
    let policy = NoKeepRules::new(&keep_info);
    for pinned in ["Lp/Api;", "Lp/A;", "Lp/B;"] {
        assert!(!policy.can_merge(&class(pinned, OBJECT)), "{pinned} is pinned");
    }
    assert!(policy.can_merge(&class("Lp/C;", OBJECT)));
}

#[test]
fn cast_targets_are_evicted() {
    let mut main = class("Lp/Main;", OBJECT);
    main.methods.push(with_body(
        method("Lp/Main;", "cast", "V", &[OBJECT]),
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        |b| {
            let value = b.argument(0);
            b.emit_value(
                Op::CheckCast {
                    value,
                    ty: ty("[Lp/B;"),
                },
                ty("[Lp/B;"),
            );
            b.ret(None);
        },
    ));
    let app = app(
        [
            main,
            class("Lp/A;", OBJECT),
            class("Lp/B;", OBJECT),
            class("Lp/C;", OBJECT),
        ],
        KeepInfo::new(),
    );
    let mut policy = NoDirectRuntimeTypeChecks::new(&app);
    let groups = vec![group(&["Lp/A;", "Lp/B;", "Lp/C;"])];
    policy.preprocess(&groups).unwrap();
    let split: Vec<MergeGroup> = groups.into_iter().flat_map(|g| policy.apply(g)).collect();

    assert_eq!(names(&split), vec![vec!["Lp/B;"], vec!["Lp/A;", "Lp/C;"]]);
}

#[test]
fn different_interfaces_split_groups() {
    let mut a = class("Lp/A;", OBJECT);
    a.interfaces.push(ty("Lp/I;"));
    let mut c = class("Lp/C;", OBJECT);
    c.interfaces.push(ty("Lp/I;"));
    let app = app([a, class("Lp/B;", OBJECT), c], KeepInfo::new());
    let split = SameParentClass::new(&app).apply(group(&["Lp/A;", "Lp/B;", "Lp/C;"]));

    assert_eq!(names(&split), vec![vec!["Lp/A;", "Lp/C;"], vec!["Lp/B;"]]);
}

#[test]
fn large_groups_are_chunked() {
    let split = LimitGroupSize::new(2).apply(group(&["Lp/A;", "Lp/B;", "Lp/C;", "Lp/D;", "Lp/E;"]));
    assert_eq!(
        names(&split),
        vec![vec!["Lp/A;", "Lp/B;"], vec!["Lp/C;", "Lp/D;"], vec!["Lp/E;"]]
    );
}

#[test]
fn class_id_field_avoids_existing_names() {
    let mut a = class("Lp/A;", OBJECT);
    a.fields.push(ProgramField::new(
        field("Lp/A;", "$classId", "I"),
        AccessFlags::PRIVATE,
    ));
    a.methods.push(constructor("Lp/A;", &[]));
    let mut c = class("Lp/C;", OBJECT);
    c.methods.push(constructor("Lp/C;", &[]));
    let app = app([a, c], KeepInfo::new());
    let mut policy = FinalizeMergeGroup::new(&app);
    let groups = vec![group(&["Lp/A;", "Lp/C;"])];
    policy.preprocess(&groups).unwrap();
    let finalized = policy.apply(groups[0].clone());

    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].target(), Some(ty("Lp/A;")));
    assert_eq!(
        finalized[0].class_id_field(),
        Some(field("Lp/A;", "$classId$1", "I"))
    );
    assert_eq!(finalized[0].class_id(ty("Lp/C;")), Some(1));
}
