use pare_app::KeepInfo;
use pretty_assertions::assert_eq;

use super::{DynamicType, Nullability};
use crate::test_helpers::{app, shapes, ty, CIRCLE, OBJECT, SHAPE, SQUARE};

#[test]
fn nullability_joins_to_maybe_null() {
    assert_eq!(
        Nullability::Bottom.join(Nullability::DefinitelyNull),
        Nullability::DefinitelyNull
    );
    assert_eq!(
        Nullability::DefinitelyNull.join(Nullability::DefinitelyNotNull),
        Nullability::MaybeNull
    );
}

#[test]
fn distinct_exact_types_meet_at_their_superclass() {
    let app = app(shapes(), KeepInfo::new());
    let joined = DynamicType::exact(ty(CIRCLE)).join(DynamicType::exact(ty(SQUARE)), &app);
    assert_eq!(
        joined,
        DynamicType::bounded(ty(SHAPE), Nullability::DefinitelyNotNull)
    );
    let same = DynamicType::exact(ty(CIRCLE)).join(DynamicType::exact(ty(CIRCLE)), &app);
    assert!(same.is_exact());
}

#[test]
fn bounds_no_tighter_than_the_static_type_widen() {
    let app = app(shapes(), KeepInfo::new());
    let maybe_shape = DynamicType::bounded(ty(SHAPE), Nullability::MaybeNull);
    assert_eq!(maybe_shape.widen(&app, ty(SHAPE)), DynamicType::Unknown);
    let non_null_shape = maybe_shape.with_nullability(Nullability::DefinitelyNotNull);
    assert_eq!(non_null_shape.widen(&app, ty(SHAPE)), non_null_shape);
    assert_eq!(
        DynamicType::bounded(ty(OBJECT), Nullability::MaybeNull).widen(&app, ty(SHAPE)),
        DynamicType::Unknown
    );
    let circle = DynamicType::exact(ty(CIRCLE));
    assert_eq!(circle.widen(&app, ty(SHAPE)), circle);
}

#[test]
fn receivers_bounded_by_their_holder_are_unknown() {
    assert_eq!(
        DynamicType::bounded(ty(SHAPE), Nullability::DefinitelyNotNull).widen_receiver(ty(SHAPE)),
        DynamicType::Unknown
    );
    let exact = DynamicType::exact(ty(SHAPE));
    assert_eq!(exact.widen_receiver(ty(SHAPE)), exact);
}

#[test]
fn casts_narrow_to_the_target() {
    let app = app(shapes(), KeepInfo::new());
    assert_eq!(
        DynamicType::Unknown.cast(&app, ty(CIRCLE)),
        DynamicType::bounded(ty(CIRCLE), Nullability::MaybeNull)
    );
    let circle = DynamicType::exact(ty(CIRCLE));
    assert_eq!(circle.cast(&app, ty(SHAPE)), circle);
}
