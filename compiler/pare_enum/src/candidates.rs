//! Structural eligibility of enum classes.

use std::collections::BTreeSet;

use pare_app::AppView;
use pare_ir::{AccessFlags, ProgramClass, TypeRef};

use crate::members::{is_constant_field, is_values_field};
use crate::report::{Reason, Reasons};
use crate::unboxer::UnboxerOptions;

/// Every program enum still worth analyzing. Structural failures are
/// recorded in `reasons`; with early exit, enums that failed are left out.
pub(crate) fn analyze_candidates(
    app: &AppView,
    options: &UnboxerOptions,
    reasons: &mut Reasons,
) -> BTreeSet<TypeRef> {
    let mut enums: Vec<&ProgramClass> = Vec::new();
    for class in app.program().program_classes() {
        if class.is_enum() {
            enums.push(class);
        } else if class.access.contains(AccessFlags::ENUM) {
            // Constant bodies and other enums that do not extend `Enum` directly.
            reasons.add(class.ty, Reason::SubtypesPresent);
        }
    }
    for class in &enums {
        check_class(app, class, options, reasons);
    }
    let candidates: BTreeSet<TypeRef> = enums.iter().map(|c| c.ty).collect();
    reject_annotation_values(app, &candidates, reasons);
    reject_pinned_api(app, &candidates, reasons);
    candidates
        .into_iter()
        .filter(|&ty| !reasons.is_settled(ty))
        .collect()
}

fn check_class(app: &AppView, class: &ProgramClass, options: &UnboxerOptions, reasons: &mut Reasons) {
    let ty = class.ty;
    let keep_info = app.keep_info();
    if keep_info.is_pinned_type(ty) {
        reasons.add(ty, Reason::Pinned);
    }
    if app.has_subtypes(ty) {
        reasons.add(ty, Reason::SubtypesPresent);
    }
    let instance_fields = class.instance_fields().count();
    if instance_fields > options.max_instance_fields {
        reasons.add(ty, Reason::TooManyInstanceFields(instance_fields));
    }
    for field in &class.fields {
        if field.is_static()
            && !is_constant_field(field, ty)
            && !is_values_field(field, ty)
            && app.field_access_info().is_read(&field.reference)
        {
            reasons.add(ty, Reason::UnexpectedStaticField(field.reference));
        }
    }
    for method in &class.methods {
        if method.is_instance_initializer() && method.info.instance_initializer.is_none() {
            reasons.add(
                ty,
                Reason::UnsupportedInstanceInitializer(method.reference.clone()),
            );
        }
    }
}

/// Annotations cannot hold an unboxed value.
fn reject_annotation_values(app: &AppView, candidates: &BTreeSet<TypeRef>, reasons: &mut Reasons) {
    for annotation in app.program().classes().filter(|c| c.is_annotation()) {
        for method in &annotation.methods {
            let returned = method.reference.proto.return_type.base_type();
            if candidates.contains(&returned) {
                reasons.add(returned, Reason::UsedInAnnotation(annotation.ty));
            }
        }
    }
}

/// Kept members must keep their prototypes and field types, so no enum they
/// mention can become an `int`. Members of the enum itself are exempt: they
/// move to the local utility class along with the enum.
fn reject_pinned_api(app: &AppView, candidates: &BTreeSet<TypeRef>, reasons: &mut Reasons) {
    let keep_info = app.keep_info();
    for method in keep_info.pinned_methods() {
        for ty in method.proto.types().map(TypeRef::base_type) {
            if candidates.contains(&ty) && method.holder != ty {
                reasons.add(ty, Reason::InPinnedSignature(method.clone()));
            }
        }
    }
    for field in keep_info.pinned_fields() {
        let ty = field.ty.base_type();
        if candidates.contains(&ty) && field.holder != ty {
            reasons.add(ty, Reason::InPinnedField(*field));
        }
    }
}
