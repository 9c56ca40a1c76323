//! Policies that judge one class at a time.

use pare_app::KeepInfo;
use pare_ir::{ProgramClass, TypeRef};
use rustc_hash::FxHashSet;

use super::SingleClassPolicy;

/// Classes observable from outside the program keep their identity: pinned
/// classes, holders of pinned members and classes named in the signature of
/// a pinned member.
pub struct NoKeepRules {
    pinned: FxHashSet<TypeRef>,
}

impl NoKeepRules {
    pub fn new(keep_info: &KeepInfo) -> Self {
        let mut pinned: FxHashSet<TypeRef> = keep_info.pinned_types().collect();
        let mut add = |ty: TypeRef| {
            let base = ty.base_type();
            if base.is_class() {
                pinned.insert(base);
            }
        };
        for field in keep_info.pinned_fields() {
            add(field.holder);
            add(field.ty);
        }
        for method in keep_info.pinned_methods() {
            add(method.holder);
            method.proto.types().for_each(&mut add);
        }
        NoKeepRules { pinned }
    }
}

impl SingleClassPolicy for NoKeepRules {
    fn name(&self) -> &'static str {
        "NoKeepRules"
    }

    fn can_merge(&self, class: &ProgramClass) -> bool {
        !self.pinned.contains(&class.ty)
    }
}

pub struct NoEnums;

impl SingleClassPolicy for NoEnums {
    fn name(&self) -> &'static str {
        "NoEnums"
    }

    fn can_merge(&self, class: &ProgramClass) -> bool {
        !class.is_enum()
    }
}

/// Annotation types, and classes carrying annotations that may be read
/// reflectively.
pub struct NoAnnotations;

impl SingleClassPolicy for NoAnnotations {
    fn name(&self) -> &'static str {
        "NoAnnotations"
    }

    fn can_merge(&self, class: &ProgramClass) -> bool {
        !class.is_annotation() && class.annotations.is_empty()
    }
}

/// Merging would run every class initializer of the group at once.
pub struct NoClassInitializers;

impl SingleClassPolicy for NoClassInitializers {
    fn name(&self) -> &'static str {
        "NoClassInitializers"
    }

    fn can_merge(&self, class: &ProgramClass) -> bool {
        class.class_initializer().is_none()
    }
}
