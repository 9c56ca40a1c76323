//! Policies that look at whole groups.

use std::collections::BTreeSet;

use pare_app::AppView;
use pare_ir::uses::{register_uses, TypeUse, UseRegistry};
use pare_ir::{known, FieldRef, MethodSignature, Name, TypeRef};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use super::MultiClassPolicy;
use crate::error::MergeError;
use crate::fields::relaxed_type;
use crate::group::{MergeGroup, TypeMap};

/// `group` without `evicted`, followed by one singleton group per evicted
/// class so the executor reports them.
fn evict(mut group: MergeGroup, mut evicted: impl FnMut(TypeRef) -> bool) -> Vec<MergeGroup> {
    let removed = group.retain(|c| !evicted(c));
    let mut out = Vec::with_capacity(removed.len() + 1);
    out.extend(removed.into_iter().map(|c| group.with_classes(vec![c])));
    out.push(group);
    out
}

// ── Runtime type checks ─────────────────────────────────────────────

/// Classes whose identity code observes: cast targets, `instanceof`
/// operands, class constants and catch guards.
pub struct NoDirectRuntimeTypeChecks<'a> {
    app: &'a AppView,
    checked: FxHashSet<TypeRef>,
}

impl<'a> NoDirectRuntimeTypeChecks<'a> {
    pub fn new(app: &'a AppView) -> Self {
        NoDirectRuntimeTypeChecks {
            app,
            checked: FxHashSet::default(),
        }
    }
}

struct TypeCheckCollector<'a> {
    candidates: &'a FxHashSet<TypeRef>,
    found: FxHashSet<TypeRef>,
}

impl UseRegistry for TypeCheckCollector<'_> {
    fn register_type(&mut self, ty: TypeRef, use_: TypeUse) {
        let observes_identity = matches!(
            use_,
            TypeUse::ConstClass | TypeUse::CheckCast | TypeUse::InstanceOf | TypeUse::CatchGuard
        );
        let base = ty.base_type();
        if observes_identity && self.candidates.contains(&base) {
            self.found.insert(base);
        }
    }
}

impl MultiClassPolicy for NoDirectRuntimeTypeChecks<'_> {
    fn name(&self) -> &'static str {
        "NoDirectRuntimeTypeChecks"
    }

    fn preprocess(&mut self, groups: &[MergeGroup]) -> Result<(), MergeError> {
        let candidates: FxHashSet<TypeRef> = groups
            .iter()
            .flat_map(|g| g.classes().iter().copied())
            .collect();
        let codes: Vec<_> = self
            .app
            .program()
            .program_classes()
            .flat_map(|c| c.methods.iter())
            .filter_map(|m| m.code.as_ref())
            .collect();
        let found = codes
            .par_iter()
            .map(|code| {
                let mut collector = TypeCheckCollector {
                    candidates: &candidates,
                    found: FxHashSet::default(),
                };
                register_uses(code, &mut collector).map(|()| collector.found)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(MergeError::Scan)?;
        self.checked = found.into_iter().flatten().collect();
        Ok(())
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        evict(group, |c| self.checked.contains(&c))
    }
}

// ── Shape ───────────────────────────────────────────────────────────

/// Members of a merged class must share superclass and interfaces.
pub struct SameParentClass<'a> {
    app: &'a AppView,
}

impl<'a> SameParentClass<'a> {
    pub fn new(app: &'a AppView) -> Self {
        SameParentClass { app }
    }
}

impl MultiClassPolicy for SameParentClass<'_> {
    fn name(&self) -> &'static str {
        "SameParentClass"
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        group.split_by(|ty| {
            self.app.definition_for(ty).map(|class| {
                let interfaces: BTreeSet<TypeRef> = class.interfaces.iter().copied().collect();
                (class.superclass, interfaces)
            })
        })
    }
}

/// Package-private access only works within one package.
pub struct RespectPackageBoundaries;

impl MultiClassPolicy for RespectPackageBoundaries {
    fn name(&self) -> &'static str {
        "RespectPackageBoundaries"
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        group.split_by(TypeRef::package)
    }
}

/// Instance fields must line up once reference types are erased, so that
/// every field of every class finds a slot in the target.
pub struct SameInstanceFields<'a> {
    app: &'a AppView,
}

impl<'a> SameInstanceFields<'a> {
    pub fn new(app: &'a AppView) -> Self {
        SameInstanceFields { app }
    }
}

impl MultiClassPolicy for SameInstanceFields<'_> {
    fn name(&self) -> &'static str {
        "SameInstanceFields"
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        group.split_by(|ty| {
            let mut shape: Vec<TypeRef> = self
                .app
                .definition_for(ty)
                .into_iter()
                .flat_map(|c| c.instance_fields())
                .map(|f| relaxed_type(f.reference.ty))
                .collect();
            shape.sort();
            shape
        })
    }
}

// ── Virtual methods ─────────────────────────────────────────────────

/// Two classes of one group may not declare the same virtual method once
/// the group's classes are identified: the merged class could hold only one
/// of them.
pub struct NoVirtualMethodCollisions<'a> {
    app: &'a AppView,
}

impl<'a> NoVirtualMethodCollisions<'a> {
    pub fn new(app: &'a AppView) -> Self {
        NoVirtualMethodCollisions { app }
    }
}

impl MultiClassPolicy for NoVirtualMethodCollisions<'_> {
    fn name(&self) -> &'static str {
        "NoVirtualMethodCollisions"
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        let type_map = TypeMap::for_group(&group);
        let mut buckets: Vec<(Vec<TypeRef>, FxHashSet<MethodSignature>)> = Vec::new();
        for &ty in group.classes() {
            let signatures: FxHashSet<MethodSignature> = self
                .app
                .definition_for(ty)
                .into_iter()
                .flat_map(|c| c.virtual_methods())
                .map(|m| type_map.map_method(&m.reference).signature())
                .collect();
            match buckets
                .iter_mut()
                .find(|(_, taken)| taken.is_disjoint(&signatures))
            {
                Some((classes, taken)) => {
                    classes.push(ty);
                    taken.extend(signatures);
                }
                None => buckets.push((vec![ty], signatures)),
            }
        }
        buckets
            .into_iter()
            .map(|(classes, _)| group.with_classes(classes))
            .collect()
    }
}

// ── Finalization ────────────────────────────────────────────────────

pub struct LimitGroupSize {
    max: usize,
}

impl LimitGroupSize {
    pub fn new(max: usize) -> Self {
        LimitGroupSize { max: max.max(2) }
    }
}

impl MultiClassPolicy for LimitGroupSize {
    fn name(&self) -> &'static str {
        "LimitGroupSize"
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup> {
        if group.len() <= self.max {
            return vec![group];
        }
        group
            .classes()
            .chunks(self.max)
            .map(|chunk| group.with_classes(chunk.to_vec()))
            .collect()
    }
}

/// Picks the target and decides whether the merged class needs a class id
/// field. It does when constructors of two different classes end up with
/// the same prototype: one dispatching constructor then serves both and
/// takes the class id as an argument.
pub struct FinalizeMergeGroup<'a> {
    app: &'a AppView,
    type_map: TypeMap,
}

impl<'a> FinalizeMergeGroup<'a> {
    pub fn new(app: &'a AppView) -> Self {
        FinalizeMergeGroup {
            app,
            type_map: TypeMap::default(),
        }
    }

    fn needs_class_id(&self, group: &MergeGroup) -> bool {
        if group.is_interface_group() {
            return false;
        }
        let mut owners = FxHashMap::default();
        for &ty in group.classes() {
            let Some(class) = self.app.definition_for(ty) else {
                continue;
            };
            for ctor in class.instance_initializers() {
                let proto = self.type_map.map_proto(&ctor.reference.proto);
                if *owners.entry(proto).or_insert(ty) != ty {
                    return true;
                }
            }
        }
        false
    }

    fn class_id_name(&self, group: &MergeGroup) -> Name {
        let taken: FxHashSet<Name> = group
            .classes()
            .iter()
            .filter_map(|&ty| self.app.definition_for(ty))
            .flat_map(|c| c.fields.iter().map(|f| f.reference.name))
            .collect();
        let base = "$classId";
        let mut name = Name::intern(base);
        let mut counter = 1;
        while taken.contains(&name) {
            name = Name::intern(&format!("{base}${counter}"));
            counter += 1;
        }
        name
    }
}

impl MultiClassPolicy for FinalizeMergeGroup<'_> {
    fn name(&self) -> &'static str {
        "FinalizeMergeGroup"
    }

    fn preprocess(&mut self, groups: &[MergeGroup]) -> Result<(), MergeError> {
        self.type_map = TypeMap::from_groups(groups);
        Ok(())
    }

    fn apply(&self, mut group: MergeGroup) -> Vec<MergeGroup> {
        let Some(&target) = group.classes().first() else {
            return Vec::new();
        };
        group.set_target(target);
        if self.needs_class_id(&group) {
            let field = FieldRef::new(target, self.class_id_name(&group), known::int());
            group.set_class_id_field(field);
        }
        vec![group]
    }
}
