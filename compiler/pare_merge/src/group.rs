//! Merge groups and the type map they induce.

use pare_ir::{FieldRef, MethodRef, Proto, TypeRef};
use rustc_hash::FxHashMap;

/// Classes to be fused into one target.
///
/// Classes are kept in type order. Policies shrink and split groups; once
/// [`FinalizeMergeGroup`](crate::policies::FinalizeMergeGroup) ran, the first
/// class is the target and class ids are positions in the group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeGroup {
    classes: Vec<TypeRef>,
    is_interface_group: bool,
    target: Option<TypeRef>,
    class_id_field: Option<FieldRef>,
}

impl MergeGroup {
    pub fn new(mut classes: Vec<TypeRef>, is_interface_group: bool) -> Self {
        classes.sort();
        classes.dedup();
        MergeGroup {
            classes,
            is_interface_group,
            target: None,
            class_id_field: None,
        }
    }

    pub fn classes(&self) -> &[TypeRef] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Fewer than two classes: merging would do nothing.
    pub fn is_trivial(&self) -> bool {
        self.classes.len() < 2
    }

    pub fn is_interface_group(&self) -> bool {
        self.is_interface_group
    }

    pub fn contains(&self, ty: TypeRef) -> bool {
        self.classes.binary_search(&ty).is_ok()
    }

    pub fn target(&self) -> Option<TypeRef> {
        self.target
    }

    /// Every class but the target.
    pub fn sources(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.classes
            .iter()
            .copied()
            .filter(move |&c| Some(c) != self.target)
    }

    pub fn class_id_field(&self) -> Option<FieldRef> {
        self.class_id_field
    }

    /// Runtime discriminator of `ty` within the merged class.
    pub fn class_id(&self, ty: TypeRef) -> Option<i32> {
        let index = self.classes.iter().position(|&c| c == ty)?;
        i32::try_from(index).ok()
    }

    pub(crate) fn set_target(&mut self, target: TypeRef) {
        debug_assert!(self.contains(target));
        self.target = Some(target);
    }

    pub(crate) fn set_class_id_field(&mut self, field: FieldRef) {
        self.class_id_field = Some(field);
    }

    /// A group of the same kind holding `classes`.
    pub(crate) fn with_classes(&self, classes: Vec<TypeRef>) -> MergeGroup {
        MergeGroup::new(classes, self.is_interface_group)
    }

    /// Drop the classes `keep` rejects and return them.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(TypeRef) -> bool) -> Vec<TypeRef> {
        let mut removed = Vec::new();
        self.classes.retain(|&c| {
            let kept = keep(c);
            if !kept {
                removed.push(c);
            }
            kept
        });
        removed
    }

    /// Split into subgroups of classes with equal keys, in order of first
    /// appearance.
    pub(crate) fn split_by<K: Eq + std::hash::Hash>(
        &self,
        mut key: impl FnMut(TypeRef) -> K,
    ) -> Vec<MergeGroup> {
        let mut index: FxHashMap<K, usize> = FxHashMap::default();
        let mut parts: Vec<Vec<TypeRef>> = Vec::new();
        for &class in &self.classes {
            let slot = *index.entry(key(class)).or_insert_with(|| {
                parts.push(Vec::new());
                parts.len() - 1
            });
            parts[slot].push(class);
        }
        parts.into_iter().map(|p| self.with_classes(p)).collect()
    }
}

// ── Type map ────────────────────────────────────────────────────────

/// Where every merged class goes.
#[derive(Clone, Debug, Default)]
pub struct TypeMap {
    targets: FxHashMap<TypeRef, TypeRef>,
}

impl TypeMap {
    /// Every class of every group mapped to its group's first class.
    pub fn from_groups(groups: &[MergeGroup]) -> Self {
        let mut targets = FxHashMap::default();
        for group in groups {
            let Some(&target) = group.classes().first() else {
                continue;
            };
            for &class in group.classes() {
                if class != target {
                    targets.insert(class, target);
                }
            }
        }
        TypeMap { targets }
    }

    /// Map for one group alone.
    pub fn for_group(group: &MergeGroup) -> Self {
        Self::from_groups(std::slice::from_ref(group))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Whether `ty` is merged into another class.
    pub fn is_source(&self, ty: TypeRef) -> bool {
        self.targets.contains_key(&ty)
    }

    fn map_class(&self, ty: TypeRef) -> TypeRef {
        self.targets.get(&ty).copied().unwrap_or(ty)
    }

    /// Array-aware mapping.
    pub fn map(&self, ty: TypeRef) -> TypeRef {
        if self.targets.is_empty() {
            return ty;
        }
        ty.map_base(|base| self.map_class(base))
    }

    pub fn map_proto(&self, proto: &Proto) -> Proto {
        proto.map_types(|t| self.map(t))
    }

    pub fn map_field(&self, field: FieldRef) -> FieldRef {
        FieldRef {
            holder: self.map(field.holder),
            name: field.name,
            ty: self.map(field.ty),
        }
    }

    pub fn map_method(&self, method: &MethodRef) -> MethodRef {
        MethodRef {
            holder: self.map(method.holder),
            name: method.name,
            proto: self.map_proto(&method.proto),
        }
    }
}
