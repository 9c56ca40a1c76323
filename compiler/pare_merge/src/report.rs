//! What the merger did and why it left classes alone.

use std::collections::{BTreeMap, BTreeSet};

use pare_ir::TypeRef;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Target to the classes merged into it.
    merged: BTreeMap<TypeRef, Vec<TypeRef>>,
    /// Policy name to the classes it kept out of every group.
    removed: BTreeMap<&'static str, BTreeSet<TypeRef>>,
}

impl MergeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_removed(&mut self, policy: &'static str, classes: &[TypeRef]) {
        if classes.is_empty() {
            return;
        }
        tracing::debug!(policy, count = classes.len(), "policy removed merge candidates");
        for &class in classes {
            tracing::trace!(policy, %class, "not merged");
        }
        self.removed
            .entry(policy)
            .or_default()
            .extend(classes.iter().copied());
    }

    pub(crate) fn record_merged(&mut self, target: TypeRef, sources: Vec<TypeRef>) {
        self.merged.insert(target, sources);
    }

    pub fn merged_groups(&self) -> impl Iterator<Item = (TypeRef, &[TypeRef])> {
        self.merged.iter().map(|(&t, s)| (t, s.as_slice()))
    }

    /// Classes merged away, over all groups.
    pub fn merged_class_count(&self) -> usize {
        self.merged.values().map(Vec::len).sum()
    }

    pub fn is_merged(&self, ty: TypeRef) -> bool {
        self.merged.values().any(|s| s.contains(&ty))
    }

    /// The policy that kept `ty` from being merged, if any.
    pub fn removal_reason(&self, ty: TypeRef) -> Option<&'static str> {
        self.removed
            .iter()
            .find(|(_, classes)| classes.contains(&ty))
            .map(|(&policy, _)| policy)
    }

    pub fn removed_by(&self, policy: &str) -> impl Iterator<Item = TypeRef> + '_ {
        self.removed
            .get(policy)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }
}
