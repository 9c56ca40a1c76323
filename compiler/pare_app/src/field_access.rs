//! Which methods read and write each field.
//!
//! Computed once by scanning every body in parallel, then carried through
//! later passes by rewriting it through each new lens layer. Passes that
//! synthesize field accesses record them with a [`FieldAccessInfoModifier`].

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use pare_ir::ir::InvokeKind;
use pare_ir::lir::LirError;
use pare_ir::uses::{register_uses, FieldAccess, UseRegistry};
use pare_ir::{FieldRef, MethodRef, Program};
use pare_lens::GraphLens;
use rayon::prelude::*;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldAccessInfo {
    readers: BTreeSet<MethodRef>,
    writers: BTreeSet<MethodRef>,
}

impl FieldAccessInfo {
    pub fn is_read(&self) -> bool {
        !self.readers.is_empty()
    }

    pub fn is_written(&self) -> bool {
        !self.writers.is_empty()
    }

    pub fn readers(&self) -> impl Iterator<Item = &MethodRef> {
        self.readers.iter()
    }

    pub fn writers(&self) -> impl Iterator<Item = &MethodRef> {
        self.writers.iter()
    }

    /// Every write happens in an initializer of the field's holder.
    pub fn is_written_only_in_initializers(&self, field: &FieldRef) -> bool {
        self.writers.iter().all(|m| {
            m.holder == field.holder && (m.is_instance_initializer() || m.is_class_initializer())
        })
    }

    fn merge(&mut self, other: FieldAccessInfo) {
        self.readers.extend(other.readers);
        self.writers.extend(other.writers);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldAccessInfoCollection {
    infos: BTreeMap<FieldRef, FieldAccessInfo>,
}

struct Collector<'a> {
    method: &'a MethodRef,
    infos: &'a DashMap<FieldRef, FieldAccessInfo>,
}

impl UseRegistry for Collector<'_> {
    fn register_field(&mut self, field: FieldRef, access: FieldAccess) {
        let mut info = self.infos.entry(field).or_default();
        let set = if access.is_read() {
            &mut info.readers
        } else {
            &mut info.writers
        };
        set.insert(self.method.clone());
    }
}

impl FieldAccessInfoCollection {
    /// Scan every program method body.
    pub fn compute(program: &Program) -> Result<Self, LirError> {
        let infos: DashMap<FieldRef, FieldAccessInfo> = DashMap::new();
        let methods: Vec<_> = program
            .program_classes()
            .flat_map(|c| c.methods.iter())
            .filter_map(|m| m.code.as_ref().map(|code| (&m.reference, code)))
            .collect();
        methods.par_iter().try_for_each(|(method, code)| {
            let mut collector = Collector {
                method,
                infos: &infos,
            };
            register_uses(code, &mut collector)
        })?;
        let infos: BTreeMap<_, _> = infos.into_iter().collect();
        tracing::debug!(
            methods = methods.len(),
            fields = infos.len(),
            "computed field access info"
        );
        Ok(FieldAccessInfoCollection { infos })
    }

    pub fn get(&self, field: &FieldRef) -> Option<&FieldAccessInfo> {
        self.infos.get(field)
    }

    pub fn is_read(&self, field: &FieldRef) -> bool {
        self.get(field).is_some_and(FieldAccessInfo::is_read)
    }

    pub fn is_written(&self, field: &FieldRef) -> bool {
        self.get(field).is_some_and(FieldAccessInfo::is_written)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldRef, &FieldAccessInfo)> {
        self.infos.iter()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// The same accesses in terms of `lens`. Fields merged into one target
    /// share the union of their accesses.
    #[must_use]
    pub fn rewritten_with_lens(&self, lens: &GraphLens, applied: &GraphLens) -> Self {
        let map_method = |m: &MethodRef| {
            lens.lookup_method(m, None, InvokeKind::Direct, applied)
                .reference
        };
        let mut infos: BTreeMap<FieldRef, FieldAccessInfo> = BTreeMap::new();
        for (field, info) in &self.infos {
            let rewritten = FieldAccessInfo {
                readers: info.readers.iter().map(map_method).collect(),
                writers: info.writers.iter().map(map_method).collect(),
            };
            let target = lens.lookup_field(*field, applied).reference;
            infos.entry(target).or_default().merge(rewritten);
        }
        FieldAccessInfoCollection { infos }
    }
}

/// Accesses a pass adds in code it synthesizes.
#[derive(Debug, Default)]
pub struct FieldAccessInfoModifier {
    added: BTreeMap<FieldRef, FieldAccessInfo>,
}

impl FieldAccessInfoModifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&mut self, field: FieldRef, context: MethodRef) {
        self.added.entry(field).or_default().readers.insert(context);
    }

    pub fn record_write(&mut self, field: FieldRef, context: MethodRef) {
        self.added.entry(field).or_default().writers.insert(context);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    #[must_use]
    pub fn apply(self, collection: &FieldAccessInfoCollection) -> FieldAccessInfoCollection {
        let mut infos = collection.infos.clone();
        for (field, info) in self.added {
            infos.entry(field).or_default().merge(info);
        }
        FieldAccessInfoCollection { infos }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
