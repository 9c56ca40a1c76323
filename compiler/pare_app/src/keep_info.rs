//! Entities the program's keep rules pin.
//!
//! A pinned entity is observable from outside the closed world: it may be
//! reached by reflection or called by code the optimizer never sees, so no
//! pass may rename, merge or re-type it.

use std::collections::BTreeSet;

use pare_ir::ir::InvokeKind;
use pare_ir::{FieldRef, MethodRef, TypeRef};
use pare_lens::GraphLens;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeepInfo {
    types: BTreeSet<TypeRef>,
    fields: BTreeSet<FieldRef>,
    methods: BTreeSet<MethodRef>,
}

impl KeepInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin_type(&mut self, ty: TypeRef) {
        self.types.insert(ty);
    }

    pub fn pin_field(&mut self, field: FieldRef) {
        self.fields.insert(field);
    }

    pub fn pin_method(&mut self, method: MethodRef) {
        self.methods.insert(method);
    }

    #[must_use]
    pub fn with_pinned_type(mut self, ty: TypeRef) -> Self {
        self.pin_type(ty);
        self
    }

    #[must_use]
    pub fn with_pinned_method(mut self, method: MethodRef) -> Self {
        self.pin_method(method);
        self
    }

    pub fn is_pinned_type(&self, ty: TypeRef) -> bool {
        self.types.contains(&ty.base_type())
    }

    pub fn is_pinned_field(&self, field: &FieldRef) -> bool {
        self.fields.contains(field)
    }

    pub fn is_pinned_method(&self, method: &MethodRef) -> bool {
        self.methods.contains(method)
    }

    /// Whether `ty` holds a pinned member or is pinned itself.
    pub fn is_pinned_holder(&self, ty: TypeRef) -> bool {
        self.is_pinned_type(ty)
            || self.fields.iter().any(|f| f.holder == ty)
            || self.methods.iter().any(|m| m.holder == ty)
    }

    pub fn pinned_types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.types.iter().copied()
    }

    pub fn pinned_fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.iter()
    }

    pub fn pinned_methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.methods.iter()
    }

    /// The same pins in terms of `lens`, for entities written against `applied`.
    #[must_use]
    pub fn rewritten_with_lens(&self, lens: &GraphLens, applied: &GraphLens) -> KeepInfo {
        KeepInfo {
            types: self
                .types
                .iter()
                .map(|&t| lens.lookup_type(t, applied))
                .collect(),
            fields: self
                .fields
                .iter()
                .map(|&f| lens.lookup_field(f, applied).reference)
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| {
                    lens.lookup_method(m, None, InvokeKind::Direct, applied)
                        .reference
                })
                .collect(),
        }
    }
}
