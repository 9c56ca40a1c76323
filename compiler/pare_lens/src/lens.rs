//! The graph lens chain.
//!
//! # Architecture
//!
//! A [`GraphLens`] is a shared pointer to one layer. Every layer except the
//! identity root points at the layer beneath it, so the chain is a
//! singly-linked immutable list that many threads read at once.
//!
//! - **Forward lookups** (`lookup_*`) start at the layer a body's code was
//!   written against (its *code lens*) and apply every layer above it, up to
//!   and including `self`. A [`LensNode::ClearCodeRewriting`] layer marks a
//!   point at which every body was rewritten, so forward lookups never pass
//!   below it.
//! - **Renaming** (`get_renamed_*`) applies every layer from the root,
//!   including those below clear layers: it answers "what is this original
//!   entity called now".
//! - **Backward lookups** (`get_original_*`) walk from `self` down to the
//!   root using each layer's representative inverse.

use std::fmt;
use std::sync::Arc;

use pare_ir::ir::InvokeKind;
use pare_ir::{FieldRef, MethodRef, MethodSignature, Proto, TypeRef};
use rustc_hash::FxHashMap;

use crate::changes::PrototypeChanges;
use crate::lookup::{FieldLookupResult, MethodLookupResult};

/// The pass that produced a nested layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LensKind {
    HorizontalClassMerger,
    EnumUnboxing,
    TreeFixer,
    Synthetic,
}

/// One rewrite layer's maps. Built by [`LensBuilder`](crate::LensBuilder).
pub struct NestedLens {
    pub(crate) kind: LensKind,
    pub(crate) previous: GraphLens,
    pub(crate) type_map: FxHashMap<TypeRef, TypeRef>,
    /// New type to the representative old type.
    pub(crate) original_types: FxHashMap<TypeRef, TypeRef>,
    pub(crate) field_map: FxHashMap<FieldRef, FieldRef>,
    pub(crate) original_fields: FxHashMap<FieldRef, FieldRef>,
    pub(crate) method_map: FxHashMap<MethodRef, MethodRef>,
    pub(crate) original_methods: FxHashMap<MethodRef, MethodRef>,
    /// Keyed by the old method: merged constructors pass a different class
    /// id depending on which constructor the call site named.
    pub(crate) call_site_changes: FxHashMap<MethodRef, PrototypeChanges>,
    /// Keyed by the new method.
    pub(crate) definition_changes: FxHashMap<MethodRef, PrototypeChanges>,
    pub(crate) invoke_kinds: FxHashMap<MethodRef, InvokeKind>,
}

impl NestedLens {
    fn map_class(&self, ty: TypeRef) -> TypeRef {
        self.type_map.get(&ty).copied().unwrap_or(ty)
    }

    /// Array-aware forward type mapping.
    pub fn map_type(&self, ty: TypeRef) -> TypeRef {
        if self.type_map.is_empty() {
            return ty;
        }
        ty.map_base(|base| self.map_class(base))
    }

    /// Holders only move to reference types. A member of a class unboxed
    /// into a primitive keeps its holder until a pass moves it explicitly.
    fn map_holder(&self, holder: TypeRef) -> TypeRef {
        let mapped = self.map_class(holder);
        if mapped.is_reference() {
            mapped
        } else {
            holder
        }
    }

    pub fn map_field(&self, field: FieldRef) -> FieldRef {
        if let Some(&mapped) = self.field_map.get(&field) {
            return mapped;
        }
        FieldRef {
            holder: self.map_holder(field.holder),
            name: field.name,
            ty: self.map_type(field.ty),
        }
    }

    pub fn map_method(&self, method: &MethodRef) -> MethodRef {
        if let Some(mapped) = self.method_map.get(method) {
            return mapped.clone();
        }
        MethodRef {
            holder: self.map_holder(method.holder),
            name: method.name,
            proto: self.map_proto(&method.proto),
        }
    }

    pub fn map_proto(&self, proto: &Proto) -> Proto {
        if self.type_map.is_empty() {
            return proto.clone();
        }
        proto.map_types(|t| self.map_type(t))
    }

    fn inverse_class(&self, ty: TypeRef) -> TypeRef {
        self.original_types.get(&ty).copied().unwrap_or(ty)
    }

    pub fn inverse_type(&self, ty: TypeRef) -> TypeRef {
        if self.original_types.is_empty() {
            return ty;
        }
        ty.map_base(|base| self.inverse_class(base))
    }

    pub fn inverse_field(&self, field: FieldRef) -> FieldRef {
        if let Some(&original) = self.original_fields.get(&field) {
            return original;
        }
        FieldRef {
            holder: self.inverse_class(field.holder),
            name: field.name,
            ty: self.inverse_type(field.ty),
        }
    }

    pub fn inverse_method(&self, method: &MethodRef) -> MethodRef {
        if let Some(original) = self.original_methods.get(method) {
            return original.clone();
        }
        MethodRef {
            holder: self.inverse_class(method.holder),
            name: method.name,
            proto: method.proto.map_types(|t| self.inverse_type(t)),
        }
    }

    fn changes_for_call(&self, old: &MethodRef, new: &MethodRef) -> Option<&PrototypeChanges> {
        self.call_site_changes
            .get(old)
            .or_else(|| self.definition_changes.get(new))
    }
}

/// A layer of the chain.
pub enum LensNode {
    Identity,
    Nested(NestedLens),
    /// Every body was rewritten up to `previous`; forward lookups stop here.
    ClearCodeRewriting { previous: GraphLens },
}

/// Shared handle to the top layer of a lens chain.
#[derive(Clone)]
pub struct GraphLens(Arc<LensNode>);

impl Default for GraphLens {
    fn default() -> Self {
        Self::identity()
    }
}

impl GraphLens {
    pub fn identity() -> Self {
        GraphLens(Arc::new(LensNode::Identity))
    }

    pub(crate) fn nested(lens: NestedLens) -> Self {
        GraphLens(Arc::new(LensNode::Nested(lens)))
    }

    /// Push a layer recording that every body now reads in terms of `self`.
    #[must_use]
    pub fn clear_code_rewriting(&self) -> GraphLens {
        GraphLens(Arc::new(LensNode::ClearCodeRewriting {
            previous: self.clone(),
        }))
    }

    pub fn node(&self) -> &LensNode {
        &self.0
    }

    /// Same layer (pointer identity).
    pub fn ptr_eq(&self, other: &GraphLens) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_identity(&self) -> bool {
        matches!(*self.0, LensNode::Identity)
    }

    pub fn is_clear_code_rewriting(&self) -> bool {
        matches!(*self.0, LensNode::ClearCodeRewriting { .. })
    }

    pub fn kind(&self) -> Option<LensKind> {
        match &*self.0 {
            LensNode::Nested(nested) => Some(nested.kind),
            LensNode::Identity | LensNode::ClearCodeRewriting { .. } => None,
        }
    }

    pub fn previous(&self) -> Option<&GraphLens> {
        match &*self.0 {
            LensNode::Identity => None,
            LensNode::Nested(nested) => Some(&nested.previous),
            LensNode::ClearCodeRewriting { previous } => Some(previous),
        }
    }

    /// Layers from `self` down to (and including) the root.
    pub fn layers(&self) -> impl Iterator<Item = &GraphLens> {
        std::iter::successors(Some(self), |l| l.previous())
    }

    /// Number of layers above the identity root.
    pub fn depth(&self) -> usize {
        self.layers().count() - 1
    }

    /// The closest layer of `kind`, without looking below `stop`.
    pub fn find(&self, kind: LensKind, stop: Option<&GraphLens>) -> Option<&GraphLens> {
        self.layers()
            .take_while(|l| !stop.is_some_and(|s| l.ptr_eq(s)))
            .find(|l| l.kind() == Some(kind))
    }

    /// Whether `other` is `self` or one of the layers below it.
    pub fn contains(&self, other: &GraphLens) -> bool {
        self.layers().any(|l| l.ptr_eq(other))
    }

    /// The nested layers from `self` down to `code_lens` (exclusive), or to the
    /// first clear layer, top first.
    fn forward_layers<'a>(&'a self, code_lens: &GraphLens) -> Vec<&'a NestedLens> {
        let mut out = Vec::new();
        for layer in self.layers() {
            if layer.ptr_eq(code_lens) {
                break;
            }
            match &*layer.0 {
                LensNode::Nested(nested) => out.push(nested),
                LensNode::Identity | LensNode::ClearCodeRewriting { .. } => break,
            }
        }
        out
    }

    /// Every nested layer, top first, ignoring clear layers.
    fn all_nested(&self) -> impl Iterator<Item = &NestedLens> {
        self.layers().filter_map(|l| match &*l.0 {
            LensNode::Nested(nested) => Some(nested),
            LensNode::Identity | LensNode::ClearCodeRewriting { .. } => None,
        })
    }

    // ── Forward lookups ─────────────────────────────────────────

    pub fn lookup_type(&self, ty: TypeRef, code_lens: &GraphLens) -> TypeRef {
        self.forward_layers(code_lens)
            .iter()
            .rev()
            .fold(ty, |t, layer| layer.map_type(t))
    }

    pub fn lookup_proto(&self, proto: &Proto, code_lens: &GraphLens) -> Proto {
        self.forward_layers(code_lens)
            .iter()
            .rev()
            .fold(proto.clone(), |p, layer| layer.map_proto(&p))
    }

    /// The field a read or write of `field` now targets. When a layer widened
    /// the field's type, reads need a cast back to the type the code expects.
    pub fn lookup_field(&self, field: FieldRef, code_lens: &GraphLens) -> FieldLookupResult {
        let mut result = FieldLookupResult {
            reference: field,
            read_cast: None,
        };
        for layer in self.forward_layers(code_lens).iter().rev() {
            let expected = layer.map_type(result.read_cast.unwrap_or(result.reference.ty));
            let reference = layer.map_field(result.reference);
            result = FieldLookupResult {
                reference,
                read_cast: (expected != reference.ty).then_some(expected),
            };
        }
        result
    }

    /// The method an invoke of `method` with `kind` now targets, with the
    /// accumulated argument changes call sites must apply.
    ///
    /// `context` is the method containing the call, in terms of `self`.
    pub fn lookup_method(
        &self,
        method: &MethodRef,
        context: Option<&MethodRef>,
        kind: InvokeKind,
        code_lens: &GraphLens,
    ) -> MethodLookupResult {
        let mut result = MethodLookupResult {
            reference: method.clone(),
            invoke_kind: kind,
            prototype_changes: PrototypeChanges::none(),
        };
        for layer in self.forward_layers(code_lens).iter().rev() {
            let reference = layer.map_method(&result.reference);
            let prototype_changes = match layer.changes_for_call(&result.reference, &reference) {
                Some(changes) => result.prototype_changes.combine(changes),
                None => result.prototype_changes,
            };
            let invoke_kind = layer
                .invoke_kinds
                .get(&reference)
                .copied()
                .unwrap_or(result.invoke_kind);
            result = MethodLookupResult {
                reference,
                invoke_kind,
                prototype_changes,
            };
        }
        if result.invoke_kind == InvokeKind::Super
            && context.is_some_and(|c| c.holder == result.reference.holder)
        {
            result.invoke_kind = InvokeKind::Direct;
        }
        result
    }

    /// Changes between the signature a body was written against (at
    /// `code_lens`) and its current signature `method`.
    pub fn lookup_prototype_changes_for_method_definition(
        &self,
        method: &MethodRef,
        code_lens: &GraphLens,
    ) -> PrototypeChanges {
        let mut current = method.clone();
        let mut per_layer = Vec::new();
        for layer in self.forward_layers(code_lens) {
            if let Some(changes) = layer.definition_changes.get(&current) {
                per_layer.push(changes);
            }
            current = layer.inverse_method(&current);
        }
        per_layer
            .into_iter()
            .rev()
            .fold(PrototypeChanges::none(), |acc, c| acc.combine(c))
    }

    /// Signature `method` (in terms of `self`) had at `code_lens`.
    pub fn get_previous_method_signature(
        &self,
        method: &MethodRef,
        code_lens: &GraphLens,
    ) -> MethodRef {
        self.forward_layers(code_lens)
            .iter()
            .fold(method.clone(), |m, layer| layer.inverse_method(&m))
    }

    // ── Renaming ────────────────────────────────────────────────

    pub fn get_renamed_type(&self, original: TypeRef) -> TypeRef {
        let layers: Vec<_> = self.all_nested().collect();
        layers.iter().rev().fold(original, |t, l| l.map_type(t))
    }

    pub fn get_renamed_field(&self, original: FieldRef) -> FieldRef {
        let layers: Vec<_> = self.all_nested().collect();
        layers.iter().rev().fold(original, |f, l| l.map_field(f))
    }

    pub fn get_renamed_method(&self, original: &MethodRef) -> MethodRef {
        let layers: Vec<_> = self.all_nested().collect();
        layers
            .iter()
            .rev()
            .fold(original.clone(), |m, l| l.map_method(&m))
    }

    // ── Backward lookups ────────────────────────────────────────

    pub fn get_original_type(&self, ty: TypeRef) -> TypeRef {
        self.all_nested().fold(ty, |t, l| l.inverse_type(t))
    }

    pub fn get_original_field_signature(&self, field: FieldRef) -> FieldRef {
        self.all_nested().fold(field, |f, l| l.inverse_field(f))
    }

    pub fn get_original_method_signature(&self, method: &MethodRef) -> MethodRef {
        self.all_nested()
            .fold(method.clone(), |m, l| l.inverse_method(&m))
    }

    pub fn get_original_signature(&self, method: &MethodRef) -> MethodSignature {
        self.get_original_method_signature(method).signature()
    }

    // ── Inspection ──────────────────────────────────────────────

    /// Sorted dump of every layer, top first. Equal for equal chains.
    pub fn describe(&self) -> String {
        use std::fmt::Write as _;

        fn sorted<K: Ord + fmt::Display, V: fmt::Display>(
            map: &FxHashMap<K, V>,
        ) -> Vec<String> {
            let mut entries: Vec<(&K, &V)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries
                .into_iter()
                .map(|(k, v)| format!("{k} -> {v}"))
                .collect()
        }

        let mut out = String::new();
        for (depth, layer) in self.layers().enumerate() {
            match &*layer.0 {
                LensNode::Identity => {
                    let _ = writeln!(out, "#{depth} identity");
                }
                LensNode::ClearCodeRewriting { .. } => {
                    let _ = writeln!(out, "#{depth} clear code rewriting");
                }
                LensNode::Nested(nested) => {
                    let _ = writeln!(out, "#{depth} {:?}", nested.kind);
                    let sections = [
                        ("type", sorted(&nested.type_map)),
                        ("original type", sorted(&nested.original_types)),
                        ("field", sorted(&nested.field_map)),
                        ("original field", sorted(&nested.original_fields)),
                        ("method", sorted(&nested.method_map)),
                        ("original method", sorted(&nested.original_methods)),
                    ];
                    for (label, entries) in sections {
                        for entry in entries {
                            let _ = writeln!(out, "  {label} {entry}");
                        }
                    }
                    let mut kinds: Vec<_> = nested.invoke_kinds.iter().collect();
                    kinds.sort_by(|a, b| a.0.cmp(b.0));
                    for (method, kind) in kinds {
                        let _ = writeln!(out, "  invoke {method} {kind:?}");
                    }
                    let mut changes: Vec<_> = nested
                        .call_site_changes
                        .iter()
                        .map(|(m, c)| ("call site", m, c))
                        .chain(
                            nested
                                .definition_changes
                                .iter()
                                .map(|(m, c)| ("definition", m, c)),
                        )
                        .collect();
                    changes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
                    for (label, method, c) in changes {
                        let _ = writeln!(out, "  {label} changes {method} {c:?}");
                    }
                }
            }
        }
        out
    }
}

impl fmt::Debug for GraphLens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layers: Vec<String> = self
            .layers()
            .map(|l| match &*l.0 {
                LensNode::Identity => "Identity".to_owned(),
                LensNode::ClearCodeRewriting { .. } => "Clear".to_owned(),
                LensNode::Nested(nested) => format!("{:?}", nested.kind),
            })
            .collect();
        f.debug_tuple("GraphLens").field(&layers).finish()
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
