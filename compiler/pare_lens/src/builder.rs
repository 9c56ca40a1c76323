//! Accumulating one lens layer.

use pare_ir::ir::InvokeKind;
use pare_ir::{FieldRef, MethodRef, TypeRef};
use rustc_hash::FxHashMap;

use crate::changes::PrototypeChanges;
use crate::lens::{GraphLens, LensKind, NestedLens};

/// Inconsistent moves recorded into a [`LensBuilder`].
///
/// Debug builds assert at the offending `move_*` call; release builds report
/// the first conflict from [`LensBuilder::build`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LensError {
    #[error("type {from} moved to both {first} and {second}")]
    ConflictingTypeMove {
        from: TypeRef,
        first: TypeRef,
        second: TypeRef,
    },
    #[error("field {from} moved to both {first} and {second}")]
    ConflictingFieldMove {
        from: FieldRef,
        first: FieldRef,
        second: FieldRef,
    },
    #[error("method {from} moved to both {first} and {second}")]
    ConflictingMethodMove {
        from: MethodRef,
        first: MethodRef,
        second: MethodRef,
    },
}

/// Records the renames of one pass and builds them into a layer.
///
/// Moves may be many-to-one. The inverse of a merged target is the first
/// source moved into it unless a representative is set explicitly. Moving
/// an entity onto itself only pins it as its own representative.
///
/// Confined to the pass that owns it; only the built lens is shared.
pub struct LensBuilder {
    kind: LensKind,
    type_map: FxHashMap<TypeRef, TypeRef>,
    original_types: FxHashMap<TypeRef, TypeRef>,
    field_map: FxHashMap<FieldRef, FieldRef>,
    original_fields: FxHashMap<FieldRef, FieldRef>,
    method_map: FxHashMap<MethodRef, MethodRef>,
    original_methods: FxHashMap<MethodRef, MethodRef>,
    call_site_changes: FxHashMap<MethodRef, PrototypeChanges>,
    definition_changes: FxHashMap<MethodRef, PrototypeChanges>,
    invoke_kinds: FxHashMap<MethodRef, InvokeKind>,
    conflict: Option<LensError>,
}

impl LensBuilder {
    pub fn new(kind: LensKind) -> Self {
        LensBuilder {
            kind,
            type_map: FxHashMap::default(),
            original_types: FxHashMap::default(),
            field_map: FxHashMap::default(),
            original_fields: FxHashMap::default(),
            method_map: FxHashMap::default(),
            original_methods: FxHashMap::default(),
            call_site_changes: FxHashMap::default(),
            definition_changes: FxHashMap::default(),
            invoke_kinds: FxHashMap::default(),
            conflict: None,
        }
    }

    pub fn kind(&self) -> LensKind {
        self.kind
    }

    fn report(&mut self, error: LensError) {
        debug_assert!(false, "{error}");
        self.conflict.get_or_insert(error);
    }

    // ── Moves ───────────────────────────────────────────────────

    pub fn move_type(&mut self, from: TypeRef, to: TypeRef) {
        if from != to {
            if let Some(&first) = self.type_map.get(&from) {
                if first != to {
                    self.report(LensError::ConflictingTypeMove {
                        from,
                        first,
                        second: to,
                    });
                }
                return;
            }
            self.type_map.insert(from, to);
        }
        // A primitive target is shared by every type unboxed into it and has
        // no single original.
        if to.is_reference() {
            self.original_types.entry(to).or_insert(from);
        }
    }

    pub fn move_field(&mut self, from: FieldRef, to: FieldRef) {
        if from != to {
            if let Some(&first) = self.field_map.get(&from) {
                if first != to {
                    self.report(LensError::ConflictingFieldMove {
                        from,
                        first,
                        second: to,
                    });
                }
                return;
            }
            self.field_map.insert(from, to);
        }
        self.original_fields.entry(to).or_insert(from);
    }

    pub fn move_method(&mut self, from: MethodRef, to: MethodRef) {
        if from != to {
            if let Some(first) = self.method_map.get(&from) {
                if *first != to {
                    let first = first.clone();
                    self.report(LensError::ConflictingMethodMove {
                        from,
                        first,
                        second: to,
                    });
                }
                return;
            }
            self.method_map.insert(from.clone(), to.clone());
        }
        self.original_methods.entry(to).or_insert(from);
    }

    // ── Representatives ─────────────────────────────────────────

    pub fn set_representative_type(&mut self, new: TypeRef, original: TypeRef) {
        self.original_types.insert(new, original);
    }

    pub fn set_representative_field(&mut self, new: FieldRef, original: FieldRef) {
        self.original_fields.insert(new, original);
    }

    /// Also used for backward-only renames: a method body that moved to
    /// `new` while call sites of `original` go elsewhere.
    pub fn set_representative_method(&mut self, new: MethodRef, original: MethodRef) {
        self.original_methods.insert(new, original);
    }

    // ── Call-site rewriting ─────────────────────────────────────

    /// Changes every call naming `old` applies.
    pub fn record_call_site_changes(&mut self, old: MethodRef, changes: PrototypeChanges) {
        if !changes.is_empty() {
            self.call_site_changes.insert(old, changes);
        }
    }

    /// Changes between the previous and the current definition of `new`.
    /// Also applied at call sites that have no call-site specific changes.
    pub fn record_prototype_changes(&mut self, new: MethodRef, changes: PrototypeChanges) {
        if !changes.is_empty() {
            self.definition_changes.insert(new, changes);
        }
    }

    pub fn record_invoke_kind(&mut self, new: MethodRef, kind: InvokeKind) {
        self.invoke_kinds.insert(new, kind);
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn type_target(&self, ty: TypeRef) -> Option<TypeRef> {
        self.type_map.get(&ty).copied()
    }

    pub fn field_target(&self, field: FieldRef) -> Option<FieldRef> {
        self.field_map.get(&field).copied()
    }

    pub fn method_target(&self, method: &MethodRef) -> Option<&MethodRef> {
        self.method_map.get(method)
    }

    /// Nothing but self-moves was recorded.
    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty()
            && self.field_map.is_empty()
            && self.method_map.is_empty()
            && self.call_site_changes.is_empty()
            && self.definition_changes.is_empty()
            && self.invoke_kinds.is_empty()
            && self.original_types.iter().all(|(k, v)| k == v)
            && self.original_fields.iter().all(|(k, v)| k == v)
            && self.original_methods.iter().all(|(k, v)| k == v)
    }

    /// Build the layer on top of `previous`. An empty builder returns
    /// `previous` itself, so passes that change nothing add no layer.
    pub fn build(mut self, previous: &GraphLens) -> Result<GraphLens, LensError> {
        if let Some(conflict) = self.conflict {
            return Err(conflict);
        }
        if self.is_empty() {
            return Ok(previous.clone());
        }
        self.original_types.retain(|k, v| k != v);
        self.original_fields.retain(|k, v| k != v);
        self.original_methods.retain(|k, v| k != v);
        tracing::debug!(
            kind = ?self.kind,
            types = self.type_map.len(),
            fields = self.field_map.len(),
            methods = self.method_map.len(),
            renamed_definitions = self.original_methods.len(),
            "built lens layer"
        );
        Ok(GraphLens::nested(NestedLens {
            kind: self.kind,
            previous: previous.clone(),
            type_map: self.type_map,
            original_types: self.original_types,
            field_map: self.field_map,
            original_fields: self.original_fields,
            method_map: self.method_map,
            original_methods: self.original_methods,
            call_site_changes: self.call_site_changes,
            definition_changes: self.definition_changes,
            invoke_kinds: self.invoke_kinds,
        }))
    }
}
