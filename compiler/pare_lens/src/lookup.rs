//! Results of forward lookups.

use pare_ir::ir::InvokeKind;
use pare_ir::{FieldRef, MethodRef, TypeRef};

use crate::changes::PrototypeChanges;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLookupResult {
    pub reference: FieldRef,
    /// Type reads of the field must be cast to, if the field was widened.
    pub read_cast: Option<TypeRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodLookupResult {
    pub reference: MethodRef,
    pub invoke_kind: InvokeKind,
    /// Argument changes call sites apply, oldest layer first.
    pub prototype_changes: PrototypeChanges,
}

impl MethodLookupResult {
    pub fn has_prototype_changes(&self) -> bool {
        !self.prototype_changes.is_empty()
    }
}
