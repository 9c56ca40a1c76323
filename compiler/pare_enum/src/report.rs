//! Why enums were or were not unboxed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pare_ir::{FieldRef, MethodRef, TypeRef};

/// One reason an enum cannot be unboxed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reason {
    // === Structure ===
    /// The enum itself is kept.
    Pinned,
    /// A kept method mentions the enum in its prototype.
    InPinnedSignature(MethodRef),
    /// A kept field has the enum as its type.
    InPinnedField(FieldRef),
    /// An annotation method returns the enum.
    UsedInAnnotation(TypeRef),
    /// Constants with bodies, or other subclasses.
    SubtypesPresent,
    TooManyInstanceFields(usize),
    /// A static field that is neither a constant nor the values array, and is read.
    UnexpectedStaticField(FieldRef),
    /// Constants are not created with a constant ordinal and name, one per
    /// constant field.
    UnsupportedClassInitializer,

    // === Use sites ===
    InvalidInvoke(MethodRef),
    InvalidFieldAccess(FieldRef),
    /// A value flows into a context that is not typed with the enum.
    EscapesToNonEnumContext(MethodRef),
    InvalidConstClass,
    InvalidInstanceOf,
    InvalidArrayStore,
    /// An instance is created outside the class initializer.
    UnexpectedNewInstance(MethodRef),
    /// A read instance field has no known constant value for some constant.
    MissingInstanceFieldData(FieldRef),
    UnsupportedInstanceInitializer(MethodRef),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Pinned => f.write_str("kept"),
            Reason::InPinnedSignature(method) => write!(f, "used in kept method {method}"),
            Reason::InPinnedField(field) => write!(f, "type of kept field {field}"),
            Reason::UsedInAnnotation(annotation) => write!(f, "used in annotation {annotation}"),
            Reason::SubtypesPresent => f.write_str("has subtypes"),
            Reason::TooManyInstanceFields(count) => write!(f, "{count} instance fields"),
            Reason::UnexpectedStaticField(field) => write!(f, "reads static field {field}"),
            Reason::UnsupportedClassInitializer => f.write_str("unsupported class initializer"),
            Reason::InvalidInvoke(method) => write!(f, "invalid invoke of {method}"),
            Reason::InvalidFieldAccess(field) => write!(f, "invalid access to {field}"),
            Reason::EscapesToNonEnumContext(context) => write!(f, "escapes in {context}"),
            Reason::InvalidConstClass => f.write_str("class constant"),
            Reason::InvalidInstanceOf => f.write_str("instance-of check"),
            Reason::InvalidArrayStore => f.write_str("stored into a non-enum array"),
            Reason::UnexpectedNewInstance(context) => write!(f, "instantiated in {context}"),
            Reason::MissingInstanceFieldData(field) => write!(f, "no constant data for {field}"),
            Reason::UnsupportedInstanceInitializer(method) => {
                write!(f, "unsupported instance initializer {method}")
            }
        }
    }
}

/// Reasons collected for every candidate, in type order.
#[derive(Clone, Debug, Default)]
pub(crate) struct Reasons {
    early_exit: bool,
    by_enum: BTreeMap<TypeRef, Vec<Reason>>,
}

impl Reasons {
    pub(crate) fn new(early_exit: bool) -> Self {
        Reasons {
            early_exit,
            by_enum: BTreeMap::new(),
        }
    }

    pub(crate) fn add(&mut self, ty: TypeRef, reason: Reason) {
        let reasons = self.by_enum.entry(ty).or_default();
        if (self.early_exit && !reasons.is_empty()) || reasons.contains(&reason) {
            return;
        }
        reasons.push(reason);
    }

    pub(crate) fn extend(&mut self, other: Reasons) {
        for (ty, reasons) in other.by_enum {
            for reason in reasons {
                self.add(ty, reason);
            }
        }
    }

    pub(crate) fn is_rejected(&self, ty: TypeRef) -> bool {
        self.by_enum.get(&ty).is_some_and(|r| !r.is_empty())
    }

    /// Whether analyses may skip `ty` because nothing more will be recorded.
    pub(crate) fn is_settled(&self, ty: TypeRef) -> bool {
        self.early_exit && self.is_rejected(ty)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnboxingReport {
    unboxed: BTreeSet<TypeRef>,
    rejected: BTreeMap<TypeRef, Vec<Reason>>,
}

impl UnboxingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_rejections(&mut self, reasons: Reasons) {
        for (ty, reasons) in reasons.by_enum {
            if reasons.is_empty() {
                continue;
            }
            tracing::debug!(
                enum_type = %ty,
                reason = %reasons[0],
                count = reasons.len(),
                "enum not unboxed"
            );
            self.rejected.insert(ty, reasons);
        }
    }

    pub(crate) fn record_unboxed(&mut self, ty: TypeRef) {
        self.unboxed.insert(ty);
    }

    pub fn is_unboxed(&self, ty: TypeRef) -> bool {
        self.unboxed.contains(&ty)
    }

    pub fn unboxed(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.unboxed.iter().copied()
    }

    /// Every reason `ty` was rejected for; empty if it was not rejected.
    pub fn reasons(&self, ty: TypeRef) -> &[Reason] {
        self.rejected.get(&ty).map_or(&[], Vec::as_slice)
    }

    pub fn rejected(&self) -> impl Iterator<Item = (TypeRef, &[Reason])> {
        self.rejected.iter().map(|(&ty, r)| (ty, r.as_slice()))
    }
}
