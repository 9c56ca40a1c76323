//! The cross-pass program snapshot.
//!
//! # Architecture
//!
//! An [`AppView`] bundles everything a pass reads: the program, the lens
//! chain, the lens the program's code is currently written against, keep
//! info and field access info. Every part is behind an `Arc` and never
//! mutated; a pass builds its results separately and then produces the next
//! snapshot with the `with_*` methods. Readers holding the old snapshot
//! keep seeing a consistent program.

use std::collections::VecDeque;
use std::sync::Arc;

use pare_ir::{known, MethodRef, Program, ProgramClass, ProgramMethod, TypeRef};
use pare_lens::GraphLens;
use rustc_hash::FxHashSet;

use crate::field_access::FieldAccessInfoCollection;
use crate::hierarchy::ClassHierarchy;
use crate::keep_info::KeepInfo;

#[derive(Clone, Debug)]
pub struct AppView {
    program: Arc<Program>,
    hierarchy: Arc<ClassHierarchy>,
    lens: GraphLens,
    code_lens: GraphLens,
    keep_info: Arc<KeepInfo>,
    field_access: Arc<FieldAccessInfoCollection>,
}

impl AppView {
    pub fn new(program: Program, keep_info: KeepInfo) -> Self {
        let hierarchy = ClassHierarchy::new(&program);
        AppView {
            program: Arc::new(program),
            hierarchy: Arc::new(hierarchy),
            lens: GraphLens::identity(),
            code_lens: GraphLens::identity(),
            keep_info: Arc::new(keep_info),
            field_access: Arc::new(FieldAccessInfoCollection::default()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// The current lens: maps original names to current names.
    pub fn lens(&self) -> &GraphLens {
        &self.lens
    }

    /// The layer every method body is currently written against.
    pub fn code_lens(&self) -> &GraphLens {
        &self.code_lens
    }

    pub fn keep_info(&self) -> &KeepInfo {
        &self.keep_info
    }

    pub fn field_access_info(&self) -> &FieldAccessInfoCollection {
        &self.field_access
    }

    // ── Next snapshots ──────────────────────────────────────────

    #[must_use]
    pub fn with_program(&self, program: Program) -> AppView {
        AppView {
            hierarchy: Arc::new(ClassHierarchy::new(&program)),
            program: Arc::new(program),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_field_access_info(&self, field_access: FieldAccessInfoCollection) -> AppView {
        AppView {
            field_access: Arc::new(field_access),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_keep_info(&self, keep_info: KeepInfo) -> AppView {
        AppView {
            keep_info: Arc::new(keep_info),
            ..self.clone()
        }
    }

    /// Install the program a pass produced together with the lens layer it
    /// built on top of [`lens`](Self::lens). Keep info and field access info
    /// are carried over to the new names. Code is not rewritten: the code
    /// lens stays where it was.
    #[must_use]
    pub fn rewritten_with_lens(&self, program: Program, lens: GraphLens) -> AppView {
        debug_assert!(lens.contains(&self.lens), "lens must extend the current lens");
        let keep_info = self.keep_info.rewritten_with_lens(&lens, &self.lens);
        let field_access = self.field_access.rewritten_with_lens(&lens, &self.lens);
        AppView {
            hierarchy: Arc::new(ClassHierarchy::new(&program)),
            program: Arc::new(program),
            lens,
            code_lens: self.code_lens.clone(),
            keep_info: Arc::new(keep_info),
            field_access: Arc::new(field_access),
        }
    }

    /// Record that every body has been rewritten to the current lens.
    #[must_use]
    pub fn with_cleared_code_rewriting(&self, program: Program) -> AppView {
        let lens = self.lens.clear_code_rewriting();
        AppView {
            program: Arc::new(program),
            code_lens: lens.clone(),
            lens,
            ..self.clone()
        }
    }

    // ── Hierarchy queries ───────────────────────────────────────

    pub fn definition_for(&self, ty: TypeRef) -> Option<&Arc<ProgramClass>> {
        self.program.class(ty)
    }

    /// The definition of `ty` if it is a program (not library) class.
    pub fn program_definition_for(&self, ty: TypeRef) -> Option<&Arc<ProgramClass>> {
        self.program.class(ty).filter(|c| c.is_program())
    }

    /// Superclasses of `ty`, nearest first. Stops at the first class
    /// without a definition, which is included.
    pub fn superclass_chain(&self, ty: TypeRef) -> Vec<TypeRef> {
        let mut chain = Vec::new();
        let mut current = self.definition_for(ty).and_then(|c| c.superclass);
        while let Some(superclass) = current {
            if chain.contains(&superclass) {
                break;
            }
            chain.push(superclass);
            current = self.definition_for(superclass).and_then(|c| c.superclass);
        }
        chain
    }

    pub fn has_subtypes(&self, ty: TypeRef) -> bool {
        self.hierarchy.has_subtypes(ty)
    }

    /// Whether a value of type `sub` can be assigned to `sup`.
    pub fn is_subtype(&self, sub: TypeRef, sup: TypeRef) -> bool {
        if sub == sup {
            return true;
        }
        if !sub.is_reference() || !sup.is_reference() {
            return false;
        }
        if sup == known::object() {
            return true;
        }
        match (sub.element_type(), sup.element_type()) {
            (Some(sub_elem), Some(sup_elem)) => {
                sub_elem.is_reference() && self.is_subtype(sub_elem, sup_elem)
            }
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => self.is_class_subtype(sub, sup),
        }
    }

    fn is_class_subtype(&self, sub: TypeRef, sup: TypeRef) -> bool {
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([sub]);
        while let Some(current) = queue.pop_front() {
            if current == sup {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(class) = self.definition_for(current) {
                queue.extend(class.supertypes());
            }
        }
        false
    }

    /// Closest common superclass of two reference types. Interfaces are
    /// ignored; unrelated types meet at `java.lang.Object`.
    pub fn least_upper_bound(&self, a: TypeRef, b: TypeRef) -> TypeRef {
        if self.is_subtype(a, b) {
            return b;
        }
        if self.is_subtype(b, a) {
            return a;
        }
        if let (Some(ea), Some(eb)) = (a.element_type(), b.element_type()) {
            if ea.is_reference() && eb.is_reference() {
                return self.least_upper_bound(ea, eb).to_array();
            }
            return known::object();
        }
        self.superclass_chain(a)
            .into_iter()
            .find(|&candidate| self.is_subtype(b, candidate))
            .unwrap_or_else(known::object)
    }

    /// The definition a call to `method` dispatches to statically: the holder
    /// and its superclasses first, then default methods of its interfaces.
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&ProgramMethod> {
        let mut current = Some(method.holder);
        let mut interfaces = Vec::new();
        while let Some(ty) = current {
            let class = self.definition_for(ty)?;
            if let Some(found) = class.method_by_signature(method.name, &method.proto) {
                return Some(found);
            }
            interfaces.extend(class.interfaces.iter().copied());
            current = class.superclass;
        }
        let mut seen = FxHashSet::default();
        while let Some(itf) = interfaces.pop() {
            if !seen.insert(itf) {
                continue;
            }
            let Some(class) = self.definition_for(itf) else {
                continue;
            };
            if let Some(found) = class.method_by_signature(method.name, &method.proto) {
                return Some(found);
            }
            interfaces.extend(class.interfaces.iter().copied());
        }
        None
    }
}

#[cfg(test)]
mod tests;
