//! Subtype index over a program snapshot.

use std::collections::BTreeSet;

use pare_ir::{Program, TypeRef};
use rustc_hash::FxHashMap;

/// Direct subtypes of every class and interface that has any, computed once
/// per program snapshot.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    direct_subtypes: FxHashMap<TypeRef, Vec<TypeRef>>,
}

impl ClassHierarchy {
    pub fn new(program: &Program) -> Self {
        let mut direct_subtypes: FxHashMap<TypeRef, Vec<TypeRef>> = FxHashMap::default();
        // Classes iterate in type order, so every list is sorted.
        for class in program.classes() {
            for supertype in class.supertypes() {
                direct_subtypes.entry(supertype).or_default().push(class.ty);
            }
        }
        ClassHierarchy { direct_subtypes }
    }

    pub fn direct_subtypes(&self, ty: TypeRef) -> &[TypeRef] {
        self.direct_subtypes.get(&ty).map_or(&[], Vec::as_slice)
    }

    pub fn has_subtypes(&self, ty: TypeRef) -> bool {
        !self.direct_subtypes(ty).is_empty()
    }

    /// Every transitive subtype of `ty`, excluding `ty`, in type order.
    pub fn subtypes(&self, ty: TypeRef) -> BTreeSet<TypeRef> {
        let mut out = BTreeSet::new();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            for &sub in self.direct_subtypes(current) {
                if out.insert(sub) {
                    stack.push(sub);
                }
            }
        }
        out
    }
}
