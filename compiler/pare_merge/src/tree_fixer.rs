//! Final signatures for every member once classes are merged.
//!
//! # Architecture
//!
//! Mapping merged types to their targets can make two members of one class
//! collide, or make a method override something it never overrode. The
//! fixer walks every class top-down (supertypes first) and places each
//! member under its mapped signature unless that is taken:
//!
//! - constructors get trailing `null` parameters of the synthetic argument
//!   class until their prototype is free;
//! - other direct methods and fields get the first free `name$N`;
//! - virtual methods that override an inherited method (in the original
//!   hierarchy) take that method's final signature, so renames stay
//!   consistent down each class tree; any other virtual method whose mapped
//!   signature is taken or inherited gets a fresh name.
//!
//! Overriding methods are placed before the rest of their class, so they
//! keep their names. Every member whose final reference differs from its
//! original is recorded as a move, and renamed members are also moved for
//! each subtype that inherits them, since call sites may name the subtype.

use std::collections::BTreeMap;
use std::sync::Arc;

use pare_app::AppView;
use pare_ir::{FieldRef, MethodRef, MethodSignature, Name, ProgramClass, ProgramField, ProgramMethod, TypeRef};
use pare_lens::{ExtraParameter, LensBuilder, PrototypeChanges};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::group::TypeMap;
use crate::synthetic_argument::SyntheticArgumentClass;

/// A class whose members still carry their original references.
pub(crate) struct FixupClass {
    /// Final type and supertypes; holds the members already placed.
    pub class: ProgramClass,
    pub pending_fields: Vec<ProgramField>,
    pub pending_methods: Vec<ProgramMethod>,
    /// Moves of placed fields, recorded by the fixer.
    pub field_moves: Vec<(FieldRef, FieldRef)>,
}

impl FixupClass {
    /// Every member of `class` pending, supertypes mapped.
    pub(crate) fn unmerged(class: &ProgramClass, type_map: &TypeMap) -> Self {
        let mut interfaces: Vec<TypeRef> = Vec::with_capacity(class.interfaces.len());
        for &itf in &class.interfaces {
            let mapped = type_map.map(itf);
            if !interfaces.contains(&mapped) {
                interfaces.push(mapped);
            }
        }
        FixupClass {
            class: ProgramClass {
                superclass: class.superclass.map(|s| type_map.map(s)),
                interfaces,
                fields: Vec::new(),
                methods: Vec::new(),
                ..class.clone()
            },
            pending_fields: class.fields.clone(),
            pending_methods: class.methods.clone(),
            field_moves: Vec::new(),
        }
    }
}

/// Virtual methods visible in a class: its own and inherited ones.
#[derive(Clone, Default)]
struct VirtualTable {
    /// Final signature to the original method.
    by_final: FxHashMap<MethodSignature, MethodRef>,
    /// Original signature to the final signatures it was placed under.
    by_original: FxHashMap<MethodSignature, Vec<MethodSignature>>,
}

impl VirtualTable {
    fn insert(&mut self, final_signature: MethodSignature, original: MethodRef) {
        if self.by_final.contains_key(&final_signature) {
            return;
        }
        self.by_original
            .entry(original.signature())
            .or_default()
            .push(final_signature.clone());
        self.by_final.insert(final_signature, original);
    }

    fn extend(&mut self, other: &VirtualTable) {
        for (signature, original) in &other.by_final {
            self.insert(signature.clone(), original.clone());
        }
    }
}

pub(crate) struct TreeFixer<'a> {
    app: &'a AppView,
    type_map: &'a TypeMap,
    builder: &'a mut LensBuilder,
    synthetic_argument: &'a mut SyntheticArgumentClass,
}

impl<'a> TreeFixer<'a> {
    pub(crate) fn new(
        app: &'a AppView,
        type_map: &'a TypeMap,
        builder: &'a mut LensBuilder,
        synthetic_argument: &'a mut SyntheticArgumentClass,
    ) -> Self {
        TreeFixer {
            app,
            type_map,
            builder,
            synthetic_argument,
        }
    }

    /// Place every member of `classes`. Library classes of the program only
    /// contribute the methods they declare.
    pub(crate) fn fix(mut self, classes: Vec<FixupClass>) -> Vec<ProgramClass> {
        let mut supertypes: FxHashMap<TypeRef, Vec<TypeRef>> = FxHashMap::default();
        for class in &classes {
            supertypes.insert(class.class.ty, class.class.supertypes().collect());
        }
        let app = self.app;
        let libraries: Vec<&Arc<ProgramClass>> = app
            .program()
            .classes()
            .filter(|c| c.is_library())
            .collect();
        for library in &libraries {
            supertypes.insert(library.ty, library.supertypes().collect());
        }
        let order = top_down(&supertypes);

        let mut pending: FxHashMap<TypeRef, FixupClass> =
            classes.into_iter().map(|c| (c.class.ty, c)).collect();
        let library_methods: FxHashMap<TypeRef, &Arc<ProgramClass>> =
            libraries.iter().map(|&c| (c.ty, c)).collect();
        let mut tables: FxHashMap<TypeRef, VirtualTable> = FxHashMap::default();
        let mut fixed = Vec::with_capacity(pending.len());
        for ty in order {
            let mut table = VirtualTable::default();
            for supertype in supertypes.get(&ty).into_iter().flatten() {
                if let Some(inherited) = tables.get(supertype) {
                    table.extend(inherited);
                }
            }
            if let Some(class) = pending.remove(&ty) {
                fixed.push(self.fix_class(class, &mut table));
            } else if let Some(library) = library_methods.get(&ty) {
                for method in library.virtual_methods() {
                    table.insert(method.reference.signature(), method.reference.clone());
                }
            }
            tables.insert(ty, table);
        }
        fixed
    }

    fn fix_class(&mut self, fixup: FixupClass, table: &mut VirtualTable) -> ProgramClass {
        let FixupClass {
            mut class,
            pending_fields,
            pending_methods,
            field_moves,
        } = fixup;

        // ── Fields ──────────────────────────────────────────────
        for (original, placed) in field_moves {
            self.record_field_move(original, placed);
        }
        let mut reserved_fields: FxHashSet<(Name, TypeRef)> = class
            .fields
            .iter()
            .map(|f| (f.reference.name, f.reference.ty))
            .collect();
        for field in pending_fields {
            let original = field.reference;
            let mut placed = self.type_map.map_field(original);
            placed.holder = class.ty;
            if reserved_fields.contains(&(placed.name, placed.ty)) {
                let name = fresh_name(original.name, |n| !reserved_fields.contains(&(n, placed.ty)));
                placed = placed.with_name(name);
            }
            reserved_fields.insert((placed.name, placed.ty));
            self.record_field_move(original, placed);
            class.fields.push(ProgramField {
                reference: placed,
                ..field
            });
        }

        // ── Methods ─────────────────────────────────────────────
        let mut reserved: FxHashSet<MethodSignature> =
            class.methods.iter().map(|m| m.reference.signature()).collect();
        let mut order: Vec<usize> = (0..pending_methods.len()).collect();
        order.sort_by_key(|&i| {
            let m = &pending_methods[i];
            !(m.is_virtual() && self.overridden(table, &m.reference).is_some())
        });
        let mut placed_methods: Vec<Option<ProgramMethod>> = vec![None; pending_methods.len()];
        for i in order {
            let method = &pending_methods[i];
            let original = &method.reference;
            let placed = if method.is_instance_initializer() {
                self.place_constructor(class.ty, original, &reserved)
            } else if method.is_virtual() {
                self.place_virtual(class.ty, original, table, &reserved)
            } else {
                self.place_direct(class.ty, original, table, &reserved)
            };
            reserved.insert(placed.signature());
            if method.is_virtual() {
                table.insert(placed.signature(), original.clone());
            }
            self.record_method_move(original, &placed, method.is_instance_initializer());
            placed_methods[i] = Some(ProgramMethod {
                reference: placed,
                ..method.clone()
            });
        }
        class.methods.extend(placed_methods.into_iter().flatten());
        class
    }

    // ── Placement ───────────────────────────────────────────────

    /// Final signature of the inherited method `original` overrides.
    fn overridden(&self, table: &VirtualTable, original: &MethodRef) -> Option<MethodSignature> {
        table
            .by_original
            .get(&original.signature())?
            .iter()
            .find(|signature| {
                table.by_final.get(*signature).is_some_and(|inherited| {
                    inherited.holder != original.holder
                        && self.app.is_subtype(original.holder, inherited.holder)
                })
            })
            .cloned()
    }

    fn place_constructor(
        &mut self,
        holder: TypeRef,
        original: &MethodRef,
        reserved: &FxHashSet<MethodSignature>,
    ) -> MethodRef {
        let mut placed = self.type_map.map_method(original).with_holder(holder);
        let mut changes = PrototypeChanges::none();
        while reserved.contains(&placed.signature()) {
            let argument = self.synthetic_argument.use_type();
            placed = placed.with_proto(placed.proto.append_params([argument]));
            changes = changes.with_extra_parameter(ExtraParameter::UnusedNull(argument));
        }
        self.builder.record_prototype_changes(placed.clone(), changes);
        placed
    }

    fn place_virtual(
        &self,
        holder: TypeRef,
        original: &MethodRef,
        table: &VirtualTable,
        reserved: &FxHashSet<MethodSignature>,
    ) -> MethodRef {
        if let Some(signature) = self.overridden(table, original) {
            return MethodRef::new(holder, signature.name, signature.proto);
        }
        let placed = self.type_map.map_method(original).with_holder(holder);
        let taken = |signature: &MethodSignature| {
            reserved.contains(signature) || table.by_final.contains_key(signature)
        };
        if !taken(&placed.signature()) {
            return placed;
        }
        let name = fresh_name(original.name, |n| {
            !taken(&MethodSignature {
                name: n,
                proto: placed.proto.clone(),
            })
        });
        placed.with_name(name)
    }

    fn place_direct(
        &self,
        holder: TypeRef,
        original: &MethodRef,
        table: &VirtualTable,
        reserved: &FxHashSet<MethodSignature>,
    ) -> MethodRef {
        let placed = self.type_map.map_method(original).with_holder(holder);
        // Shadowing an inherited virtual method only matters if merging
        // introduced it.
        let taken = |signature: &MethodSignature| {
            reserved.contains(signature)
                || table
                    .by_final
                    .get(signature)
                    .is_some_and(|inherited| inherited.signature() != original.signature())
        };
        if !taken(&placed.signature()) {
            return placed;
        }
        let name = fresh_name(original.name, |n| {
            !taken(&MethodSignature {
                name: n,
                proto: placed.proto.clone(),
            })
        });
        placed.with_name(name)
    }

    // ── Lens moves ──────────────────────────────────────────────

    fn record_field_move(&mut self, original: FieldRef, placed: FieldRef) {
        if original == placed {
            return;
        }
        self.builder.move_field(original, placed);
        if placed == self.type_map.map_field(original) {
            return;
        }
        let inheritors = self.inheritors(original.holder, |class| {
            class.field(&original.with_holder(class.ty)).is_some()
        });
        for sub in inheritors {
            self.builder.move_field(
                original.with_holder(sub),
                placed.with_holder(self.type_map.map(sub)),
            );
        }
    }

    fn record_method_move(&mut self, original: &MethodRef, placed: &MethodRef, is_constructor: bool) {
        if original == placed {
            return;
        }
        self.builder.move_method(original.clone(), placed.clone());
        if is_constructor || *placed == self.type_map.map_method(original) {
            return;
        }
        let signature = original.signature();
        let inheritors = self.inheritors(original.holder, |class| {
            class
                .method_by_signature(signature.name, &signature.proto)
                .is_some()
        });
        for sub in inheritors {
            self.builder.move_method(
                original.with_holder(sub),
                placed.with_holder(self.type_map.map(sub)),
            );
        }
    }

    /// Transitive subtypes of `ty` in the original hierarchy that inherit a
    /// member, stopping below any class for which `declares` holds.
    fn inheritors(&self, ty: TypeRef, declares: impl Fn(&ProgramClass) -> bool) -> Vec<TypeRef> {
        let hierarchy = self.app.hierarchy();
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack: Vec<TypeRef> = hierarchy.direct_subtypes(ty).to_vec();
        while let Some(sub) = stack.pop() {
            if !seen.insert(sub) {
                continue;
            }
            if self.app.definition_for(sub).is_some_and(|c| declares(c)) {
                continue;
            }
            out.push(sub);
            stack.extend_from_slice(hierarchy.direct_subtypes(sub));
        }
        out.sort();
        out
    }
}

/// `name$1`, `name$2`, ... : the first one `is_free` accepts.
fn fresh_name(name: Name, is_free: impl Fn(Name) -> bool) -> Name {
    (1u32..)
        .map(|i| Name::intern(&format!("{name}${i}")))
        .find(|&candidate| is_free(candidate))
        .unwrap_or(name)
}

/// Types ordered so that every supertype comes before its subtypes, ties
/// broken by type.
fn top_down(supertypes: &FxHashMap<TypeRef, Vec<TypeRef>>) -> Vec<TypeRef> {
    fn depth(
        ty: TypeRef,
        supertypes: &FxHashMap<TypeRef, Vec<TypeRef>>,
        memo: &mut FxHashMap<TypeRef, usize>,
    ) -> usize {
        if let Some(&d) = memo.get(&ty) {
            return d;
        }
        // Provisional entry cuts hierarchy cycles.
        memo.insert(ty, 0);
        let d = supertypes
            .get(&ty)
            .into_iter()
            .flatten()
            .map(|&s| depth(s, supertypes, memo) + 1)
            .max()
            .unwrap_or(0);
        memo.insert(ty, d);
        d
    }

    let mut memo = FxHashMap::default();
    let mut ordered: BTreeMap<(usize, TypeRef), ()> = BTreeMap::new();
    for &ty in supertypes.keys() {
        ordered.insert((depth(ty, supertypes, &mut memo), ty), ());
    }
    ordered.into_keys().map(|(_, ty)| ty).collect()
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
