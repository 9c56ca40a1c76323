//! Merging the instance fields of a group into the target's.
//!
//! # Architecture
//!
//! Every instance field of the target becomes a slot. Each source class is
//! then assigned to the slots in two passes:
//!
//! 1. fields whose type equals a free slot's type take the first such slot,
//!    in declaration order;
//! 2. the remaining fields, all of reference type, take the first free slot
//!    whose type erases to the same shape, and the slot's type is widened to
//!    the least upper bound of both.
//!
//! A field that still has no slot gets a fresh one on the target, named after
//! it and typed with its own type. Later sources may share that slot.
//!
//! Types are compared after mapping every merged class to its target. A slot
//! is only as `final` and `synthetic` as the weakest field stored in it.

use pare_app::AppView;
use pare_ir::{known, AccessFlags, FieldRef, Name, ProgramField, TypeRef};

use crate::group::{MergeGroup, TypeMap};

/// The shape a field type has once references are erased.
pub(crate) fn relaxed_type(ty: TypeRef) -> TypeRef {
    if ty.is_reference() {
        known::object()
    } else {
        ty
    }
}

/// Slot index for every source field; `None` for a field that has no free
/// slot of its shape.
pub(crate) fn assign_slots(slots: &[TypeRef], fields: &[TypeRef]) -> Vec<Option<usize>> {
    let mut taken = vec![false; slots.len()];
    let mut assignment: Vec<Option<usize>> = vec![None; fields.len()];
    for (i, &ty) in fields.iter().enumerate() {
        if let Some(slot) = (0..slots.len()).find(|&s| !taken[s] && slots[s] == ty) {
            taken[slot] = true;
            assignment[i] = Some(slot);
        }
    }
    for (i, &ty) in fields.iter().enumerate() {
        if assignment[i].is_some() {
            continue;
        }
        let shape = relaxed_type(ty);
        if let Some(slot) = (0..slots.len()).find(|&s| !taken[s] && relaxed_type(slots[s]) == shape)
        {
            taken[slot] = true;
            assignment[i] = Some(slot);
        }
    }
    assignment
}

struct Slot {
    original: FieldRef,
    name: Name,
    ty: TypeRef,
    access: AccessFlags,
}

/// Merged instance fields of one group.
pub(crate) struct FieldMerge {
    /// The target's new instance fields, class id field last.
    pub fields: Vec<ProgramField>,
    /// Every instance field of the group to the field it now lives in.
    pub moves: Vec<(FieldRef, FieldRef)>,
    /// Merged field to the target field it is reported as.
    pub representatives: Vec<(FieldRef, FieldRef)>,
}

fn merge_access(slot: AccessFlags, field: AccessFlags) -> AccessFlags {
    let visibility = AccessFlags::PUBLIC | AccessFlags::PROTECTED | AccessFlags::PRIVATE;
    let mut access = slot;
    for weak in [AccessFlags::FINAL, AccessFlags::SYNTHETIC] {
        if !field.contains(weak) {
            access.remove(weak);
        }
    }
    if (slot & visibility) != (field & visibility) {
        access = access.promote_to_public();
    }
    access
}

pub(crate) fn merge_instance_fields(
    app: &AppView,
    group: &MergeGroup,
    type_map: &TypeMap,
) -> FieldMerge {
    let Some(target) = group.target().and_then(|t| app.definition_for(t)) else {
        return FieldMerge {
            fields: Vec::new(),
            moves: Vec::new(),
            representatives: Vec::new(),
        };
    };
    let mut slots: Vec<Slot> = target
        .instance_fields()
        .map(|f| Slot {
            original: f.reference,
            name: f.reference.name,
            ty: type_map.map(f.reference.ty),
            access: f.access,
        })
        .collect();
    let mut slot_types: Vec<TypeRef> = slots.iter().map(|s| s.ty).collect();

    let mut contributions: Vec<(FieldRef, usize)> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.original, i))
        .collect();
    for source in group.sources() {
        let Some(class) = app.definition_for(source) else {
            continue;
        };
        let fields: Vec<&ProgramField> = class.instance_fields().collect();
        let types: Vec<TypeRef> = fields.iter().map(|f| type_map.map(f.reference.ty)).collect();
        let assignment = assign_slots(&slot_types, &types);
        for ((field, ty), slot) in fields.into_iter().zip(types).zip(assignment) {
            let slot = slot.unwrap_or_else(|| {
                let name = fresh_slot_name(&slots, field.reference.name);
                tracing::debug!(
                    field = %field.reference,
                    target = %target.ty,
                    %name,
                    "added a field slot"
                );
                slots.push(Slot {
                    original: field.reference,
                    name,
                    ty,
                    access: field.access,
                });
                slot_types.push(ty);
                slots.len() - 1
            });
            let merged = &mut slots[slot];
            if merged.ty != ty {
                merged.ty = type_map.map(app.least_upper_bound(merged.ty, ty));
            }
            merged.access = merge_access(merged.access, field.access);
            contributions.push((field.reference, slot));
        }
    }

    let new_refs: Vec<FieldRef> = slots
        .iter()
        .map(|s| FieldRef::new(target.ty, s.name, s.ty))
        .collect();
    let mut fields: Vec<ProgramField> = slots
        .iter()
        .zip(&new_refs)
        .map(|(s, &reference)| ProgramField::new(reference, s.access))
        .collect();
    let representatives = slots
        .iter()
        .zip(&new_refs)
        .map(|(s, &reference)| (reference, s.original))
        .collect();
    let moves = contributions
        .into_iter()
        .map(|(original, slot)| (original, new_refs[slot]))
        .collect();
    if let Some(class_id) = group.class_id_field() {
        fields.push(ProgramField::new(
            class_id,
            AccessFlags::PRIVATE | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
        ));
    }
    FieldMerge {
        fields,
        moves,
        representatives,
    }
}

/// `name`, or the first `name$N` no slot uses.
fn fresh_slot_name(slots: &[Slot], name: Name) -> Name {
    let is_free = |candidate: Name| slots.iter().all(|s| s.name != candidate);
    if is_free(name) {
        return name;
    }
    (1u32..)
        .map(|i| Name::intern(&format!("{name}${i}")))
        .find(|&candidate| is_free(candidate))
        .unwrap_or(name)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
