//! What is known statically about each unboxed enum.

use std::collections::BTreeMap;

use pare_ir::program::StaticValue;
use pare_ir::{FieldRef, Name, TypeRef};

/// One enum constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumConstant {
    pub field: FieldRef,
    pub ordinal: i32,
    pub name: Name,
}

impl EnumConstant {
    /// The `int` standing for this constant; `0` is `null`.
    pub fn unboxed_value(&self) -> i32 {
        unboxed_value(self.ordinal)
    }
}

/// The `int` standing for the constant with `ordinal`.
pub fn unboxed_value(ordinal: i32) -> i32 {
    ordinal + 1
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumData {
    /// Sorted by ordinal; ordinals are `0..len`.
    constants: Vec<EnumConstant>,
    /// Per read instance field, its value for every ordinal.
    instance_values: BTreeMap<FieldRef, Vec<StaticValue>>,
}

impl EnumData {
    pub(crate) fn new(
        mut constants: Vec<EnumConstant>,
        instance_values: BTreeMap<FieldRef, Vec<StaticValue>>,
    ) -> Self {
        constants.sort_by_key(|c| c.ordinal);
        debug_assert!(constants
            .iter()
            .enumerate()
            .all(|(i, c)| usize::try_from(c.ordinal).is_ok_and(|o| o == i)));
        EnumData {
            constants,
            instance_values,
        }
    }

    pub fn constants(&self) -> &[EnumConstant] {
        &self.constants
    }

    pub fn constant_for_field(&self, field: &FieldRef) -> Option<&EnumConstant> {
        self.constants.iter().find(|c| c.field == *field)
    }

    /// Number of constants, the length of `values()`.
    pub fn values_size(&self) -> usize {
        self.constants.len()
    }

    pub fn instance_field_values(&self, field: &FieldRef) -> Option<&[StaticValue]> {
        self.instance_values.get(field).map(Vec::as_slice)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.instance_values.keys()
    }
}

/// [`EnumData`] of every unboxed enum, in type order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumDataMap {
    enums: BTreeMap<TypeRef, EnumData>,
}

impl EnumDataMap {
    pub(crate) fn insert(&mut self, ty: TypeRef, data: EnumData) {
        self.enums.insert(ty, data);
    }

    pub fn get(&self, ty: TypeRef) -> Option<&EnumData> {
        self.enums.get(&ty)
    }

    pub fn contains(&self, ty: TypeRef) -> bool {
        self.enums.contains_key(&ty)
    }

    pub fn types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.enums.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeRef, &EnumData)> {
        self.enums.iter().map(|(&ty, data)| (ty, data))
    }

    pub fn len(&self) -> usize {
        self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }

    /// The largest number of constants of any unboxed enum.
    pub fn max_values_size(&self) -> usize {
        self.enums.values().map(EnumData::values_size).max().unwrap_or(0)
    }

    /// The enum whose constant `field` holds, with the constant.
    pub fn constant_for_field(&self, field: &FieldRef) -> Option<&EnumConstant> {
        self.get(field.holder)?.constant_for_field(field)
    }
}
