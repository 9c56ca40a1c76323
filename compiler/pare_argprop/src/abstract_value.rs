//! Abstract values: what is known about the runtime value of a parameter
//! or field.
//!
//! Integers are tracked precisely up to [`MAX_SET_SIZE`] distinct values and
//! then degrade to the bits every value agrees on.

use std::collections::BTreeSet;

use pare_ir::Name;

/// Largest number of distinct integers kept before widening to known bits.
pub const MAX_SET_SIZE: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbstractValue {
    /// No value seen yet.
    Bottom,
    Null,
    Single(i64),
    /// Between two and [`MAX_SET_SIZE`] integers.
    Set(BTreeSet<i64>),
    /// Bits set in every value (`ones`) and clear in every value (`zeros`).
    DefiniteBits { ones: i64, zeros: i64 },
    String(Name),
    Unknown,
}

impl AbstractValue {
    pub fn is_bottom(&self) -> bool {
        matches!(self, AbstractValue::Bottom)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AbstractValue::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AbstractValue::Null)
    }

    pub fn as_single(&self) -> Option<i64> {
        match self {
            AbstractValue::Single(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the integer `value` is one of the values described.
    pub fn admits(&self, value: i64) -> bool {
        match self {
            AbstractValue::Bottom | AbstractValue::Null | AbstractValue::String(_) => false,
            AbstractValue::Single(v) => *v == value,
            AbstractValue::Set(values) => values.contains(&value),
            AbstractValue::DefiniteBits { ones, zeros } => {
                value & ones == *ones && value & zeros == 0
            }
            AbstractValue::Unknown => true,
        }
    }

    /// Least upper bound.
    #[must_use]
    pub fn join(&self, other: &AbstractValue) -> AbstractValue {
        match (self, other) {
            (AbstractValue::Bottom, v) | (v, AbstractValue::Bottom) => v.clone(),
            (AbstractValue::Unknown, _) | (_, AbstractValue::Unknown) => AbstractValue::Unknown,
            (a, b) if a == b => a.clone(),
            (a, b) => match (a.integers(), b.integers()) {
                (Some(xs), Some(ys)) => Self::from_integers(xs.union(&ys).copied().collect()),
                _ => match (a.definite_bits(), b.definite_bits()) {
                    (Some((ones_a, zeros_a)), Some((ones_b, zeros_b))) => {
                        Self::from_bits(ones_a & ones_b, zeros_a & zeros_b)
                    }
                    _ => AbstractValue::Unknown,
                },
            },
        }
    }

    /// The values of `x | constant` for every `x` described by `self`.
    #[must_use]
    pub fn or_integers(&self, constant: i64) -> AbstractValue {
        match self {
            AbstractValue::Bottom => AbstractValue::Bottom,
            AbstractValue::Single(v) => AbstractValue::Single(v | constant),
            AbstractValue::Set(values) => {
                Self::from_integers(values.iter().map(|v| v | constant).collect())
            }
            AbstractValue::DefiniteBits { ones, zeros } => {
                Self::from_bits(ones | constant, zeros & !constant)
            }
            AbstractValue::Unknown => Self::from_bits(constant, 0),
            AbstractValue::Null | AbstractValue::String(_) => {
                unreachable!("bitwise or of a non-integer value {self:?}")
            }
        }
    }

    fn integers(&self) -> Option<BTreeSet<i64>> {
        match self {
            AbstractValue::Single(v) => Some(BTreeSet::from([*v])),
            AbstractValue::Set(values) => Some(values.clone()),
            _ => None,
        }
    }

    fn definite_bits(&self) -> Option<(i64, i64)> {
        match self {
            AbstractValue::Single(v) => Some((*v, !*v)),
            AbstractValue::Set(values) => Some(
                values
                    .iter()
                    .fold((!0, !0), |(ones, zeros), v| (ones & v, zeros & !v)),
            ),
            AbstractValue::DefiniteBits { ones, zeros } => Some((*ones, *zeros)),
            _ => None,
        }
    }

    fn from_integers(values: BTreeSet<i64>) -> AbstractValue {
        match values.len() {
            0 => AbstractValue::Bottom,
            1 => values
                .first()
                .map_or(AbstractValue::Bottom, |&v| AbstractValue::Single(v)),
            n if n <= MAX_SET_SIZE => AbstractValue::Set(values),
            _ => match AbstractValue::Set(values).definite_bits() {
                Some((ones, zeros)) => Self::from_bits(ones, zeros),
                None => AbstractValue::Unknown,
            },
        }
    }

    fn from_bits(ones: i64, zeros: i64) -> AbstractValue {
        debug_assert_eq!(ones & zeros, 0, "a bit cannot be both set and clear");
        if ones | zeros == 0 {
            AbstractValue::Unknown
        } else if ones | zeros == !0 {
            AbstractValue::Single(ones)
        } else {
            AbstractValue::DefiniteBits { ones, zeros }
        }
    }
}
