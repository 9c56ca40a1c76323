//! The abstract state of one parameter or field.
//!
//! A concrete state pairs what is known about the value itself with the
//! in-flow it still depends on. In-flow is resolved by the flow graph; a
//! state with no in-flow left is final.

use std::collections::BTreeSet;

use pare_app::AppView;
use pare_ir::TypeRef;

use crate::abstract_value::AbstractValue;
use crate::dynamic_type::{DynamicType, Nullability};
use crate::in_flow::InFlow;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueState {
    Bottom,
    Concrete(ConcreteValueState),
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConcreteValueState {
    Array {
        nullability: Nullability,
        in_flow: BTreeSet<InFlow>,
    },
    Class {
        value: AbstractValue,
        dynamic_type: DynamicType,
        in_flow: BTreeSet<InFlow>,
    },
    Primitive {
        value: AbstractValue,
        in_flow: BTreeSet<InFlow>,
    },
    /// The receiver of an instance method; never null.
    Receiver {
        dynamic_type: DynamicType,
        in_flow: BTreeSet<InFlow>,
    },
}

/// Parameters joining states.
pub struct StateJoiner<'a> {
    pub app: &'a AppView,
    /// A state depending on more sources than this is given up on.
    pub max_in_flow_size: usize,
}

impl<'a> StateJoiner<'a> {
    pub fn new(app: &'a AppView, max_in_flow_size: usize) -> Self {
        StateJoiner {
            app,
            max_in_flow_size,
        }
    }
}

impl ValueState {
    /// A state whose only content is the single source `in_flow`.
    pub fn from_in_flow(static_type: TypeRef, in_flow: InFlow) -> ValueState {
        let in_flow = BTreeSet::from([in_flow]);
        ValueState::Concrete(if static_type.is_primitive() {
            ConcreteValueState::Primitive {
                value: AbstractValue::Bottom,
                in_flow,
            }
        } else if static_type.is_array() {
            ConcreteValueState::Array {
                nullability: Nullability::Bottom,
                in_flow,
            }
        } else {
            ConcreteValueState::Class {
                value: AbstractValue::Bottom,
                dynamic_type: DynamicType::Bottom,
                in_flow,
            }
        })
    }

    pub fn primitive(value: AbstractValue) -> ValueState {
        Self::primitive_with_in_flow(value, BTreeSet::new())
    }

    pub(crate) fn primitive_with_in_flow(value: AbstractValue, in_flow: BTreeSet<InFlow>) -> ValueState {
        if value.is_unknown() {
            return ValueState::Unknown;
        }
        ValueState::Concrete(ConcreteValueState::Primitive { value, in_flow })
    }

    pub fn class(value: AbstractValue, dynamic_type: DynamicType) -> ValueState {
        if value.is_unknown() && dynamic_type.is_unknown() {
            return ValueState::Unknown;
        }
        ValueState::Concrete(ConcreteValueState::Class {
            value,
            dynamic_type,
            in_flow: BTreeSet::new(),
        })
    }

    pub fn array(nullability: Nullability) -> ValueState {
        if nullability.is_maybe_null() {
            return ValueState::Unknown;
        }
        ValueState::Concrete(ConcreteValueState::Array {
            nullability,
            in_flow: BTreeSet::new(),
        })
    }

    pub fn receiver(dynamic_type: DynamicType) -> ValueState {
        if dynamic_type.is_unknown() {
            return ValueState::Unknown;
        }
        ValueState::Concrete(ConcreteValueState::Receiver {
            dynamic_type,
            in_flow: BTreeSet::new(),
        })
    }

    /// The state of a field nobody has written yet: zero or `null`.
    pub fn default_value(static_type: TypeRef) -> ValueState {
        if static_type.is_primitive() {
            Self::primitive(AbstractValue::Single(0))
        } else if static_type.is_array() {
            Self::array(Nullability::DefinitelyNull)
        } else {
            Self::class(
                AbstractValue::Null,
                DynamicType::bounded(static_type, Nullability::DefinitelyNull),
            )
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, ValueState::Bottom)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ValueState::Unknown)
    }

    pub fn as_concrete(&self) -> Option<&ConcreteValueState> {
        match self {
            ValueState::Concrete(state) => Some(state),
            ValueState::Bottom | ValueState::Unknown => None,
        }
    }

    /// Sources this state still waits on.
    pub fn in_flow(&self) -> Option<&BTreeSet<InFlow>> {
        self.as_concrete().map(ConcreteValueState::in_flow)
    }

    pub fn has_in_flow(&self) -> bool {
        self.in_flow().is_some_and(|in_flow| !in_flow.is_empty())
    }

    /// The same knowledge without the sources.
    #[must_use]
    pub fn clear_in_flow(self) -> ValueState {
        match self {
            ValueState::Concrete(mut state) => {
                state.in_flow_mut().clear();
                if state.is_effectively_bottom() {
                    ValueState::Bottom
                } else {
                    ValueState::Concrete(state)
                }
            }
            other => other,
        }
    }

    /// The same state seen as a receiver, which rules out `null`.
    #[must_use]
    pub fn into_receiver(self) -> ValueState {
        match self {
            ValueState::Concrete(ConcreteValueState::Class {
                dynamic_type,
                in_flow,
                ..
            }) => {
                let dynamic_type = dynamic_type.with_nullability(Nullability::DefinitelyNotNull);
                if dynamic_type.is_unknown() && in_flow.is_empty() {
                    ValueState::Unknown
                } else {
                    ValueState::Concrete(ConcreteValueState::Receiver {
                        dynamic_type,
                        in_flow,
                    })
                }
            }
            other => other,
        }
    }

    /// Joins `other` into `self`; returns whether `self` changed.
    pub fn join(&mut self, other: &ValueState, joiner: &StateJoiner<'_>) -> bool {
        let joined = match (&*self, other) {
            (_, ValueState::Bottom) | (ValueState::Unknown, _) => return false,
            (ValueState::Bottom, _) | (_, ValueState::Unknown) => other.clone(),
            (ValueState::Concrete(a), ValueState::Concrete(b)) => {
                let joined = a.join(b, joiner.app);
                if joined.is_effectively_unknown()
                    || joined.in_flow().len() > joiner.max_in_flow_size
                {
                    ValueState::Unknown
                } else {
                    ValueState::Concrete(joined)
                }
            }
        };
        if joined == *self {
            return false;
        }
        *self = joined;
        true
    }

    /// Drops what `static_type` already guarantees.
    #[must_use]
    pub fn widen(self, app: &AppView, static_type: TypeRef) -> ValueState {
        match self {
            ValueState::Concrete(state) => {
                let widened = state.widen(app, static_type);
                if widened.is_effectively_unknown() {
                    ValueState::Unknown
                } else {
                    ValueState::Concrete(widened)
                }
            }
            other => other,
        }
    }
}

impl ConcreteValueState {
    pub fn in_flow(&self) -> &BTreeSet<InFlow> {
        match self {
            ConcreteValueState::Array { in_flow, .. }
            | ConcreteValueState::Class { in_flow, .. }
            | ConcreteValueState::Primitive { in_flow, .. }
            | ConcreteValueState::Receiver { in_flow, .. } => in_flow,
        }
    }

    fn in_flow_mut(&mut self) -> &mut BTreeSet<InFlow> {
        match self {
            ConcreteValueState::Array { in_flow, .. }
            | ConcreteValueState::Class { in_flow, .. }
            | ConcreteValueState::Primitive { in_flow, .. }
            | ConcreteValueState::Receiver { in_flow, .. } => in_flow,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ConcreteValueState::Primitive { .. })
    }

    /// What is known about the value itself. Arrays only track
    /// nullability, receivers only their type.
    pub fn abstract_value(&self) -> AbstractValue {
        match self {
            ConcreteValueState::Class { value, .. } | ConcreteValueState::Primitive { value, .. } => {
                value.clone()
            }
            ConcreteValueState::Array { nullability, .. } => match nullability {
                Nullability::Bottom => AbstractValue::Bottom,
                Nullability::DefinitelyNull => AbstractValue::Null,
                Nullability::DefinitelyNotNull | Nullability::MaybeNull => AbstractValue::Unknown,
            },
            ConcreteValueState::Receiver { .. } => AbstractValue::Unknown,
        }
    }

    pub fn dynamic_type(&self) -> DynamicType {
        match self {
            ConcreteValueState::Class { dynamic_type, .. }
            | ConcreteValueState::Receiver { dynamic_type, .. } => *dynamic_type,
            ConcreteValueState::Array { .. } | ConcreteValueState::Primitive { .. } => {
                DynamicType::Unknown
            }
        }
    }

    pub fn nullability(&self) -> Nullability {
        match self {
            ConcreteValueState::Array { nullability, .. } => *nullability,
            ConcreteValueState::Class { dynamic_type, .. } => dynamic_type.nullability(),
            ConcreteValueState::Receiver { .. } => Nullability::DefinitelyNotNull,
            ConcreteValueState::Primitive { .. } => Nullability::Bottom,
        }
    }

    /// Nothing known and nothing pending.
    pub fn is_effectively_bottom(&self) -> bool {
        if !self.in_flow().is_empty() {
            return false;
        }
        match self {
            ConcreteValueState::Array { nullability, .. } => *nullability == Nullability::Bottom,
            ConcreteValueState::Class {
                value,
                dynamic_type,
                ..
            } => value.is_bottom() && dynamic_type.is_bottom(),
            ConcreteValueState::Primitive { value, .. } => value.is_bottom(),
            ConcreteValueState::Receiver { dynamic_type, .. } => dynamic_type.is_bottom(),
        }
    }

    /// Nothing useful known, whatever flows in later.
    pub fn is_effectively_unknown(&self) -> bool {
        match self {
            ConcreteValueState::Array { nullability, .. } => nullability.is_maybe_null(),
            ConcreteValueState::Class {
                value,
                dynamic_type,
                ..
            } => value.is_unknown() && dynamic_type.is_unknown(),
            ConcreteValueState::Primitive { value, .. } => value.is_unknown(),
            ConcreteValueState::Receiver { dynamic_type, .. } => dynamic_type.is_unknown(),
        }
    }

    fn join(&self, other: &ConcreteValueState, app: &AppView) -> ConcreteValueState {
        let mut in_flow = self.in_flow().clone();
        in_flow.extend(other.in_flow().iter().cloned());
        match (self, other) {
            (
                ConcreteValueState::Primitive { value: a, .. },
                ConcreteValueState::Primitive { value: b, .. },
            ) => ConcreteValueState::Primitive {
                value: a.join(b),
                in_flow,
            },
            (ConcreteValueState::Primitive { .. }, _) | (_, ConcreteValueState::Primitive { .. }) => {
                unreachable!("joining a primitive state with a reference state")
            }
            (ConcreteValueState::Array { .. }, ConcreteValueState::Array { .. }) => {
                ConcreteValueState::Array {
                    nullability: self.nullability().join(other.nullability()),
                    in_flow,
                }
            }
            (ConcreteValueState::Receiver { .. }, ConcreteValueState::Receiver { .. }) => {
                ConcreteValueState::Receiver {
                    dynamic_type: self.dynamic_type().join(other.dynamic_type(), app),
                    in_flow,
                }
            }
            _ => ConcreteValueState::Class {
                value: self.abstract_value().join(&other.abstract_value()),
                dynamic_type: self.joinable_dynamic_type().join(other.joinable_dynamic_type(), app),
                in_flow,
            },
        }
    }

    /// The dynamic type with nullability folded in, for joins across kinds.
    fn joinable_dynamic_type(&self) -> DynamicType {
        match self {
            ConcreteValueState::Array { nullability, .. } => match nullability {
                Nullability::Bottom => DynamicType::Bottom,
                _ => DynamicType::Unknown,
            },
            ConcreteValueState::Receiver { dynamic_type, .. } => {
                dynamic_type.with_nullability(Nullability::DefinitelyNotNull)
            }
            _ => self.dynamic_type(),
        }
    }

    fn widen(self, app: &AppView, static_type: TypeRef) -> ConcreteValueState {
        match self {
            ConcreteValueState::Class {
                value,
                dynamic_type,
                in_flow,
            } => ConcreteValueState::Class {
                value,
                dynamic_type: dynamic_type.widen(app, static_type),
                in_flow,
            },
            ConcreteValueState::Receiver {
                dynamic_type,
                in_flow,
            } => ConcreteValueState::Receiver {
                dynamic_type: dynamic_type.widen_receiver(static_type),
                in_flow,
            },
            other => other,
        }
    }

    /// The state after a successful `checkcast` to `ty`.
    pub fn cast(&self, app: &AppView, ty: TypeRef) -> ValueState {
        match self {
            ConcreteValueState::Class {
                value,
                dynamic_type,
                in_flow,
            } => ValueState::Concrete(ConcreteValueState::Class {
                value: value.clone(),
                dynamic_type: dynamic_type.cast(app, ty),
                in_flow: in_flow.clone(),
            }),
            ConcreteValueState::Receiver {
                dynamic_type,
                in_flow,
            } => ValueState::Concrete(ConcreteValueState::Receiver {
                dynamic_type: dynamic_type.cast(app, ty),
                in_flow: in_flow.clone(),
            }),
            other => ValueState::Concrete(other.clone()),
        }
    }
}
