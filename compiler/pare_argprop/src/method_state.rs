//! Per-method argument states.

use std::collections::BTreeMap;

use pare_ir::{FieldRef, MethodRef};

use crate::dynamic_type::DynamicType;
use crate::value_state::{StateJoiner, ValueState};

/// The arguments a method is called with.
///
/// A polymorphic state keeps one monomorphic state per receiver bound, so
/// calls on a `Circle` are not mixed into the state of `Square.draw`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodState {
    Bottom,
    /// One state per argument, receiver first.
    Monomorphic(Vec<ValueState>),
    Polymorphic(BTreeMap<DynamicType, MethodState>),
    Unknown,
}

static BOTTOM: MethodState = MethodState::Bottom;

impl MethodState {
    pub fn monomorphic(arguments: Vec<ValueState>) -> MethodState {
        if arguments.iter().all(ValueState::is_unknown) {
            MethodState::Unknown
        } else {
            MethodState::Monomorphic(arguments)
        }
    }

    /// `state` for calls whose receiver is bounded by `bound`.
    pub fn polymorphic(bound: DynamicType, state: MethodState) -> MethodState {
        if bound.is_unknown() && state.is_unknown() {
            MethodState::Unknown
        } else {
            MethodState::Polymorphic(BTreeMap::from([(bound, state)]))
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, MethodState::Bottom)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MethodState::Unknown)
    }

    pub fn arguments(&self) -> Option<&[ValueState]> {
        match self {
            MethodState::Monomorphic(arguments) => Some(arguments),
            _ => None,
        }
    }

    pub fn join(&mut self, other: MethodState, joiner: &StateJoiner<'_>) {
        let joined = match (std::mem::replace(self, MethodState::Bottom), other) {
            (MethodState::Bottom, state) | (state, MethodState::Bottom) => state,
            (MethodState::Unknown, _) | (_, MethodState::Unknown) => MethodState::Unknown,
            (MethodState::Monomorphic(mut ours), MethodState::Monomorphic(theirs)) => {
                debug_assert_eq!(ours.len(), theirs.len(), "argument count mismatch");
                if ours.len() == theirs.len() {
                    for (ours, theirs) in ours.iter_mut().zip(&theirs) {
                        ours.join(theirs, joiner);
                    }
                    MethodState::monomorphic(ours)
                } else {
                    MethodState::Unknown
                }
            }
            (MethodState::Polymorphic(mut ours), MethodState::Polymorphic(theirs)) => {
                for (bound, state) in theirs {
                    ours.entry(bound)
                        .or_insert(MethodState::Bottom)
                        .join(state, joiner);
                }
                if ours
                    .get(&DynamicType::Unknown)
                    .is_some_and(MethodState::is_unknown)
                {
                    MethodState::Unknown
                } else {
                    MethodState::Polymorphic(ours)
                }
            }
            (MethodState::Monomorphic(_), MethodState::Polymorphic(_))
            | (MethodState::Polymorphic(_), MethodState::Monomorphic(_)) => MethodState::Unknown,
        };
        *self = joined;
    }
}

/// Method states keyed by method; missing methods are bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodStateCollection {
    states: BTreeMap<MethodRef, MethodState>,
}

impl MethodStateCollection {
    pub fn add_method_state(&mut self, method: MethodRef, state: MethodState, joiner: &StateJoiner<'_>) {
        match state {
            MethodState::Bottom => {}
            MethodState::Unknown => {
                self.states.insert(method, MethodState::Unknown);
            }
            state => self
                .states
                .entry(method)
                .or_insert(MethodState::Bottom)
                .join(state, joiner),
        }
    }

    pub fn add_method_states(&mut self, other: MethodStateCollection, joiner: &StateJoiner<'_>) {
        for (method, state) in other.states {
            self.add_method_state(method, state, joiner);
        }
    }

    pub fn get(&self, method: &MethodRef) -> &MethodState {
        self.states.get(method).unwrap_or(&BOTTOM)
    }

    pub fn set(&mut self, method: MethodRef, state: MethodState) {
        if state.is_bottom() {
            self.states.remove(&method);
        } else {
            self.states.insert(method, state);
        }
    }

    pub fn remove(&mut self, method: &MethodRef) -> MethodState {
        self.states.remove(method).unwrap_or(MethodState::Bottom)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodRef, &MethodState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Field states keyed by field; missing fields are bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldStateCollection {
    states: BTreeMap<FieldRef, ValueState>,
}

static BOTTOM_VALUE: ValueState = ValueState::Bottom;

impl FieldStateCollection {
    pub fn add_field_state(&mut self, field: FieldRef, state: &ValueState, joiner: &StateJoiner<'_>) {
        if state.is_bottom() {
            return;
        }
        self.states
            .entry(field)
            .or_insert(ValueState::Bottom)
            .join(state, joiner);
    }

    pub fn add_field_states(&mut self, other: FieldStateCollection, joiner: &StateJoiner<'_>) {
        for (field, state) in other.states {
            self.add_field_state(field, &state, joiner);
        }
    }

    pub fn get(&self, field: &FieldRef) -> &ValueState {
        self.states.get(field).unwrap_or(&BOTTOM_VALUE)
    }

    /// Replaces the state of `field`, returning the previous one.
    pub fn set(&mut self, field: FieldRef, state: ValueState) -> ValueState {
        if state.is_bottom() {
            self.states.remove(&field)
        } else {
            self.states.insert(field, state)
        }
        .unwrap_or(ValueState::Bottom)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldRef, &ValueState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
