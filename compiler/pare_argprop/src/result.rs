//! What argument propagation learned.

use pare_ir::{FieldRef, MethodRef};

use crate::abstract_value::AbstractValue;
use crate::method_state::{FieldStateCollection, MethodState, MethodStateCollection};
use crate::value_state::{ConcreteValueState, ValueState};

/// Final states, with all in-flow resolved.
///
/// A method missing from the result is never called from program code; a
/// field missing from it is never assigned and never read uninitialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArgumentPropagationResult {
    methods: MethodStateCollection,
    fields: FieldStateCollection,
}

impl ArgumentPropagationResult {
    pub(crate) fn new(methods: MethodStateCollection, fields: FieldStateCollection) -> Self {
        ArgumentPropagationResult { methods, fields }
    }

    pub fn method_state(&self, method: &MethodRef) -> &MethodState {
        self.methods.get(method)
    }

    /// State of argument `index` of `method`; the receiver is argument 0.
    pub fn parameter_state(&self, method: &MethodRef, index: usize) -> ValueState {
        match self.methods.get(method) {
            MethodState::Bottom => ValueState::Bottom,
            MethodState::Monomorphic(arguments) => {
                arguments.get(index).cloned().unwrap_or(ValueState::Unknown)
            }
            MethodState::Polymorphic(_) | MethodState::Unknown => ValueState::Unknown,
        }
    }

    /// The integer every call passes as argument `index`, if there is one.
    pub fn constant_parameter(&self, method: &MethodRef, index: usize) -> Option<i64> {
        match self.parameter_state(method, index) {
            ValueState::Concrete(ConcreteValueState::Primitive {
                value: AbstractValue::Single(value),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    pub fn field_state(&self, field: &FieldRef) -> &ValueState {
        self.fields.get(field)
    }

    pub fn method_states(&self) -> impl Iterator<Item = (&MethodRef, &MethodState)> {
        self.methods.iter()
    }

    pub fn field_states(&self) -> impl Iterator<Item = (&FieldRef, &ValueState)> {
        self.fields.iter()
    }
}
