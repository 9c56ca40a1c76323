//! Flow constraints: where a parameter or field gets values from.

use std::fmt;

use pare_app::AppView;
use pare_ir::{FieldRef, MethodRef, TypeRef};
use smallvec::{smallvec, SmallVec};

use crate::value_state::{ConcreteValueState, ValueState};

/// Argument `index` of `method`; the receiver is argument 0.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodParameter {
    pub method: MethodRef,
    pub index: u32,
}

impl MethodParameter {
    pub fn new(method: MethodRef, index: u32) -> Self {
        MethodParameter { method, index }
    }
}

impl fmt::Display for MethodParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.method, self.index)
    }
}

impl fmt::Debug for MethodParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A node of the flow graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseInFlow {
    Field(FieldRef),
    Parameter(MethodParameter),
}

/// One source of values for a parameter or field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InFlow {
    Field(FieldRef),
    Parameter(MethodParameter),
    Function(AbstractFunction),
}

impl From<BaseInFlow> for InFlow {
    fn from(base: BaseInFlow) -> Self {
        match base {
            BaseInFlow::Field(field) => InFlow::Field(field),
            BaseInFlow::Parameter(parameter) => InFlow::Parameter(parameter),
        }
    }
}

/// How values are transformed on the way from the base in-flow to the
/// node that receives them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbstractFunction {
    Identity(BaseInFlow),
    Cast {
        base: BaseInFlow,
        ty: TypeRef,
    },
    Or {
        base: BaseInFlow,
        constant: i64,
    },
    /// `receiver.field`, for a receiver flowing in from `receiver`.
    InstanceFieldRead {
        receiver: BaseInFlow,
        field: FieldRef,
    },
    Unknown,
}

impl AbstractFunction {
    /// The nodes this function reads; the only ones it may look up.
    pub fn base_in_flow(&self) -> SmallVec<[BaseInFlow; 2]> {
        match self {
            AbstractFunction::Identity(base)
            | AbstractFunction::Cast { base, .. }
            | AbstractFunction::Or { base, .. } => smallvec![base.clone()],
            AbstractFunction::InstanceFieldRead { receiver, field } => {
                smallvec![receiver.clone(), BaseInFlow::Field(*field)]
            }
            AbstractFunction::Unknown => SmallVec::new(),
        }
    }

    pub fn contains_base_in_flow(&self, base: &BaseInFlow) -> bool {
        self.base_in_flow().contains(base)
    }

    /// Whether [`apply`](Self::apply) reads other nodes' states.
    pub fn uses_state_provider(&self) -> bool {
        matches!(self, AbstractFunction::InstanceFieldRead { .. })
    }

    /// The state flowing out of the function when `state` flows in.
    pub fn apply(
        &self,
        app: &AppView,
        states: &dyn FlowGraphStateProvider,
        state: &ConcreteValueState,
    ) -> ValueState {
        match self {
            AbstractFunction::Identity(_) => ValueState::Concrete(state.clone()),
            AbstractFunction::Cast { ty, .. } => state.cast(app, *ty),
            AbstractFunction::Or { constant, .. } => match state {
                ConcreteValueState::Primitive { value, in_flow } => {
                    ValueState::primitive_with_in_flow(value.or_integers(*constant), in_flow.clone())
                }
                other => unreachable!("bitwise or applied to {other:?}"),
            },
            AbstractFunction::InstanceFieldRead { field, .. } => {
                states.state(&BaseInFlow::Field(*field))
            }
            AbstractFunction::Unknown => ValueState::Unknown,
        }
    }
}

/// Read access to node states while a function is applied.
pub trait FlowGraphStateProvider {
    fn state(&self, base: &BaseInFlow) -> ValueState;
}

/// Restricts lookups to the declared inputs of one function; any other
/// lookup is a bug in the function.
pub(crate) struct CheckedStateProvider<'a, P: ?Sized> {
    inner: &'a P,
    function: &'a AbstractFunction,
}

impl<'a, P: FlowGraphStateProvider + ?Sized> CheckedStateProvider<'a, P> {
    pub(crate) fn new(inner: &'a P, function: &'a AbstractFunction) -> Self {
        CheckedStateProvider { inner, function }
    }
}

impl<P: FlowGraphStateProvider + ?Sized> FlowGraphStateProvider for CheckedStateProvider<'_, P> {
    fn state(&self, base: &BaseInFlow) -> ValueState {
        assert!(
            self.function.uses_state_provider(),
            "{:?} must not look up flow graph state",
            self.function
        );
        assert!(
            self.function.contains_base_in_flow(base),
            "{:?} looked up undeclared input {base:?}",
            self.function
        );
        self.inner.state(base)
    }
}

#[cfg(test)]
mod tests;
