//! Argument propagation.
//!
//! # Architecture
//!
//! Computes, for every parameter of every program method and every program
//! field, an abstract description of the values it may hold at runtime:
//! integer constants or sets, `null`-ness and the dynamic type of
//! references.
//!
//! 1. **Scanning** visits every call site
//!    and field write in parallel. Arguments known locally become concrete
//!    states; arguments that come from a parameter or field of the caller
//!    become *in-flow*, possibly through an [`AbstractFunction`] such as a
//!    cast or a bitwise `or`. Kept methods, methods reachable through
//!    method handles and overrides of library methods are unknown.
//! 2. **Dispatch** moves the per-receiver-bound states of virtual calls onto
//!    each method the call may run.
//! 3. **Flow graph.** Parameters and fields with in-flow become nodes; each
//!    weakly connected component is solved to a fixed point with a
//!    worklist, in parallel. Fields that may be read before they are
//!    assigned also hold their default value.
//!
//! States only grow. Any state depending on more than
//! [`PropagatorOptions::max_in_flow_size`] sources is unknown, which bounds
//! the work per node.

mod abstract_value;
mod dispatch;
mod dynamic_type;
mod error;
mod flow_graph;
mod in_flow;
mod method_state;
mod propagator;
mod result;
mod scanner;
mod value_state;

#[cfg(test)]
mod test_helpers;

pub use abstract_value::{AbstractValue, MAX_SET_SIZE};
pub use dynamic_type::{DynamicType, Nullability};
pub use error::ArgPropError;
pub use in_flow::{AbstractFunction, BaseInFlow, FlowGraphStateProvider, InFlow, MethodParameter};
pub use method_state::{FieldStateCollection, MethodState, MethodStateCollection};
pub use propagator::{ArgumentPropagator, PropagatorOptions};
pub use result::ArgumentPropagationResult;
pub use value_state::{ConcreteValueState, StateJoiner, ValueState};

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
