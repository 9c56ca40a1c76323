use pare_app::KeepInfo;
use pare_ir::MethodRef;
use pretty_assertions::assert_eq;

use super::FlowGraph;
use crate::abstract_value::AbstractValue;
use crate::in_flow::{AbstractFunction, BaseInFlow, InFlow, MethodParameter};
use crate::method_state::{FieldStateCollection, MethodState, MethodStateCollection};
use crate::test_helpers::{app, main_class, method, public_static, returns_nothing, ty, MAIN};
use crate::value_state::{StateJoiner, ValueState};

fn takes_int(name: &str) -> MethodRef {
    method(MAIN, name, "V", &["I"])
}

fn parameter_of(name: &str) -> InFlow {
    InFlow::Parameter(MethodParameter::new(takes_int(name), 0))
}

fn node_state(graph: &FlowGraph, name: &str) -> ValueState {
    let key = BaseInFlow::Parameter(MethodParameter::new(takes_int(name), 0));
    let id = graph.node_id(&key).unwrap_or_else(|| panic!("no node for {name}"));
    graph.nodes().nth(id.index()).map(|n| n.state.clone()).unwrap_or(ValueState::Unknown)
}

#[test]
fn unrelated_chains_are_separate_components() {
    let names = ["a", "b", "c", "d", "e"];
    let app = app(
        [main_class(
            names
                .iter()
                .map(|name| returns_nothing(takes_int(name), public_static())),
        )],
        KeepInfo::new(),
    );
    let joiner = StateJoiner::new(&app, 16);
    let int = |v| ValueState::primitive(AbstractValue::Single(v));
    let mut methods = MethodStateCollection::default();
    methods.set(takes_int("a"), MethodState::monomorphic(vec![int(1)]));
    methods.set(
        takes_int("b"),
        MethodState::monomorphic(vec![ValueState::from_in_flow(ty("I"), parameter_of("a"))]),
    );
    methods.set(takes_int("c"), MethodState::monomorphic(vec![int(2)]));
    methods.set(
        takes_int("d"),
        MethodState::monomorphic(vec![ValueState::from_in_flow(
            ty("I"),
            InFlow::Function(AbstractFunction::Or {
                base: BaseInFlow::Parameter(MethodParameter::new(takes_int("c"), 0)),
                constant: 1,
            }),
        )]),
    );
    methods.set(
        takes_int("e"),
        MethodState::monomorphic(vec![ValueState::from_in_flow(ty("I"), parameter_of("d"))]),
    );

    let graph = FlowGraph::build(&app, &methods, &FieldStateCollection::default());
    assert_eq!(graph.len(), 5);
    let mut components = graph.into_components();
    assert_eq!(
        components.iter().map(FlowGraph::len).collect::<Vec<_>>(),
        vec![2, 3]
    );
    for component in &mut components {
        component.propagate(&app, &joiner);
    }
    assert_eq!(node_state(&components[0], "b"), int(1));
    assert_eq!(node_state(&components[1], "d"), int(3));
    assert_eq!(node_state(&components[1], "e"), int(3));
}

#[test]
fn unknown_sources_make_identity_targets_unknown() {
    let app = app(
        [main_class(
            ["a", "b"]
                .iter()
                .map(|name| returns_nothing(takes_int(name), public_static())),
        )],
        KeepInfo::new(),
    );
    let joiner = StateJoiner::new(&app, 16);
    let mut methods = MethodStateCollection::default();
    methods.set(takes_int("a"), MethodState::Unknown);
    methods.set(
        takes_int("b"),
        MethodState::monomorphic(vec![ValueState::from_in_flow(ty("I"), parameter_of("a"))]),
    );
    let mut graph = FlowGraph::build(&app, &methods, &FieldStateCollection::default());
    graph.propagate(&app, &joiner);
    assert!(node_state(&graph, "b").is_unknown());
}
