//! The graph of in-flow between parameters and fields.
//!
//! Every parameter or field whose state still depends on another one is a
//! node; an edge carries the functions applied on the way. Node states have
//! their in-flow removed: the edges represent it.

use std::collections::{BTreeMap, BTreeSet};

use pare_app::AppView;
use pare_ir::{known, TypeRef};

use crate::abstract_value::AbstractValue;
use crate::dynamic_type::{DynamicType, Nullability};
use crate::in_flow::{
    AbstractFunction, BaseInFlow, CheckedStateProvider, FlowGraphStateProvider, InFlow,
    MethodParameter,
};
use crate::method_state::{FieldStateCollection, MethodState, MethodStateCollection};
use crate::value_state::{ConcreteValueState, StateJoiner, ValueState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(u32);

impl NodeId {
    fn from_index(index: usize) -> Self {
        NodeId(u32::try_from(index).unwrap_or_else(|_| panic!("flow graph has too many nodes")))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) key: BaseInFlow,
    pub(crate) static_type: TypeRef,
    pub(crate) is_receiver: bool,
    pub(crate) state: ValueState,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeMap<NodeId, BTreeSet<AbstractFunction>>,
    in_worklist: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FlowGraph {
    nodes: Vec<Node>,
    ids: BTreeMap<BaseInFlow, NodeId>,
    worklist: Vec<NodeId>,
}

impl FlowGraph {
    /// One node per parameter or field that has in-flow or is in-flow.
    pub(crate) fn build(
        app: &AppView,
        methods: &MethodStateCollection,
        fields: &FieldStateCollection,
    ) -> FlowGraph {
        let mut graph = FlowGraph::default();
        let mut builder = Builder {
            app,
            methods,
            fields,
            graph: &mut graph,
        };
        for (method, state) in methods.iter() {
            let Some(arguments) = state.arguments() else {
                continue;
            };
            for (index, argument) in (0..).zip(arguments) {
                if argument.has_in_flow() {
                    let key = BaseInFlow::Parameter(MethodParameter::new(method.clone(), index));
                    builder.add_in_flow(key, argument);
                }
            }
        }
        for (field, state) in fields.iter() {
            if state.has_in_flow() {
                builder.add_in_flow(BaseInFlow::Field(*field), state);
            }
        }
        graph.reset_worklist();
        graph
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub(crate) fn node_id(&self, key: &BaseInFlow) -> Option<NodeId> {
        self.ids.get(key).copied()
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Splits the graph into weakly connected components.
    pub(crate) fn into_components(self) -> Vec<FlowGraph> {
        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();
        for (i, node) in self.nodes.iter().enumerate() {
            for successor in node.successors.keys() {
                let a = find_root(&mut parent, i);
                let b = find_root(&mut parent, successor.index());
                parent[a.max(b)] = a.min(b);
            }
        }
        let roots: Vec<usize> = (0..self.nodes.len())
            .map(|i| find_root(&mut parent, i))
            .collect();
        let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
        let remap: Vec<NodeId> = roots
            .iter()
            .map(|&root| {
                let size = sizes.entry(root).or_default();
                *size += 1;
                NodeId::from_index(*size - 1)
            })
            .collect();

        let mut components: BTreeMap<usize, FlowGraph> = BTreeMap::new();
        for (node, &root) in self.nodes.into_iter().zip(&roots) {
            let component = components.entry(root).or_default();
            let id = NodeId::from_index(component.nodes.len());
            component.ids.insert(node.key.clone(), id);
            component.nodes.push(Node {
                predecessors: node.predecessors.iter().map(|p| remap[p.index()]).collect(),
                successors: node
                    .successors
                    .into_iter()
                    .map(|(s, functions)| (remap[s.index()], functions))
                    .collect(),
                ..node
            });
        }
        components
            .into_values()
            .map(|mut component| {
                component.reset_worklist();
                component
            })
            .collect()
    }

    fn reset_worklist(&mut self) {
        self.worklist = (0..self.nodes.len()).rev().map(NodeId::from_index).collect();
        for node in &mut self.nodes {
            node.in_worklist = true;
        }
    }

    /// Runs the worklist to a fixed point.
    pub(crate) fn propagate(&mut self, app: &AppView, joiner: &StateJoiner<'_>) {
        while let Some(id) = self.worklist.pop() {
            let node = self.node_mut(id);
            node.in_worklist = false;
            let (state, static_type) = (node.state.clone(), node.static_type);
            let outputs: Vec<(NodeId, ValueState)> = match state {
                ValueState::Bottom => continue,
                ValueState::Unknown => {
                    let outputs = self.apply_all(app, id, &narrowed_unknown(static_type));
                    self.clear_successors(id);
                    outputs
                }
                ValueState::Concrete(state) => self.apply_all(app, id, &state),
            };
            for (successor, state) in outputs {
                self.add_state(app, joiner, successor, state);
            }
        }
    }

    fn apply_all(
        &self,
        app: &AppView,
        id: NodeId,
        input: &ConcreteValueState,
    ) -> Vec<(NodeId, ValueState)> {
        let checked = cfg!(debug_assertions);
        let mut outputs = Vec::new();
        for (&successor, functions) in &self.node(id).successors {
            for function in functions {
                let output = if checked && function.uses_state_provider() {
                    let provider = CheckedStateProvider::new(self, function);
                    function.apply(app, &provider, input)
                } else {
                    function.apply(app, self, input)
                };
                outputs.push((successor, output.clear_in_flow()));
            }
        }
        outputs
    }

    /// Joins `state` into the node; returns whether the node changed.
    pub(crate) fn add_state(
        &mut self,
        app: &AppView,
        joiner: &StateJoiner<'_>,
        id: NodeId,
        state: ValueState,
    ) -> bool {
        let node = self.node_mut(id);
        let state = if node.is_receiver {
            state.into_receiver()
        } else {
            state
        };
        if !node.state.join(&state, joiner) {
            return false;
        }
        let widened = std::mem::replace(&mut node.state, ValueState::Bottom).widen(app, node.static_type);
        node.state = widened;
        if node.state.is_unknown() {
            self.clear_predecessors(id);
        }
        self.enqueue(id);
        true
    }

    pub(crate) fn enqueue(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        if !node.in_worklist {
            node.in_worklist = true;
            self.worklist.push(id);
        }
    }

    /// Nothing flowing into an unknown node can change it any more.
    fn clear_predecessors(&mut self, id: NodeId) {
        let predecessors = std::mem::take(&mut self.node_mut(id).predecessors);
        for predecessor in predecessors {
            self.node_mut(predecessor).successors.remove(&id);
        }
    }

    fn clear_successors(&mut self, id: NodeId) {
        let successors = std::mem::take(&mut self.node_mut(id).successors);
        for successor in successors.into_keys() {
            self.node_mut(successor).predecessors.remove(&id);
        }
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, function: AbstractFunction) {
        self.node_mut(from)
            .successors
            .entry(to)
            .or_default()
            .insert(function);
        self.node_mut(to).predecessors.insert(from);
    }
}

impl FlowGraphStateProvider for FlowGraph {
    fn state(&self, base: &BaseInFlow) -> ValueState {
        self.node_id(base)
            .map_or(ValueState::Unknown, |id| self.node(id).state.clone())
    }
}

/// What an unknown node still says: its static type.
fn narrowed_unknown(static_type: TypeRef) -> ConcreteValueState {
    if static_type.is_primitive() {
        ConcreteValueState::Primitive {
            value: AbstractValue::Unknown,
            in_flow: BTreeSet::new(),
        }
    } else if static_type.is_array() {
        ConcreteValueState::Array {
            nullability: Nullability::MaybeNull,
            in_flow: BTreeSet::new(),
        }
    } else {
        ConcreteValueState::Class {
            value: AbstractValue::Unknown,
            dynamic_type: DynamicType::bounded(static_type, Nullability::MaybeNull),
            in_flow: BTreeSet::new(),
        }
    }
}

struct Builder<'a, 'g> {
    app: &'a AppView,
    methods: &'a MethodStateCollection,
    fields: &'a FieldStateCollection,
    graph: &'g mut FlowGraph,
}

impl Builder<'_, '_> {
    fn add_in_flow(&mut self, key: BaseInFlow, state: &ValueState) {
        let target = self.get_or_create(&key);
        for in_flow in state.in_flow().into_iter().flatten() {
            match in_flow {
                InFlow::Field(field) => {
                    let base = BaseInFlow::Field(*field);
                    self.add_edge(base.clone(), target, AbstractFunction::Identity(base));
                }
                InFlow::Parameter(parameter) => {
                    let base = BaseInFlow::Parameter(parameter.clone());
                    self.add_edge(base.clone(), target, AbstractFunction::Identity(base));
                }
                InFlow::Function(function) => {
                    for base in function.base_in_flow() {
                        self.add_edge(base, target, function.clone());
                    }
                }
            }
        }
    }

    fn add_edge(&mut self, base: BaseInFlow, target: NodeId, function: AbstractFunction) {
        let source = self.get_or_create(&base);
        self.graph.add_edge(source, target, function);
    }

    fn get_or_create(&mut self, key: &BaseInFlow) -> NodeId {
        if let Some(id) = self.graph.node_id(key) {
            return id;
        }
        let (static_type, is_receiver, state) = self.describe(key);
        let id = NodeId::from_index(self.graph.nodes.len());
        self.graph.nodes.push(Node {
            key: key.clone(),
            static_type,
            is_receiver,
            state: state.clear_in_flow(),
            predecessors: BTreeSet::new(),
            successors: BTreeMap::new(),
            in_worklist: true,
        });
        self.graph.ids.insert(key.clone(), id);
        id
    }

    /// Static type, receiver-ness and current state of a parameter or field.
    fn describe(&self, key: &BaseInFlow) -> (TypeRef, bool, ValueState) {
        match key {
            BaseInFlow::Field(field) => (field.ty, false, self.fields.get(field).clone()),
            BaseInFlow::Parameter(parameter) => {
                let Some(method) = self.app.program().method(&parameter.method) else {
                    return (known::object(), false, ValueState::Unknown);
                };
                let index = parameter.index as usize;
                let static_type = method
                    .argument_types()
                    .get(index)
                    .copied()
                    .unwrap_or_else(known::object);
                let state = match self.methods.get(&parameter.method) {
                    MethodState::Bottom => ValueState::Bottom,
                    MethodState::Monomorphic(arguments) => {
                        arguments.get(index).cloned().unwrap_or(ValueState::Unknown)
                    }
                    MethodState::Polymorphic(_) | MethodState::Unknown => ValueState::Unknown,
                };
                (static_type, index == 0 && !method.is_static(), state)
            }
        }
    }
}

#[cfg(test)]
mod tests;
