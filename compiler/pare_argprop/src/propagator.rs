//! The argument propagation pass.

use pare_app::AppView;
use pare_ir::{MethodRef, ProgramClass, ProgramField};
use rayon::prelude::*;

use crate::dispatch::propagate_to_dispatch_targets;
use crate::error::ArgPropError;
use crate::flow_graph::FlowGraph;
use crate::in_flow::BaseInFlow;
use crate::method_state::{FieldStateCollection, MethodState, MethodStateCollection};
use crate::result::ArgumentPropagationResult;
use crate::scanner::CodeScanner;
use crate::value_state::{StateJoiner, ValueState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropagatorOptions {
    /// A parameter or field depending on more sources is unknown.
    pub max_in_flow_size: usize,
}

impl Default for PropagatorOptions {
    fn default() -> Self {
        PropagatorOptions {
            max_in_flow_size: 16,
        }
    }
}

pub struct ArgumentPropagator<'a> {
    app: &'a AppView,
    options: &'a PropagatorOptions,
}

impl<'a> ArgumentPropagator<'a> {
    pub fn new(app: &'a AppView, options: &'a PropagatorOptions) -> Self {
        ArgumentPropagator { app, options }
    }

    pub fn run(self) -> Result<ArgumentPropagationResult, ArgPropError> {
        let app = self.app;
        let joiner = StateJoiner::new(app, self.options.max_in_flow_size);
        let scanned = CodeScanner::new(app, &joiner).run()?;
        let methods = propagate_to_dispatch_targets(app, scanned.methods, &joiner);
        let mut fields = scanned.fields;
        add_default_values(app, &mut fields, &joiner);

        let propagator = InFlowPropagator {
            app,
            joiner: &joiner,
        };
        let (methods, fields) = propagator.run(methods, fields);
        Ok(ArgumentPropagationResult::new(methods, fields))
    }
}

/// Solves each weakly connected component of the flow graph on its own.
struct InFlowPropagator<'a> {
    app: &'a AppView,
    joiner: &'a StateJoiner<'a>,
}

impl InFlowPropagator<'_> {
    fn run(
        &self,
        methods: MethodStateCollection,
        fields: FieldStateCollection,
    ) -> (MethodStateCollection, FieldStateCollection) {
        let graph = FlowGraph::build(self.app, &methods, &fields);
        let nodes = graph.len();
        let mut components = graph.into_components();
        components
            .par_iter_mut()
            .for_each(|component| component.propagate(self.app, self.joiner));
        tracing::debug!(
            nodes,
            components = components.len(),
            "propagated in-flow"
        );
        write_back(methods, fields, &components)
    }
}

/// A field is always assigned before it is read when it is final and
/// every initializer that can run first assigns it.
fn is_definitely_initialized(app: &AppView, class: &ProgramClass, field: &ProgramField) -> bool {
    if !field.access.is_final() {
        return false;
    }
    let reference = &field.reference;
    let Some(info) = app.field_access_info().get(reference) else {
        return false;
    };
    if !info.is_written_only_in_initializers(reference) {
        return false;
    }
    let writes = |method: &MethodRef| info.writers().any(|w| w == method);
    if field.is_static() {
        class
            .class_initializer()
            .is_some_and(|clinit| writes(&clinit.reference))
    } else {
        let mut constructors = class.instance_initializers().peekable();
        constructors.peek().is_some() && constructors.all(|c| writes(&c.reference))
    }
}

/// Fields that may be read before any write also hold zero or `null`.
fn add_default_values(app: &AppView, fields: &mut FieldStateCollection, joiner: &StateJoiner<'_>) {
    let mut defaulted = 0usize;
    for class in app.program().program_classes() {
        for field in &class.fields {
            if is_definitely_initialized(app, class, field) {
                continue;
            }
            let ty = field.reference.ty;
            let default = ValueState::default_value(ty).widen(app, ty);
            fields.add_field_state(field.reference, &default, joiner);
            defaulted += 1;
        }
    }
    tracing::debug!(defaulted, "added field default values");
}

/// Replaces every state that had in-flow by its node's final state.
fn write_back(
    mut methods: MethodStateCollection,
    mut fields: FieldStateCollection,
    components: &[FlowGraph],
) -> (MethodStateCollection, FieldStateCollection) {
    for node in components.iter().flat_map(FlowGraph::nodes) {
        match &node.key {
            BaseInFlow::Field(field) => {
                fields.set(*field, node.state.clone());
            }
            BaseInFlow::Parameter(parameter) => {
                if let MethodState::Monomorphic(arguments) = methods.get(&parameter.method) {
                    let mut arguments = arguments.clone();
                    if let Some(slot) = arguments.get_mut(parameter.index as usize) {
                        *slot = node.state.clone();
                    }
                    methods.set(parameter.method.clone(), MethodState::Monomorphic(arguments));
                }
            }
        }
    }

    let finished: Vec<_> = methods
        .iter()
        .filter_map(|(method, state)| {
            let arguments = state.arguments()?;
            if arguments.iter().all(ValueState::is_bottom) {
                Some((method.clone(), MethodState::Bottom))
            } else if arguments.iter().all(ValueState::is_unknown) {
                Some((method.clone(), MethodState::Unknown))
            } else {
                None
            }
        })
        .collect();
    for (method, state) in finished {
        methods.set(method, state);
    }
    (methods, fields)
}
