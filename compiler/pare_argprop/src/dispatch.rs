//! Moves the states of virtual calls onto the methods they dispatch to.

use pare_app::AppView;
use pare_ir::ProgramMethod;

use crate::dynamic_type::DynamicType;
use crate::method_state::{MethodState, MethodStateCollection};
use crate::value_state::StateJoiner;

/// Non-abstract methods overriding `method` in its subtypes, in type order.
pub(crate) fn overrides<'a>(app: &'a AppView, method: &ProgramMethod) -> Vec<&'a ProgramMethod> {
    let reference = &method.reference;
    app.hierarchy()
        .subtypes(reference.holder)
        .into_iter()
        .filter_map(|ty| app.program_definition_for(ty))
        .filter_map(|class| class.method_by_signature(reference.name, &reference.proto))
        .filter(|m| m.is_virtual() && !m.is_abstract())
        .collect()
}

/// Whether a receiver bounded by `bound` may run `candidate`.
fn may_dispatch_to(app: &AppView, bound: DynamicType, candidate: &ProgramMethod) -> bool {
    let DynamicType::Bounded {
        upper_bound, exact, ..
    } = bound
    else {
        return bound.is_unknown();
    };
    let resolved = app
        .resolve_method(&candidate.reference.with_holder(upper_bound))
        .is_some_and(|m| m.reference == candidate.reference);
    resolved || (!exact && app.is_subtype(candidate.reference.holder, upper_bound))
}

/// Replaces every polymorphic state by monomorphic states on each possible
/// dispatch target, and spreads unknown states of virtual methods to their
/// overrides.
pub(crate) fn propagate_to_dispatch_targets(
    app: &AppView,
    methods: MethodStateCollection,
    joiner: &StateJoiner<'_>,
) -> MethodStateCollection {
    let mut dispatched = MethodStateCollection::default();
    let mut polymorphic = 0usize;
    for (reference, state) in methods.iter() {
        let Some(method) = app.program().method(reference).filter(|m| m.is_virtual()) else {
            dispatched.add_method_state(reference.clone(), state.clone(), joiner);
            continue;
        };
        match state {
            MethodState::Polymorphic(bounds) => {
                polymorphic += 1;
                let candidates: Vec<&ProgramMethod> = Some(method)
                    .filter(|m| !m.is_abstract())
                    .into_iter()
                    .chain(overrides(app, method))
                    .collect();
                for (&bound, state) in bounds {
                    for candidate in candidates
                        .iter()
                        .filter(|c| may_dispatch_to(app, bound, c))
                    {
                        dispatched.add_method_state(
                            candidate.reference.clone(),
                            state.clone(),
                            joiner,
                        );
                    }
                }
            }
            MethodState::Unknown => {
                dispatched.add_method_state(reference.clone(), MethodState::Unknown, joiner);
                for candidate in overrides(app, method) {
                    dispatched.add_method_state(
                        candidate.reference.clone(),
                        MethodState::Unknown,
                        joiner,
                    );
                }
            }
            state => dispatched.add_method_state(reference.clone(), state.clone(), joiner),
        }
    }
    tracing::debug!(polymorphic, "propagated to dispatch targets");
    dispatched
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
