//! Merging the instance initializers of a group.
//!
//! # Architecture
//!
//! Without a class id field, every constructor simply moves to the target
//! and the tree fixer places it like any other method.
//!
//! With a class id field, constructors are grouped by their prototype after
//! type mapping. Each original body moves into a private helper
//! `constructor$N` that must be inlined later. Each prototype gets one
//! dispatching constructor that stores the class id and calls the helper of
//! the class being constructed:
//!
//! - a prototype shared by several classes gets `<init>(P, Arg, int)`, and
//!   each call site passes `null` and its class id through call-site
//!   prototype changes;
//! - a prototype used by one class keeps its signature and stores that
//!   class's id as a constant.

use std::collections::BTreeMap;

use pare_app::{AppView, FieldAccessInfoModifier};
use pare_ir::ir::{IfKind, IfType, InvokeKind, IrBuilder, IrCode, IrError, Terminator, ValueId};
use pare_ir::program::MethodInfo;
use pare_ir::{known, AccessFlags, FieldRef, MethodRef, MethodSignature, Name, ProgramMethod, Proto};
use pare_lens::{ExtraParameter, LensBuilder, PrototypeChanges};
use rustc_hash::FxHashSet;

use crate::error::MergeError;
use crate::group::{MergeGroup, TypeMap};
use crate::synthetic_argument::SyntheticArgumentClass;

#[derive(Default)]
pub(crate) struct ConstructorMerge {
    /// Helpers and dispatching constructors, already in final names.
    pub placed: Vec<ProgramMethod>,
    /// Constructors left to the tree fixer, in original names.
    pub pending: Vec<ProgramMethod>,
    /// Dispatching constructors, whose bodies need no rewriting.
    pub synthesized: Vec<MethodRef>,
}

pub(crate) struct ConstructorMerger<'a> {
    pub app: &'a AppView,
    pub group: &'a MergeGroup,
    pub type_map: &'a TypeMap,
}

impl ConstructorMerger<'_> {
    pub(crate) fn merge(
        &self,
        synthetic_argument: &mut SyntheticArgumentClass,
        builder: &mut LensBuilder,
        field_access: &mut FieldAccessInfoModifier,
    ) -> Result<ConstructorMerge, MergeError> {
        let ctors = self.group.classes().iter().flat_map(|&ty| {
            let id = self.group.class_id(ty).unwrap_or_default();
            self.app
                .definition_for(ty)
                .into_iter()
                .flat_map(|c| c.instance_initializers())
                .map(move |m| (id, m))
        });
        let (Some(target), Some(class_id_field)) =
            (self.group.target(), self.group.class_id_field())
        else {
            return Ok(ConstructorMerge {
                pending: ctors.map(|(_, m)| m.clone()).collect(),
                ..ConstructorMerge::default()
            });
        };

        // Two constructors of one class may map to the same prototype; the
        // later one is padded with `null` arguments until it is free.
        let mut by_proto: BTreeMap<Proto, BTreeMap<i32, (&ProgramMethod, usize)>> =
            BTreeMap::new();
        for (id, ctor) in ctors {
            let mut proto = self.type_map.map_proto(&ctor.reference.proto);
            let mut padding = 0;
            while by_proto.get(&proto).is_some_and(|c| c.contains_key(&id)) {
                proto = proto.append_params([synthetic_argument.use_type()]);
                padding += 1;
            }
            by_proto.entry(proto).or_default().insert(id, (ctor, padding));
        }

        let mut taken = self.taken_signatures();
        let mut next_helper = 0u32;
        let mut merge = ConstructorMerge::default();
        for (proto, ctors) in by_proto {
            let mut helpers: BTreeMap<i32, MethodRef> = BTreeMap::new();
            for (&id, &(ctor, _)) in &ctors {
                let helper_proto = self.type_map.map_proto(&ctor.reference.proto);
                let helper = loop {
                    let name = Name::intern(&format!("constructor${next_helper}"));
                    next_helper += 1;
                    let signature = MethodSignature {
                        name,
                        proto: helper_proto.clone(),
                    };
                    if taken.insert(signature) {
                        break MethodRef::new(target, name, helper_proto.clone());
                    }
                };
                builder.set_representative_method(helper.clone(), ctor.reference.clone());
                merge.placed.push(ProgramMethod {
                    reference: helper.clone(),
                    access: AccessFlags::PRIVATE | AccessFlags::SYNTHETIC,
                    code: ctor.code.clone(),
                    info: MethodInfo {
                        force_inline: true,
                        ..ctor.info.clone()
                    },
                });
                helpers.insert(id, helper);
            }

            let shared = ctors.len() > 1;
            let dispatch_proto = if shared {
                proto.append_params([synthetic_argument.use_type(), known::int()])
            } else {
                proto.clone()
            };
            let dispatch = MethodRef::new(target, known::init(), dispatch_proto);
            for (&id, &(ctor, padding)) in &ctors {
                builder.move_method(ctor.reference.clone(), dispatch.clone());
                let mut changes = PrototypeChanges::none();
                for _ in 0..padding {
                    changes = changes.with_extra_parameter(ExtraParameter::UnusedNull(
                        synthetic_argument.use_type(),
                    ));
                }
                if shared {
                    changes = changes
                        .with_extra_parameter(ExtraParameter::UnusedNull(
                            synthetic_argument.use_type(),
                        ))
                        .with_extra_parameter(ExtraParameter::ConstantInt(id));
                }
                builder.record_call_site_changes(ctor.reference.clone(), changes);
            }
            if let Some((first, _)) = ctors.values().next() {
                builder.set_representative_method(dispatch.clone(), first.reference.clone());
            }

            let code = dispatch_body(&dispatch, class_id_field, &helpers, shared).map_err(
                |source| MergeError::Synthesize {
                    method: dispatch.clone(),
                    source,
                },
            )?;
            field_access.record_write(class_id_field, dispatch.clone());
            tracing::trace!(
                %dispatch,
                classes = helpers.len(),
                "synthesized dispatching constructor"
            );
            merge.synthesized.push(dispatch.clone());
            merge.placed.push(ProgramMethod::new(
                dispatch,
                AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR | AccessFlags::SYNTHETIC,
                Some(code.into()),
            ));
        }
        Ok(merge)
    }

    /// Signatures of every method of the group once merged.
    fn taken_signatures(&self) -> FxHashSet<MethodSignature> {
        self.group
            .classes()
            .iter()
            .filter_map(|&ty| self.app.definition_for(ty))
            .flat_map(|c| c.methods.iter())
            .map(|m| self.type_map.map_method(&m.reference).signature())
            .collect()
    }
}

/// Store the class id, then call the helper registered for it. The last
/// helper is the default and needs no test.
fn dispatch_body(
    dispatch: &MethodRef,
    class_id_field: FieldRef,
    helpers: &BTreeMap<i32, MethodRef>,
    passes_class_id: bool,
) -> Result<IrCode, IrError> {
    let mut b = IrBuilder::new(dispatch.clone(), false);
    let this = b.argument(0);
    let arity = if passes_class_id {
        dispatch.proto.arity() - 2
    } else {
        dispatch.proto.arity()
    };
    let params: Vec<ValueId> = (1..=arity).map(|i| b.argument(i)).collect();
    let class_id = if passes_class_id {
        b.argument(arity + 2)
    } else {
        let only = helpers.keys().next().copied().unwrap_or_default();
        b.const_int(only)
    };
    b.instance_put(class_id_field, this, class_id);

    // Padding arguments are not passed on.
    let call = |b: &mut IrBuilder, helper: &MethodRef| {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(this);
        args.extend_from_slice(&params[..helper.proto.arity()]);
        b.invoke(InvokeKind::Direct, helper.clone(), args);
        b.ret(None);
    };
    let entries: Vec<(i32, &MethodRef)> = helpers.iter().map(|(&id, h)| (id, h)).collect();
    if let Some(((_, last), rest)) = entries.split_last() {
        for &(id, helper) in rest {
            let constant = b.const_int(id);
            let call_block = b.new_block();
            let next = b.new_block();
            b.terminate(Terminator::If {
                kind: IfKind::Ne,
                ty: IfType::Int,
                lhs: class_id,
                rhs: Some(constant),
                target: next,
            });
            b.switch_to(call_block);
            call(&mut b, helper);
            b.switch_to(next);
        }
        call(&mut b, last);
    } else {
        b.ret(None);
    }
    b.finish()
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
