//! Collects the argument states of every call and the values stored into
//! every field.
//!
//! Values that are known locally (constants, allocations, `null`) become
//! concrete states right away. Values that come from a parameter or a field
//! of the scanned method become in-flow, resolved later by the flow graph.

use std::sync::Arc;

use pare_app::AppView;
use pare_ir::ir::{BinopKind, InvokeKind, IrCode, Op, ValueDef, ValueId};
use pare_ir::lir::lir_to_ir;
use pare_ir::{
    known, BootstrapArg, CallSite, Code, FieldRef, HandleMember, MethodHandle, MethodRef,
    ProgramClass, ProgramMethod, TypeRef,
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::abstract_value::AbstractValue;
use crate::dispatch::overrides;
use crate::dynamic_type::{DynamicType, Nullability};
use crate::error::ArgPropError;
use crate::in_flow::{AbstractFunction, BaseInFlow, InFlow, MethodParameter};
use crate::method_state::{FieldStateCollection, MethodState, MethodStateCollection};
use crate::value_state::{StateJoiner, ValueState};

/// States seen at call sites and field writes, before in-flow is resolved.
#[derive(Debug, Default)]
pub(crate) struct ScanResult {
    pub(crate) methods: MethodStateCollection,
    pub(crate) fields: FieldStateCollection,
}

/// Visits every program method body in parallel.
pub(crate) struct CodeScanner<'a> {
    app: &'a AppView,
    joiner: &'a StateJoiner<'a>,
}

impl<'a> CodeScanner<'a> {
    pub(crate) fn new(app: &'a AppView, joiner: &'a StateJoiner<'a>) -> Self {
        CodeScanner { app, joiner }
    }

    pub(crate) fn run(self) -> Result<ScanResult, ArgPropError> {
        let CodeScanner { app, joiner } = self;
        let classes: Vec<&Arc<ProgramClass>> = app.program().program_classes().collect();
        let scanned = classes
            .par_iter()
            .map(|class| {
                let mut local = ScanResult::default();
                let mut escaping = Vec::new();
                for method in &class.methods {
                    if overrides_library_method(app, class, method) {
                        escaping.push(method.reference.clone());
                    }
                    let Some(code) = decode(method)? else {
                        continue;
                    };
                    MethodScan::new(app, joiner, &code, &mut local, &mut escaping).run();
                }
                Ok((local, escaping))
            })
            .collect::<Result<Vec<_>, ArgPropError>>()?;

        let mut result = ScanResult::default();
        let mut escaping = Vec::new();
        for (local, local_escaping) in scanned {
            result.methods.add_method_states(local.methods, joiner);
            result.fields.add_field_states(local.fields, joiner);
            escaping.extend(local_escaping);
        }
        for method in app.keep_info().pinned_methods() {
            escaping.push(method.clone());
        }
        for method in escaping {
            result
                .methods
                .add_method_state(method, MethodState::Unknown, joiner);
        }
        for field in app.keep_info().pinned_fields() {
            result.fields.set(*field, ValueState::Unknown);
        }
        tracing::debug!(
            methods = result.methods.len(),
            fields = result.fields.len(),
            "scanned call sites"
        );
        Ok(result)
    }
}

fn decode(method: &ProgramMethod) -> Result<Option<IrCode>, ArgPropError> {
    match &method.code {
        None => Ok(None),
        Some(Code::Ir(ir)) => Ok(Some((**ir).clone())),
        Some(Code::Lir(lir)) => lir_to_ir(
            lir,
            method.reference.clone(),
            method.is_static(),
            &method.argument_types(),
        )
        .map(Some)
        .map_err(|source| ArgPropError::Decode {
            method: method.reference.clone(),
            source,
        }),
    }
}

/// Library code may call a virtual method that overrides one of its own
/// with anything.
fn overrides_library_method(app: &AppView, class: &ProgramClass, method: &ProgramMethod) -> bool {
    if !method.is_virtual() {
        return false;
    }
    let mut pending: Vec<TypeRef> = class.supertypes().collect();
    let mut seen = Vec::new();
    while let Some(ty) = pending.pop() {
        if seen.contains(&ty) {
            continue;
        }
        seen.push(ty);
        let Some(supertype) = app.definition_for(ty) else {
            continue;
        };
        if supertype.is_library()
            && supertype
                .method_by_signature(method.reference.name, &method.reference.proto)
                .is_some()
        {
            return true;
        }
        pending.extend(supertype.supertypes());
    }
    false
}

struct MethodScan<'a, 'r> {
    app: &'a AppView,
    joiner: &'a StateJoiner<'a>,
    code: &'a IrCode,
    definitions: FxHashMap<ValueId, &'a Op>,
    result: &'r mut ScanResult,
    escaping: &'r mut Vec<MethodRef>,
}

impl<'a, 'r> MethodScan<'a, 'r> {
    fn new(
        app: &'a AppView,
        joiner: &'a StateJoiner<'a>,
        code: &'a IrCode,
        result: &'r mut ScanResult,
        escaping: &'r mut Vec<MethodRef>,
    ) -> Self {
        let definitions = code
            .instructions()
            .filter_map(|(_, insn)| insn.dest.map(|dest| (dest, &insn.op)))
            .collect();
        MethodScan {
            app,
            joiner,
            code,
            definitions,
            result,
            escaping,
        }
    }

    fn run(&mut self) {
        for (_, insn) in self.code.instructions() {
            match &insn.op {
                Op::Invoke {
                    kind, method, args, ..
                } => self.scan_invoke(*kind, method, args),
                Op::InvokeCustom { call_site, .. } => self.scan_call_site(call_site),
                Op::ConstMethodHandle(handle) => self.scan_handle(handle),
                Op::StaticPut { field, value } | Op::InstancePut { field, value, .. } => {
                    self.scan_field_write(*field, *value);
                }
                _ => {}
            }
        }
    }

    fn scan_invoke(&mut self, kind: InvokeKind, method: &MethodRef, args: &[ValueId]) {
        if args.is_empty() || method.holder.is_array() {
            return;
        }
        let Some(target) = self.app.resolve_method(method) else {
            return;
        };
        if self
            .app
            .program_definition_for(target.reference.holder)
            .is_none()
        {
            return;
        }
        let argument_types = target.argument_types();
        if argument_types.len() != args.len() || target.is_static() != (kind == InvokeKind::Static)
        {
            return;
        }
        // Always throws.
        if !target.is_static() && matches!(self.op(args[0]), Some(Op::ConstNull)) {
            return;
        }

        let arguments: Vec<ValueState> = args
            .iter()
            .zip(&argument_types)
            .enumerate()
            .map(|(i, (&arg, &ty))| {
                let state = self.argument_state(arg, ty);
                if i == 0 && !target.is_static() {
                    state.into_receiver().widen(self.app, ty)
                } else {
                    state.widen(self.app, ty)
                }
            })
            .collect();

        let state = if target.is_virtual() && !overrides(self.app, target).is_empty() {
            let bound = self.receiver_bound(kind, method, target, &arguments[0]);
            MethodState::polymorphic(bound, MethodState::monomorphic(arguments))
        } else {
            MethodState::monomorphic(arguments)
        };
        tracing::trace!(target = %target.reference, "call site");
        self.result
            .methods
            .add_method_state(target.reference.clone(), state, self.joiner);
    }

    /// The classes a virtual call may dispatch on.
    fn receiver_bound(
        &self,
        kind: InvokeKind,
        method: &MethodRef,
        target: &ProgramMethod,
        receiver: &ValueState,
    ) -> DynamicType {
        let holder = target.reference.holder;
        if matches!(kind, InvokeKind::Direct | InvokeKind::Super) {
            return DynamicType::exact(holder);
        }
        let bound = receiver
            .as_concrete()
            .map(|state| state.dynamic_type())
            .filter(|dt| !dt.is_bottom() && !dt.is_unknown())
            .unwrap_or_else(|| DynamicType::bounded(method.holder, Nullability::DefinitelyNotNull))
            .with_nullability(Nullability::DefinitelyNotNull);
        bound.widen_receiver(holder)
    }

    fn scan_call_site(&mut self, call_site: &CallSite) {
        self.scan_handle(&call_site.bootstrap);
        for arg in &call_site.bootstrap_args {
            if let BootstrapArg::Handle(handle) = arg {
                self.scan_handle(handle);
            }
        }
    }

    /// A method reachable through a handle can be called with anything.
    fn scan_handle(&mut self, handle: &MethodHandle) {
        let HandleMember::Method(method) = &handle.member else {
            return;
        };
        let Some(target) = self.app.resolve_method(method) else {
            return;
        };
        if self
            .app
            .program_definition_for(target.reference.holder)
            .is_none()
        {
            return;
        }
        self.escaping.push(target.reference.clone());
        if target.is_virtual() {
            self.escaping.extend(
                overrides(self.app, target)
                    .into_iter()
                    .map(|m| m.reference.clone()),
            );
        }
    }

    fn scan_field_write(&mut self, field: FieldRef, value: ValueId) {
        if self.app.program_definition_for(field.holder).is_none()
            || self.app.program().field(&field).is_none()
        {
            return;
        }
        let state = self.argument_state(value, field.ty).widen(self.app, field.ty);
        self.result.fields.add_field_state(field, &state, self.joiner);
    }

    fn op(&self, value: ValueId) -> Option<&'a Op> {
        self.definitions.get(&value).copied()
    }

    fn parameter(&self, value: ValueId) -> Option<BaseInFlow> {
        match self.code.value(value).def {
            ValueDef::Argument(index) => Some(BaseInFlow::Parameter(MethodParameter::new(
                self.code.method.clone(),
                index,
            ))),
            _ => None,
        }
    }

    fn int_constant(&self, value: ValueId) -> Option<i64> {
        match self.op(value)? {
            Op::ConstInt(v) => Some(i64::from(*v)),
            Op::ConstLong(v) => Some(*v),
            _ => None,
        }
    }

    /// What is known about `value` flowing into a slot of `static_type`.
    fn argument_state(&self, value: ValueId, static_type: TypeRef) -> ValueState {
        if let Some(parameter) = self.parameter(value) {
            return ValueState::from_in_flow(static_type, parameter.into());
        }
        let Some(op) = self.op(value) else {
            return ValueState::Unknown;
        };
        let function = |function| ValueState::from_in_flow(static_type, InFlow::Function(function));
        match op {
            Op::ConstInt(_) | Op::ConstLong(_) if static_type.is_primitive() => self
                .int_constant(value)
                .map_or(ValueState::Unknown, |v| {
                    ValueState::primitive(AbstractValue::Single(v))
                }),
            Op::ConstNull if static_type.is_array() => {
                ValueState::array(Nullability::DefinitelyNull)
            }
            Op::ConstNull if static_type.is_reference() => ValueState::class(
                AbstractValue::Null,
                DynamicType::bounded(static_type, Nullability::DefinitelyNull),
            ),
            Op::ConstString(s) => ValueState::class(
                AbstractValue::String(*s),
                DynamicType::exact(known::string()),
            ),
            Op::NewInstance(ty) => ValueState::class(AbstractValue::Unknown, DynamicType::exact(*ty)),
            Op::NewArray { .. } => ValueState::array(Nullability::DefinitelyNotNull),
            Op::CheckCast { value, ty } => match self.parameter(*value) {
                Some(base) => function(AbstractFunction::Cast { base, ty: *ty }),
                None => ValueState::Unknown,
            },
            Op::Binop {
                op: BinopKind::Or,
                lhs,
                rhs,
                ..
            } => {
                let operands = [(*lhs, *rhs), (*rhs, *lhs)];
                operands
                    .into_iter()
                    .find_map(|(arg, constant)| {
                        Some(AbstractFunction::Or {
                            base: self.parameter(arg)?,
                            constant: self.int_constant(constant)?,
                        })
                    })
                    .map_or(ValueState::Unknown, function)
            }
            Op::InstanceGet { field, object } if self.app.program().field(field).is_some() => {
                match self.parameter(*object) {
                    Some(receiver) => function(AbstractFunction::InstanceFieldRead {
                        receiver,
                        field: *field,
                    }),
                    None => ValueState::Unknown,
                }
            }
            Op::StaticGet(field)
                if self.app.program_definition_for(field.holder).is_some()
                    && self.app.program().field(field).is_some() =>
            {
                ValueState::from_in_flow(static_type, InFlow::Field(*field))
            }
            _ => ValueState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests;
