//! Use-site analysis: every place an enum value flows must survive the
//! value becoming an `int`.
//!
//! Each program method is scanned independently; the per-class results are
//! merged in type order so the collected reasons are deterministic.

use std::collections::BTreeSet;

use pare_app::AppView;
use pare_ir::ir::{IfType, InvokeKind, IrCode, Op, Terminator, ValueId};
use pare_ir::{
    known, BootstrapArg, FieldRef, HandleMember, MethodHandle, MethodRef, ProgramClass,
    ProgramMethod, TypeRef,
};
use rayon::prelude::*;

use crate::code::{decode, Definitions};
use crate::error::EnumError;
use crate::members::{
    is_constant_field, is_replaced_method, is_require_non_null, is_values_field, ReceiverCall,
};
use crate::report::{Reason, Reasons};

/// What the scan learned beyond the rejections.
#[derive(Debug, Default)]
pub(crate) struct UseSites {
    /// Instance fields read through an enum value.
    pub(crate) read_instance_fields: BTreeSet<FieldRef>,
}

/// Scan every program method for uses of the `tracked` enums.
pub(crate) fn analyze_use_sites(
    app: &AppView,
    tracked: &BTreeSet<TypeRef>,
    early_exit: bool,
    reasons: &mut Reasons,
) -> Result<UseSites, EnumError> {
    if tracked.is_empty() {
        return Ok(UseSites::default());
    }
    let classes: Vec<&ProgramClass> = app.program().program_classes().map(|c| &**c).collect();
    let scanned = classes
        .par_iter()
        .map(|class| {
            let mut local = Reasons::new(early_exit);
            let mut fields = BTreeSet::new();
            for method in &class.methods {
                if tracked.contains(&class.ty) && is_replaced_method(method, class.ty) {
                    continue;
                }
                let Some(code) = decode(method)? else {
                    continue;
                };
                MethodScan::new(app, tracked, method, &code, &mut local, &mut fields).run();
            }
            Ok((local, fields))
        })
        .collect::<Result<Vec<_>, EnumError>>()?;

    let mut sites = UseSites::default();
    for (local, fields) in scanned {
        reasons.extend(local);
        sites.read_instance_fields.extend(fields);
    }
    tracing::debug!(
        tracked = tracked.len(),
        read_fields = sites.read_instance_fields.len(),
        "scanned enum use sites"
    );
    Ok(sites)
}

struct MethodScan<'a> {
    app: &'a AppView,
    tracked: &'a BTreeSet<TypeRef>,
    method: &'a ProgramMethod,
    code: &'a IrCode,
    defs: Definitions<'a>,
    use_counts: Vec<u32>,
    reasons: &'a mut Reasons,
    read_fields: &'a mut BTreeSet<FieldRef>,
}

impl<'a> MethodScan<'a> {
    fn new(
        app: &'a AppView,
        tracked: &'a BTreeSet<TypeRef>,
        method: &'a ProgramMethod,
        code: &'a IrCode,
        reasons: &'a mut Reasons,
        read_fields: &'a mut BTreeSet<FieldRef>,
    ) -> Self {
        MethodScan {
            app,
            tracked,
            method,
            code,
            defs: Definitions::new(code),
            use_counts: code.use_counts(),
            reasons,
            read_fields,
        }
    }

    fn context(&self) -> MethodRef {
        self.method.reference.clone()
    }

    fn reject(&mut self, ty: TypeRef, reason: Reason) {
        self.reasons.add(ty, reason);
    }

    /// The tracked enum `ty` is, or is an array of.
    fn enum_of(&self, ty: TypeRef) -> Option<TypeRef> {
        let base = ty.base_type();
        self.tracked.contains(&base).then_some(base)
    }

    fn value_enum(&self, value: ValueId) -> Option<TypeRef> {
        self.enum_of(self.code.value_type(value))
    }

    /// Whether this is the class initializer of `enum_type`.
    fn is_class_initializer_of(&self, enum_type: TypeRef) -> bool {
        self.method.is_class_initializer() && self.method.reference.holder == enum_type
    }

    fn reject_mentions(&mut self, types: impl IntoIterator<Item = TypeRef>) {
        let context = self.context();
        let mentioned: BTreeSet<TypeRef> =
            types.into_iter().filter_map(|ty| self.enum_of(ty)).collect();
        for ty in mentioned {
            self.reject(ty, Reason::EscapesToNonEnumContext(context.clone()));
        }
    }

    /// `value` flows into a location of type `expected`.
    fn check_flow(&mut self, value: ValueId, expected: TypeRef) {
        let actual = self.code.value_type(value);
        if actual == expected {
            return;
        }
        let context = self.context();
        if let Some(ty) = self.enum_of(actual) {
            self.reject(ty, Reason::EscapesToNonEnumContext(context.clone()));
        }
        if let Some(ty) = self.enum_of(expected) {
            if !self.defs.is_null(value) {
                self.reject(ty, Reason::EscapesToNonEnumContext(context));
            }
        }
    }

    fn run(&mut self) {
        let code = self.code;
        for block in &code.blocks {
            for phi in &block.phis {
                let ty = code.value_type(phi.dest);
                for &operand in &phi.operands {
                    self.check_flow(operand, ty);
                }
            }
            for insn in &block.body {
                self.check_op(&insn.op, insn.dest);
            }
            self.check_terminator(&block.terminator);
        }
    }

    fn check_terminator(&mut self, terminator: &Terminator) {
        match *terminator {
            Terminator::Return(Some(value)) => {
                let return_type = self.code.method.proto.return_type;
                self.check_flow(value, return_type);
            }
            Terminator::If {
                ty: IfType::Object,
                lhs,
                rhs: Some(rhs),
                ..
            } => {
                let (l, r) = (self.code.value_type(lhs), self.code.value_type(rhs));
                if self.value_enum(lhs).is_some() && !self.defs.is_null(rhs) {
                    self.check_flow(rhs, l);
                } else if self.value_enum(rhs).is_some() && !self.defs.is_null(lhs) {
                    self.check_flow(lhs, r);
                }
            }
            Terminator::If { .. }
            | Terminator::Goto(_)
            | Terminator::Return(None)
            | Terminator::Throw(_) => {}
        }
    }

    fn check_op(&mut self, op: &Op, dest: Option<ValueId>) {
        let context = self.context();
        match op {
            Op::ConstClass(ty) => {
                if let Some(e) = self.enum_of(*ty) {
                    self.reject(e, Reason::InvalidConstClass);
                }
            }
            Op::ConstMethodHandle(handle) => self.reject_mentions(handle_types(handle)),
            Op::ConstMethodType(proto) => self.reject_mentions(proto.types()),
            Op::NewInstance(ty) => {
                if self.tracked.contains(ty) && !self.is_class_initializer_of(*ty) {
                    self.reject(*ty, Reason::UnexpectedNewInstance(context));
                }
            }
            Op::ArrayPut { array, value, .. } => {
                let element = self
                    .code
                    .value_type(*array)
                    .element_type()
                    .unwrap_or_else(known::object);
                let actual = self.code.value_type(*value);
                if actual != element {
                    if let Some(e) = self.enum_of(actual) {
                        self.reject(e, Reason::InvalidArrayStore);
                    }
                    if let Some(e) = self.enum_of(element) {
                        if !self.defs.is_null(*value) {
                            self.reject(e, Reason::InvalidArrayStore);
                        }
                    }
                }
            }
            Op::StaticGet(field) => self.check_static_field(*field, false),
            Op::StaticPut { field, value } => {
                self.check_flow(*value, field.ty);
                self.check_static_field(*field, true);
            }
            Op::InstanceGet { field, object } => {
                if let Some(e) = self.value_enum(*object).or_else(|| self.enum_of(field.holder)) {
                    let declared = self
                        .app
                        .definition_for(e)
                        .and_then(|c| c.field(field))
                        .is_some_and(|f| !f.is_static());
                    if field.holder == e && declared {
                        self.read_fields.insert(*field);
                    } else {
                        self.reject(e, Reason::InvalidFieldAccess(*field));
                    }
                }
            }
            Op::InstancePut {
                field,
                object,
                value,
            } => {
                self.check_flow(*value, field.ty);
                if let Some(e) = self.value_enum(*object).or_else(|| self.enum_of(field.holder)) {
                    self.reject(e, Reason::InvalidFieldAccess(*field));
                }
            }
            Op::Invoke {
                kind, method, args, ..
            } => self.check_invoke(*kind, method, args, dest),
            Op::InvokeCustom { call_site, args } => {
                let mut types: Vec<TypeRef> = call_site.proto.types().collect();
                types.extend(args.iter().map(|&a| self.code.value_type(a)));
                for arg in &call_site.bootstrap_args {
                    match arg {
                        BootstrapArg::Type(ty) => types.push(*ty),
                        BootstrapArg::Proto(proto) => types.extend(proto.types()),
                        BootstrapArg::Handle(handle) => types.extend(handle_types(handle)),
                        BootstrapArg::Int(_) | BootstrapArg::String(_) => {}
                    }
                }
                self.reject_mentions(types);
            }
            Op::CheckCast { value, ty } => self.check_flow(*value, *ty),
            Op::InstanceOf { value, ty } => {
                for e in [self.enum_of(*ty), self.value_enum(*value)].into_iter().flatten() {
                    self.reject(e, Reason::InvalidInstanceOf);
                }
            }
            Op::ConstNull
            | Op::ConstInt(_)
            | Op::ConstLong(_)
            | Op::ConstString(_)
            | Op::NewArray { .. }
            | Op::NewUnboxedEnumInstance { .. }
            | Op::ArrayGet { .. }
            | Op::ArrayLength(_)
            | Op::Binop { .. }
            | Op::DebugPosition => {}
        }
    }

    fn check_static_field(&mut self, field: FieldRef, is_write: bool) {
        let Some(e) = self.enum_of(field.holder).filter(|&e| e == field.holder) else {
            return;
        };
        let definition = self.app.definition_for(e).and_then(|c| c.field(&field));
        let Some(definition) = definition else {
            self.reject(e, Reason::InvalidFieldAccess(field));
            return;
        };
        let is_enum_state = is_constant_field(definition, e) || is_values_field(definition, e);
        if !is_enum_state {
            if !is_write {
                self.reject(e, Reason::UnexpectedStaticField(field));
            }
        } else if is_write && !self.is_class_initializer_of(e) {
            self.reject(e, Reason::InvalidFieldAccess(field));
        }
    }

    fn check_invoke(
        &mut self,
        kind: InvokeKind,
        method: &MethodRef,
        args: &[ValueId],
        dest: Option<ValueId>,
    ) {
        let context = self.context();
        let receiver_offset = usize::from(kind != InvokeKind::Static);
        let receiver_enum = if receiver_offset == 1 {
            args.first().and_then(|&r| self.value_enum(r))
        } else {
            None
        };

        // Calls on an enum value.
        let mut binary_enum_method = false;
        if let Some(e) = receiver_enum {
            let app = self.app;
            let class = app.definition_for(e).map(|c| &**c);
            match ReceiverCall::classify(class, kind, method) {
                ReceiverCall::Declared => {
                    if method.is_instance_initializer() && !self.is_class_initializer_of(e) {
                        self.reject(e, Reason::InvalidInvoke(method.clone()));
                    }
                }
                ReceiverCall::Supported(enum_method) => {
                    binary_enum_method = enum_method.is_binary();
                }
                ReceiverCall::Invalid => self.reject(e, Reason::InvalidInvoke(method.clone())),
            }
        } else if let Some(e) = self.enum_of(method.holder).filter(|&e| e == method.holder) {
            // Static calls into the enum must target its own methods.
            let declared = self
                .app
                .definition_for(e)
                .and_then(|c| c.method(method))
                .is_some();
            if !declared {
                self.reject(e, Reason::InvalidInvoke(method.clone()));
            }
        }

        if is_require_non_null(method) {
            if let Some(&value) = args.first() {
                if let Some(e) = self.value_enum(value) {
                    let result_used = dest.is_some_and(|d| self.use_counts[d.index()] > 0);
                    if result_used {
                        self.reject(e, Reason::EscapesToNonEnumContext(context));
                    }
                }
            }
            return;
        }

        for (i, &arg) in args.iter().enumerate().skip(receiver_offset) {
            let Some(&param) = method.proto.params.get(i - receiver_offset) else {
                continue;
            };
            if binary_enum_method {
                // `compareTo` and `equals` take a second value of the same enum.
                if let Some(receiver) = receiver_enum {
                    let actual = self.code.value_type(arg);
                    if actual == receiver || self.defs.is_null(arg) {
                        continue;
                    }
                    // The unboxed helper takes two ordinals.
                    self.reject(receiver, Reason::InvalidInvoke(method.clone()));
                }
            }
            self.check_flow(arg, param);
        }
    }
}

fn handle_types(handle: &MethodHandle) -> Vec<TypeRef> {
    match &handle.member {
        HandleMember::Field(field) => vec![field.holder, field.ty],
        HandleMember::Method(method) => {
            let mut types = vec![method.holder];
            types.extend(method.proto.types());
            types
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
