//! Rewriting bodies that handle unboxed enum values.
//!
//! Runs on a body written against the names from before unboxing, ahead of
//! the lens code rewriter. It replaces every operation that needs the enum
//! as an object by its `int` counterpart; the retyping of values, fields
//! and methods is left to the lens.

use std::collections::BTreeMap;
use std::sync::Arc;

use pare_ir::ir::{
    BlockId, IfType, Instruction, InvokeKind, IrCode, Op, Position, Terminator, ValueDef, ValueId,
};
use pare_ir::lir::{LirCode, LirConstant};
use pare_ir::{known, HandleMember, MethodRef, ProgramClass, TypeRef};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::enum_data::{unboxed_value, EnumDataMap};
use crate::members::{is_require_non_null, is_values_method, EnumMethod, ReceiverCall};
use crate::utility::{LocalUtility, SharedUtility};

/// What the rewriter needs to know about the enums of one unboxing run.
pub(crate) struct UnboxedEnums {
    /// Definitions from before unboxing.
    pub(crate) classes: BTreeMap<TypeRef, Arc<ProgramClass>>,
    pub(crate) shared: SharedUtility,
    pub(crate) locals: BTreeMap<TypeRef, LocalUtility>,
}

impl UnboxedEnums {
    /// `ty` with an unboxed enum base type replaced by `int`.
    pub(crate) fn map_type(&self, ty: TypeRef) -> TypeRef {
        ty.map_base(|base| if self.is_unboxed(base) { known::int() } else { base })
    }

    fn is_unboxed(&self, ty: TypeRef) -> bool {
        self.classes.contains_key(&ty)
    }

    /// Whether `ty` mentions an unboxed enum, directly or as an array.
    fn mentions(&self, ty: TypeRef) -> bool {
        self.is_unboxed(ty.base_type())
    }

    /// Whether a body in `lir` refers to any unboxed enum.
    pub(crate) fn mentioned_by(&self, lir: &LirCode) -> bool {
        lir.constants().iter().any(|constant| match constant {
            LirConstant::Type(ty) => self.mentions(*ty),
            LirConstant::Field(field) => self.mentions(field.holder) || self.mentions(field.ty),
            LirConstant::Method(method) => self.method_mentions(method),
            LirConstant::Proto(proto) => proto.types().any(|ty| self.mentions(ty)),
            LirConstant::MethodHandle(handle) => match &handle.member {
                HandleMember::Field(field) => {
                    self.mentions(field.holder) || self.mentions(field.ty)
                }
                HandleMember::Method(method) => self.method_mentions(method),
            },
            LirConstant::CallSite(call_site) => call_site.proto.types().any(|ty| self.mentions(ty)),
            LirConstant::String(_) => false,
        })
    }

    pub(crate) fn method_mentions(&self, method: &MethodRef) -> bool {
        self.mentions(method.holder) || method.proto.types().any(|ty| self.mentions(ty))
    }
}

pub(crate) struct EnumCodeRewriter<'a> {
    enums: &'a UnboxedEnums,
    data: &'a EnumDataMap,
}

/// Per-body state.
struct BodyRewrite {
    /// Values known to be a given constant, by ordinal.
    constants: FxHashMap<ValueId, i32>,
    nulls: FxHashSet<ValueId>,
    /// `0`, standing for `null` in enum contexts; created on first use.
    zero: Option<ValueId>,
}

impl BodyRewrite {
    fn zero(&mut self, code: &mut IrCode) -> ValueId {
        *self
            .zero
            .get_or_insert_with(|| code.new_value(known::int(), ValueDef::Instruction))
    }

    /// `value`, or `0` if it is `null` and flows into an enum context.
    fn unboxed(&mut self, code: &mut IrCode, value: ValueId, into_enum: bool) -> ValueId {
        if into_enum && self.nulls.contains(&value) {
            self.zero(code)
        } else {
            value
        }
    }
}

impl<'a> EnumCodeRewriter<'a> {
    pub(crate) fn new(enums: &'a UnboxedEnums, data: &'a EnumDataMap) -> Self {
        EnumCodeRewriter { enums, data }
    }

    fn enum_type(&self, code: &IrCode, value: ValueId) -> Option<TypeRef> {
        let ty = code.value_type(value);
        self.enums.is_unboxed(ty).then_some(ty)
    }

    /// Rewrite `code`, a body written against the names from before
    /// unboxing.
    pub(crate) fn rewrite(&self, code: &mut IrCode) {
        self.remove_enum_casts(code);
        let mut state = BodyRewrite {
            constants: FxHashMap::default(),
            nulls: FxHashSet::default(),
            zero: None,
        };
        for (_, insn) in code.instructions() {
            let Some(dest) = insn.dest else { continue };
            match &insn.op {
                Op::ConstNull => {
                    state.nulls.insert(dest);
                }
                Op::NewUnboxedEnumInstance { ordinal, .. } => {
                    state.constants.insert(dest, *ordinal);
                }
                Op::StaticGet(field) => {
                    if let Some(constant) = self.data.constant_for_field(field) {
                        state.constants.insert(dest, constant.ordinal);
                    }
                }
                _ => {}
            }
        }

        let return_is_enum = self.enums.is_unboxed(code.method.proto.return_type);
        for index in 0..code.blocks.len() {
            let phis = std::mem::take(&mut code.blocks[index].phis);
            let mut rewritten_phis = Vec::with_capacity(phis.len());
            for mut phi in phis {
                let into_enum = self.enums.is_unboxed(code.value_type(phi.dest));
                for operand in &mut phi.operands {
                    *operand = state.unboxed(code, *operand, into_enum);
                }
                rewritten_phis.push(phi);
            }
            code.blocks[index].phis = rewritten_phis;

            let body = std::mem::take(&mut code.blocks[index].body);
            let mut out = Vec::with_capacity(body.len());
            for insn in body {
                self.rewrite_instruction(code, &mut state, insn, &mut out);
            }
            code.blocks[index].body = out;

            let mut terminator = code.blocks[index].terminator.clone();
            self.rewrite_terminator(code, &mut state, &mut terminator, return_is_enum);
            code.blocks[index].terminator = terminator;
        }

        if let Some(zero) = state.zero {
            if let Some(entry) = code.blocks.get_mut(BlockId::ENTRY.index()) {
                entry
                    .body
                    .insert(0, Instruction::new(Some(zero), Op::ConstInt(0), Position::NONE));
            }
        }
        code.remove_dead_instructions();
    }

    /// Casts to an unboxed enum only ever see enum values or `null`; their
    /// results become aliases of their inputs.
    fn remove_enum_casts(&self, code: &mut IrCode) {
        let mut aliases: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        for block in &mut code.blocks {
            block.body.retain(|insn| match (&insn.op, insn.dest) {
                (Op::CheckCast { value, ty }, Some(dest)) if self.enums.is_unboxed(*ty) => {
                    aliases.insert(dest, *value);
                    false
                }
                _ => true,
            });
        }
        let resolve = |mut value: ValueId| {
            while let Some(&next) = aliases.get(&value) {
                value = next;
            }
            value
        };
        let mut casts: Vec<ValueId> = aliases.keys().copied().collect();
        casts.sort_unstable();
        for cast in casts {
            code.replace_uses(cast, resolve(cast));
        }
    }

    fn rewrite_instruction(
        &self,
        code: &mut IrCode,
        state: &mut BodyRewrite,
        insn: Instruction,
        out: &mut Vec<Instruction>,
    ) {
        let Instruction {
            dest,
            op,
            position,
        } = insn;
        let op = match op {
            Op::NewUnboxedEnumInstance { ordinal, .. } => Op::ConstInt(unboxed_value(ordinal)),
            Op::StaticGet(field) => match self.data.constant_for_field(&field) {
                Some(constant) => Op::ConstInt(constant.unboxed_value()),
                None => Op::StaticGet(field),
            },
            Op::StaticPut { field, value } => Op::StaticPut {
                field,
                value: state.unboxed(code, value, self.enums.is_unboxed(field.ty)),
            },
            Op::InstancePut {
                field,
                object,
                value,
            } => Op::InstancePut {
                field,
                object,
                value: state.unboxed(code, value, self.enums.is_unboxed(field.ty)),
            },
            Op::InstanceGet { field, object } if self.enums.is_unboxed(field.holder) => {
                match self.enums.locals.get(&field.holder) {
                    Some(local) => Op::Invoke {
                        kind: InvokeKind::Static,
                        method: local.getter(field, self.enums.map_type(field.ty)),
                        args: vec![object],
                        is_interface: false,
                    },
                    None => Op::InstanceGet { field, object },
                }
            }
            Op::ArrayPut {
                array,
                index,
                value,
            } => {
                let into_enum = code
                    .value_type(array)
                    .element_type()
                    .is_some_and(|ty| self.enums.is_unboxed(ty));
                Op::ArrayPut {
                    array,
                    index,
                    value: state.unboxed(code, value, into_enum),
                }
            }
            Op::Invoke {
                kind,
                method,
                args,
                is_interface,
            } => {
                let op = self.rewrite_invoke(code, state, kind, method, args, is_interface, out);
                if let Op::Invoke { method, .. } = &op {
                    if method.proto.return_type.is_void() {
                        out.push(Instruction::new(None, op, position));
                        return;
                    }
                }
                op
            }
            op => op,
        };
        out.push(Instruction::new(dest, op, position));
    }

    /// The replacement of one call. Constants it needs are pushed to `out`.
    #[expect(
        clippy::too_many_arguments,
        reason = "mirrors the fields of Op::Invoke"
    )]
    fn rewrite_invoke(
        &self,
        code: &mut IrCode,
        state: &mut BodyRewrite,
        kind: InvokeKind,
        method: MethodRef,
        mut args: Vec<ValueId>,
        is_interface: bool,
        out: &mut Vec<Instruction>,
    ) -> Op {
        let shared = &self.enums.shared;
        let static_call = |method: MethodRef, args: Vec<ValueId>| Op::Invoke {
            kind: InvokeKind::Static,
            method,
            args,
            is_interface: false,
        };

        if kind == InvokeKind::Static {
            if let Some(data) = self.data.get(method.holder) {
                if is_values_method(&method, method.holder) {
                    let size = code.new_value(known::int(), ValueDef::Instruction);
                    let count = i32::try_from(data.values_size()).unwrap_or(i32::MAX);
                    out.push(Instruction::new(Some(size), Op::ConstInt(count), Position::NONE));
                    return static_call(shared.values(), vec![size]);
                }
            }
            if is_require_non_null(&method) {
                if let Some(&value) = args.first() {
                    if self.enum_type(code, value).is_some() {
                        let check = if args.len() == 2 {
                            shared.check_not_zero_with_message()
                        } else {
                            shared.check_not_zero()
                        };
                        return static_call(check, args);
                    }
                }
            }
        }

        let receiver_enum = match (kind, args.first()) {
            (InvokeKind::Static, _) | (_, None) => None,
            (_, Some(&receiver)) => self.enum_type(code, receiver),
        };
        if let Some(enum_type) = receiver_enum {
            let class = self.enums.classes.get(&enum_type).map(|c| &**c);
            match ReceiverCall::classify(class, kind, &method) {
                ReceiverCall::Declared => {
                    return Op::Invoke {
                        kind: InvokeKind::Virtual,
                        method: method.with_holder(enum_type),
                        args: self.unbox_arguments(code, state, &method, args, false),
                        is_interface: false,
                    };
                }
                ReceiverCall::Supported(enum_method) => {
                    return self.rewrite_enum_method(code, state, enum_type, enum_method, args);
                }
                ReceiverCall::Invalid => {}
            }
        }

        args = self.unbox_arguments(code, state, &method, args, kind == InvokeKind::Static);
        Op::Invoke {
            kind,
            method,
            args,
            is_interface,
        }
    }

    fn rewrite_enum_method(
        &self,
        code: &mut IrCode,
        state: &mut BodyRewrite,
        enum_type: TypeRef,
        enum_method: EnumMethod,
        mut args: Vec<ValueId>,
    ) -> Op {
        let shared = &self.enums.shared;
        let receiver = args[0];
        let method = match enum_method {
            EnumMethod::Ordinal | EnumMethod::HashCode => {
                if let Some(&ordinal) = state.constants.get(&receiver) {
                    return Op::ConstInt(ordinal);
                }
                shared.ordinal()
            }
            EnumMethod::CompareTo => shared.compare_to(),
            EnumMethod::Equals => shared.equals(),
            EnumMethod::Name | EnumMethod::ToString => self
                .enums
                .locals
                .get(&enum_type)
                .map_or_else(
                    || unreachable!("every unboxed enum has a local utility class"),
                    LocalUtility::name_method,
                ),
        };
        if enum_method.is_binary() {
            if let Some(other) = args.get_mut(1) {
                *other = state.unboxed(code, *other, true);
            }
        }
        Op::Invoke {
            kind: InvokeKind::Static,
            method,
            args,
            is_interface: false,
        }
    }

    /// `args` with `null` replaced by `0` where the callee expects an enum.
    fn unbox_arguments(
        &self,
        code: &mut IrCode,
        state: &mut BodyRewrite,
        method: &MethodRef,
        args: Vec<ValueId>,
        is_static: bool,
    ) -> Vec<ValueId> {
        let types = method.argument_types(is_static);
        args.into_iter()
            .zip(types.iter().map(Some).chain(std::iter::repeat(None)))
            .map(|(arg, ty)| {
                let into_enum = ty.is_some_and(|&ty| self.enums.is_unboxed(ty));
                state.unboxed(code, arg, into_enum)
            })
            .collect()
    }

    fn rewrite_terminator(
        &self,
        code: &mut IrCode,
        state: &mut BodyRewrite,
        terminator: &mut Terminator,
        return_is_enum: bool,
    ) {
        match terminator {
            Terminator::Return(Some(value)) => {
                *value = state.unboxed(code, *value, return_is_enum);
            }
            Terminator::If { ty, lhs, rhs, .. } if *ty == IfType::Object => {
                let compares_enum = self.enum_type(code, *lhs).is_some()
                    || rhs.is_some_and(|rhs| self.enum_type(code, rhs).is_some());
                if compares_enum {
                    *ty = IfType::Int;
                    *lhs = state.unboxed(code, *lhs, true);
                    if let Some(rhs) = rhs {
                        *rhs = state.unboxed(code, *rhs, true);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
