//! Rewriting SSA bodies to the current lens.
//!
//! A body is written against its code lens: every type, field and method it
//! mentions is a name that was current when the code lens was. Rewriting
//! looks every reference up in the layers above it and patches the body so
//! it is well formed under the current names:
//!
//! - the method's own arguments follow its definition's prototype changes
//!   (removed arguments become constants, extra parameters are appended);
//! - reads of widened fields are followed by a cast back to the type the
//!   code expects;
//! - invokes take the new target and invoke kind, drop removed arguments and
//!   pass extra ones;
//! - catch guards that became equal within one block are pruned, together
//!   with any handler block that is no longer reachable.

use std::sync::Arc;

use pare_ir::ir::{Block, Instruction, InvokeKind, IrCode, Op, Position, ValueDef, ValueId};
use pare_ir::{
    known, BootstrapArg, CallSite, HandleMember, MethodHandle, MethodHandleKind, MethodRef,
    TypeRef,
};
use pare_lens::{ArgumentChange, ExtraParameter, FieldLookupResult, GraphLens};

use crate::AppView;

pub struct LensCodeRewriter<'a> {
    pub(crate) lens: &'a GraphLens,
    pub(crate) code_lens: &'a GraphLens,
}

impl<'a> LensCodeRewriter<'a> {
    pub fn new(lens: &'a GraphLens, code_lens: &'a GraphLens) -> Self {
        LensCodeRewriter { lens, code_lens }
    }

    pub fn for_app(app: &'a AppView) -> Self {
        Self::new(app.lens(), app.code_lens())
    }

    /// Rewrite `code` into the body of `method`, the method's current name.
    pub fn rewrite(&self, mut code: IrCode, method: &MethodRef, is_static: bool) -> IrCode {
        for value in &mut code.values {
            value.ty = self.lookup_type(value.ty);
        }
        self.rewrite_arguments(&mut code, method);

        let blocks = std::mem::take(&mut code.blocks);
        for mut block in blocks {
            self.rewrite_block(&mut code, &mut block, method);
            code.blocks.push(block);
        }
        prune_duplicate_catch_handlers(&mut code);

        code.method = method.clone();
        code.is_static = is_static;
        code
    }

    // ── References ──────────────────────────────────────────────

    pub(crate) fn lookup_type(&self, ty: TypeRef) -> TypeRef {
        self.lens.lookup_type(ty, self.code_lens)
    }

    pub(crate) fn lookup_field(&self, field: pare_ir::FieldRef) -> FieldLookupResult {
        self.lens.lookup_field(field, self.code_lens)
    }

    pub(crate) fn lookup_proto(&self, proto: &pare_ir::Proto) -> pare_ir::Proto {
        self.lens.lookup_proto(proto, self.code_lens)
    }

    pub(crate) fn rewrite_method_handle(
        &self,
        handle: &MethodHandle,
        context: &MethodRef,
    ) -> MethodHandle {
        match &handle.member {
            HandleMember::Field(field) => MethodHandle {
                member: HandleMember::Field(self.lookup_field(*field).reference),
                ..handle.clone()
            },
            HandleMember::Method(method) => {
                let kind = handle_invoke_kind(handle.kind);
                let result = self
                    .lens
                    .lookup_method(method, Some(context), kind, self.code_lens);
                let new_kind = match (handle.kind, result.invoke_kind) {
                    (MethodHandleKind::InvokeConstructor, _) => MethodHandleKind::InvokeConstructor,
                    (_, InvokeKind::Static) => MethodHandleKind::InvokeStatic,
                    (_, InvokeKind::Virtual) => MethodHandleKind::InvokeVirtual,
                    (_, InvokeKind::Interface) => MethodHandleKind::InvokeInterface,
                    (_, InvokeKind::Direct | InvokeKind::Super) => MethodHandleKind::InvokeDirect,
                };
                let is_interface = if new_kind == handle.kind {
                    handle.is_interface
                } else {
                    new_kind == MethodHandleKind::InvokeInterface
                };
                MethodHandle {
                    kind: new_kind,
                    member: HandleMember::Method(result.reference),
                    is_interface,
                }
            }
        }
    }

    pub(crate) fn rewrite_call_site(
        &self,
        call_site: &Arc<CallSite>,
        context: &MethodRef,
    ) -> Arc<CallSite> {
        let rewritten = CallSite {
            method_name: call_site.method_name,
            proto: self.lookup_proto(&call_site.proto),
            bootstrap: self.rewrite_method_handle(&call_site.bootstrap, context),
            bootstrap_args: call_site
                .bootstrap_args
                .iter()
                .map(|arg| match arg {
                    BootstrapArg::Type(ty) => BootstrapArg::Type(self.lookup_type(*ty)),
                    BootstrapArg::Proto(proto) => BootstrapArg::Proto(self.lookup_proto(proto)),
                    BootstrapArg::Handle(handle) => {
                        BootstrapArg::Handle(self.rewrite_method_handle(handle, context))
                    }
                    BootstrapArg::Int(_) | BootstrapArg::String(_) => arg.clone(),
                })
                .collect(),
        };
        if rewritten == **call_site {
            Arc::clone(call_site)
        } else {
            Arc::new(rewritten)
        }
    }

    // ── Arguments ───────────────────────────────────────────────

    fn rewrite_arguments(&self, code: &mut IrCode, method: &MethodRef) {
        let changes = self
            .lens
            .lookup_prototype_changes_for_method_definition(method, self.code_lens);
        if changes.is_empty() {
            return;
        }
        let old_arguments = std::mem::take(&mut code.arguments);
        let mut materialized = Vec::new();
        for (i, value) in (0u32..).zip(old_arguments) {
            match changes.argument(i) {
                Some(ArgumentChange::Removed { ty, constant }) => {
                    code.values[value.index()].def = ValueDef::Instruction;
                    materialized.push(Instruction::new(
                        Some(value),
                        removed_argument_value(ty, constant),
                        Position::NONE,
                    ));
                }
                Some(ArgumentChange::Rewritten { to, .. }) => {
                    code.values[value.index()].ty = to;
                    code.arguments.push(value);
                }
                None => code.arguments.push(value),
            }
        }
        for extra in changes.extra_parameters() {
            let value = code.new_value(extra.ty(), ValueDef::Argument(0));
            code.arguments.push(value);
        }
        for (index, value) in (0u32..).zip(&code.arguments) {
            code.values[value.index()].def = ValueDef::Argument(index);
        }
        if let Some(entry) = code.blocks.first_mut() {
            entry.body.splice(0..0, materialized);
        }
    }

    // ── Instructions ────────────────────────────────────────────

    fn rewrite_block(&self, code: &mut IrCode, block: &mut Block, context: &MethodRef) {
        let body = std::mem::take(&mut block.body);
        let mut out = Vec::with_capacity(body.len());
        for insn in body {
            self.rewrite_instruction(code, insn, context, &mut out);
        }
        block.body = out;
        for handler in &mut block.catch_handlers {
            handler.guard = self.lookup_type(handler.guard);
        }
    }

    fn rewrite_instruction(
        &self,
        code: &mut IrCode,
        insn: Instruction,
        context: &MethodRef,
        out: &mut Vec<Instruction>,
    ) {
        let Instruction {
            dest,
            op,
            position,
        } = insn;
        let op = match op {
            Op::ConstClass(ty) => Op::ConstClass(self.lookup_type(ty)),
            Op::ConstMethodHandle(handle) => {
                Op::ConstMethodHandle(self.rewrite_method_handle(&handle, context))
            }
            Op::ConstMethodType(proto) => Op::ConstMethodType(self.lookup_proto(&proto)),
            Op::NewInstance(ty) => Op::NewInstance(self.lookup_type(ty)),
            Op::NewArray { ty, size } => Op::NewArray {
                ty: self.lookup_type(ty),
                size,
            },
            Op::ArrayGet { ty, array, index } => Op::ArrayGet {
                ty: self.lookup_type(ty),
                array,
                index,
            },
            Op::CheckCast { value, ty } => Op::CheckCast {
                value,
                ty: self.lookup_type(ty),
            },
            Op::InstanceOf { value, ty } => Op::InstanceOf {
                value,
                ty: self.lookup_type(ty),
            },
            Op::StaticGet(field) => {
                let result = self.lookup_field(field);
                push_field_read(code, out, dest, Op::StaticGet(result.reference), result, position);
                return;
            }
            Op::InstanceGet { field, object } => {
                let result = self.lookup_field(field);
                let op = Op::InstanceGet {
                    field: result.reference,
                    object,
                };
                push_field_read(code, out, dest, op, result, position);
                return;
            }
            Op::StaticPut { field, value } => Op::StaticPut {
                field: self.lookup_field(field).reference,
                value,
            },
            Op::InstancePut {
                field,
                object,
                value,
            } => Op::InstancePut {
                field: self.lookup_field(field).reference,
                object,
                value,
            },
            Op::Invoke {
                kind,
                method,
                args,
                is_interface,
            } => {
                self.rewrite_invoke(code, out, dest, (kind, method, args, is_interface), context, position);
                return;
            }
            Op::InvokeCustom { call_site, args } => Op::InvokeCustom {
                call_site: self.rewrite_call_site(&call_site, context),
                args,
            },
            op @ (Op::ConstNull
            | Op::ConstInt(_)
            | Op::ConstLong(_)
            | Op::ConstString(_)
            | Op::NewUnboxedEnumInstance { .. }
            | Op::ArrayPut { .. }
            | Op::ArrayLength(_)
            | Op::Binop { .. }
            | Op::DebugPosition) => op,
        };
        out.push(Instruction::new(dest, op, position));
    }

    fn rewrite_invoke(
        &self,
        code: &mut IrCode,
        out: &mut Vec<Instruction>,
        dest: Option<ValueId>,
        (kind, method, args, is_interface): (InvokeKind, MethodRef, Vec<ValueId>, bool),
        context: &MethodRef,
        position: Position,
    ) {
        let result = self
            .lens
            .lookup_method(&method, Some(context), kind, self.code_lens);
        let changes = &result.prototype_changes;
        let mut new_args: Vec<ValueId> = (0u32..)
            .zip(args)
            .filter(|(i, _)| !matches!(changes.argument(*i), Some(ArgumentChange::Removed { .. })))
            .map(|(_, arg)| arg)
            .collect();
        for extra in changes.extra_parameters() {
            let (op, ty) = match *extra {
                ExtraParameter::UnusedNull(ty) => (Op::ConstNull, ty),
                ExtraParameter::ConstantInt(value) => (Op::ConstInt(value), known::int()),
            };
            let value = code.new_value(ty, ValueDef::Instruction);
            out.push(Instruction::new(Some(value), op, position));
            new_args.push(value);
        }
        let is_interface = if result.invoke_kind == kind {
            is_interface
        } else {
            result.invoke_kind == InvokeKind::Interface
        };
        let dest = dest.filter(|_| !result.reference.proto.return_type.is_void());
        out.push(Instruction::new(
            dest,
            Op::Invoke {
                kind: result.invoke_kind,
                method: result.reference,
                args: new_args,
                is_interface,
            },
            position,
        ));
    }
}

fn handle_invoke_kind(kind: MethodHandleKind) -> InvokeKind {
    match kind {
        MethodHandleKind::InvokeStatic => InvokeKind::Static,
        MethodHandleKind::InvokeVirtual => InvokeKind::Virtual,
        MethodHandleKind::InvokeInterface => InvokeKind::Interface,
        MethodHandleKind::InvokeDirect
        | MethodHandleKind::InvokeConstructor
        | MethodHandleKind::StaticGet
        | MethodHandleKind::StaticPut
        | MethodHandleKind::InstanceGet
        | MethodHandleKind::InstancePut => InvokeKind::Direct,
    }
}

/// The value a body sees for an argument callers no longer pass.
fn removed_argument_value(ty: TypeRef, constant: Option<i64>) -> Op {
    if ty.is_reference() {
        Op::ConstNull
    } else if ty == known::long() {
        Op::ConstLong(constant.unwrap_or(0))
    } else {
        Op::ConstInt(constant.and_then(|c| i32::try_from(c).ok()).unwrap_or(0))
    }
}

fn push_field_read(
    code: &mut IrCode,
    out: &mut Vec<Instruction>,
    dest: Option<ValueId>,
    op: Op,
    result: FieldLookupResult,
    position: Position,
) {
    match (result.read_cast, dest) {
        (Some(cast), Some(dest)) => {
            let raw = code.new_value(result.reference.ty, ValueDef::Instruction);
            out.push(Instruction::new(Some(raw), op, position));
            out.push(Instruction::new(
                Some(dest),
                Op::CheckCast {
                    value: raw,
                    ty: cast,
                },
                position,
            ));
        }
        _ => out.push(Instruction::new(dest, op, position)),
    }
}

/// Drop catch handlers whose guard repeats an earlier guard of the same
/// block, then remove handler blocks that became unreachable.
pub(crate) fn prune_duplicate_catch_handlers(code: &mut IrCode) -> bool {
    let before = code.predecessors();
    let mut changed = false;
    for block in &mut code.blocks {
        let mut seen: Vec<TypeRef> = Vec::with_capacity(block.catch_handlers.len());
        block.catch_handlers.retain(|handler| {
            if seen.contains(&handler.guard) {
                changed = true;
                false
            } else {
                seen.push(handler.guard);
                true
            }
        });
    }
    if !changed {
        return false;
    }

    // Phi operands follow the predecessor order, so re-select them for
    // every block that lost an incoming edge.
    let after = code.predecessors();
    for (i, block) in code.blocks.iter_mut().enumerate() {
        if before[i] == after[i] {
            continue;
        }
        let kept: Vec<usize> = after[i]
            .iter()
            .filter_map(|p| before[i].iter().position(|q| q == p))
            .collect();
        for phi in &mut block.phis {
            phi.operands = kept.iter().map(|&k| phi.operands[k]).collect();
        }
    }
    code.remove_unreachable_blocks();
    tracing::trace!(method = %code.method, "pruned duplicate catch handlers");
    true
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
