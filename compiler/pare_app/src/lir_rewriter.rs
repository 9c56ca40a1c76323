//! Rewriting LIR bodies to the current lens without decoding them when
//! possible.
//!
//! # Architecture
//!
//! Two tiers:
//!
//! - **Fast path.** The constant pool is rewritten entry by entry. If no
//!   entry changed and no layer re-kinds a call, the body is returned
//!   untouched. Otherwise the instruction stream is scanned once: invokes
//!   whose kind changed get a new opcode byte (operands keep their length),
//!   everything else already reads the rewritten pool.
//! - **Slow path.** Anything that needs instructions added or removed (the
//!   method's own prototype changed, a call site's prototype changed, a
//!   widened field is read, two catch guards of one block collapsed) decodes
//!   the body to IR against its previous signature, runs the
//!   [`LensCodeRewriter`] and encodes the result.

use pare_ir::ir::InvokeKind;
use pare_ir::lir::{
    ir_to_lir, lir_to_ir, opcodes, LirCode, LirConstant, LirError, LirInstruction, TryCatchTable,
};
use pare_ir::MethodRef;
use pare_lens::GraphLens;
use rustc_hash::FxHashSet;

use crate::rewriter::LensCodeRewriter;
use crate::AppView;

/// What rewriting did to a body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LirRewrite {
    /// Nothing in the body changed under the lens.
    Unchanged,
    /// Constant pool (and possibly invoke opcodes) patched in place.
    Patched(LirCode),
    /// Decoded, rewritten as IR and encoded again.
    Rebuilt(LirCode),
}

impl LirRewrite {
    pub fn into_code(self) -> Option<LirCode> {
        match self {
            LirRewrite::Unchanged => None,
            LirRewrite::Patched(code) | LirRewrite::Rebuilt(code) => Some(code),
        }
    }
}

pub struct LirLensCodeRewriter<'a> {
    rewriter: LensCodeRewriter<'a>,
}

impl<'a> LirLensCodeRewriter<'a> {
    pub fn new(lens: &'a GraphLens, code_lens: &'a GraphLens) -> Self {
        LirLensCodeRewriter {
            rewriter: LensCodeRewriter::new(lens, code_lens),
        }
    }

    pub fn for_app(app: &'a AppView) -> Self {
        Self::new(app.lens(), app.code_lens())
    }

    /// Rewrite `lir` into the body of `method`, the method's current name.
    pub fn rewrite(
        &self,
        lir: &LirCode,
        method: &MethodRef,
        is_static: bool,
    ) -> Result<LirRewrite, LirError> {
        let lens = self.rewriter.lens;
        let code_lens = self.rewriter.code_lens;
        if !lens
            .lookup_prototype_changes_for_method_definition(method, code_lens)
            .is_empty()
        {
            return self.rebuild(lir, method, is_static);
        }

        let mut constants = Vec::with_capacity(lir.constants().len());
        let mut casted_fields = FxHashSet::default();
        let mut pool_changed = false;
        let mut kinds_changed = false;
        for (index, constant) in (0u32..).zip(lir.constants()) {
            let rewritten = match constant {
                LirConstant::Type(ty) => LirConstant::Type(self.rewriter.lookup_type(*ty)),
                LirConstant::Field(field) => {
                    let result = self.rewriter.lookup_field(*field);
                    if result.read_cast.is_some() {
                        casted_fields.insert(index);
                    }
                    LirConstant::Field(result.reference)
                }
                LirConstant::Method(m) => {
                    let result = lens.lookup_method(m, Some(method), InvokeKind::Virtual, code_lens);
                    if result.has_prototype_changes() {
                        return self.rebuild(lir, method, is_static);
                    }
                    // A layer that records an invoke kind overrides whatever
                    // kind the call used, so probing two kinds detects it.
                    kinds_changed |= result.invoke_kind != InvokeKind::Virtual
                        || lens
                            .lookup_method(m, Some(method), InvokeKind::Static, code_lens)
                            .invoke_kind
                            != InvokeKind::Static;
                    LirConstant::Method(result.reference)
                }
                LirConstant::String(_) => constant.clone(),
                LirConstant::Proto(proto) => LirConstant::Proto(self.rewriter.lookup_proto(proto)),
                LirConstant::MethodHandle(handle) => {
                    LirConstant::MethodHandle(self.rewriter.rewrite_method_handle(handle, method))
                }
                LirConstant::CallSite(call_site) => {
                    LirConstant::CallSite(self.rewriter.rewrite_call_site(call_site, method))
                }
            };
            pool_changed |= rewritten != *constant;
            constants.push(rewritten);
        }

        let Some(try_catch) = self.rewrite_try_catch(lir.try_catch()) else {
            return self.rebuild(lir, method, is_static);
        };
        let try_catch_changed = try_catch != *lir.try_catch();
        if !pool_changed && !try_catch_changed && !kinds_changed {
            return Ok(LirRewrite::Unchanged);
        }

        let mut bytes: Option<Vec<u8>> = None;
        if pool_changed || kinds_changed {
            for view in lir.iter() {
                let view = view?;
                match view.decode()? {
                    LirInstruction::StaticGet(field) | LirInstruction::InstanceGet { field, .. }
                        if casted_fields.contains(&field) =>
                    {
                        return self.rebuild(lir, method, is_static);
                    }
                    LirInstruction::Invoke {
                        kind,
                        is_interface,
                        method: index,
                        ..
                    } => {
                        let LirConstant::Method(target) = lir.constant(index)? else {
                            return Err(LirError::ConstantKind {
                                index,
                                expected: "method",
                            });
                        };
                        let result = lens.lookup_method(target, Some(method), kind, code_lens);
                        if result.invoke_kind == kind {
                            continue;
                        }
                        let is_interface = if result.invoke_kind == InvokeKind::Interface {
                            true
                        } else if kind == InvokeKind::Interface {
                            false
                        } else {
                            is_interface
                        };
                        let opcode = opcodes::invoke_opcode(result.invoke_kind, is_interface);
                        bytes.get_or_insert_with(|| lir.bytes().to_vec())[view.offset] = opcode;
                    }
                    _ => {}
                }
            }
        }

        if bytes.is_none() && !pool_changed && !try_catch_changed {
            return Ok(LirRewrite::Unchanged);
        }
        let mut code = match bytes {
            Some(bytes) => lir.with_instructions(bytes, constants),
            None => lir.with_constants(constants),
        };
        if try_catch_changed {
            code = code.with_try_catch(try_catch);
        }
        Ok(LirRewrite::Patched(code))
    }

    /// Guards mapped through the lens, or `None` if a block now has two
    /// equal guards.
    fn rewrite_try_catch(&self, table: &TryCatchTable) -> Option<TryCatchTable> {
        let mut out = TryCatchTable::default();
        for (&block, handlers) in &table.handlers {
            let mut rewritten = Vec::with_capacity(handlers.len());
            for handler in handlers {
                let mut handler = *handler;
                handler.guard = self.rewriter.lookup_type(handler.guard);
                if rewritten
                    .iter()
                    .any(|h: &pare_ir::lir::LirCatchHandler| h.guard == handler.guard)
                {
                    return None;
                }
                rewritten.push(handler);
            }
            out.handlers.insert(block, rewritten);
        }
        Some(out)
    }

    fn rebuild(
        &self,
        lir: &LirCode,
        method: &MethodRef,
        is_static: bool,
    ) -> Result<LirRewrite, LirError> {
        let previous = self
            .rewriter
            .lens
            .get_previous_method_signature(method, self.rewriter.code_lens);
        let was_static = lir.argument_count() as usize == previous.proto.arity();
        let argument_types = previous.argument_types(was_static);
        let ir = lir_to_ir(lir, previous, was_static, &argument_types)?;
        let ir = self.rewriter.rewrite(ir, method, is_static);
        tracing::trace!(%method, "rewrote method through IR");
        Ok(LirRewrite::Rebuilt(ir_to_lir(&ir)?))
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
