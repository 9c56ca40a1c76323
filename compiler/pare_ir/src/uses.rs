//! Visiting the references a method body makes, in either code form.
//!
//! Analyses that only need "what does this body touch" (field access
//! collection, merge policies, enum eligibility) implement [`UseRegistry`]
//! and call [`register_uses`] instead of decoding bodies themselves.

use crate::ir::{InvokeKind, IrCode, Op};
use crate::lir::{LirCode, LirConstant, LirError, LirInstruction};
use crate::program::Code;
use crate::{CallSite, FieldRef, MethodHandle, MethodRef, TypeRef};

/// How a type is mentioned by an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeUse {
    ConstClass,
    NewInstance,
    NewArray,
    CheckCast,
    InstanceOf,
    CatchGuard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldAccess {
    StaticRead,
    StaticWrite,
    InstanceRead,
    InstanceWrite,
}

impl FieldAccess {
    pub fn is_read(self) -> bool {
        matches!(self, FieldAccess::StaticRead | FieldAccess::InstanceRead)
    }
}

/// Receives every reference in a method body. All methods default to no-ops.
pub trait UseRegistry {
    fn register_type(&mut self, _ty: TypeRef, _use: TypeUse) {}

    fn register_field(&mut self, _field: FieldRef, _access: FieldAccess) {}

    fn register_invoke(&mut self, _method: &MethodRef, _kind: InvokeKind, _is_interface: bool) {}

    fn register_method_handle(&mut self, _handle: &MethodHandle) {}

    fn register_call_site(&mut self, _call_site: &CallSite) {}
}

/// Report every reference in `code` to `registry`.
pub fn register_uses(code: &Code, registry: &mut impl UseRegistry) -> Result<(), LirError> {
    match code {
        Code::Ir(ir) => {
            register_ir_uses(ir, registry);
            Ok(())
        }
        Code::Lir(lir) => register_lir_uses(lir, registry),
    }
}

pub fn register_ir_uses(code: &IrCode, registry: &mut impl UseRegistry) {
    for block in &code.blocks {
        for handler in &block.catch_handlers {
            registry.register_type(handler.guard, TypeUse::CatchGuard);
        }
        for insn in &block.body {
            match &insn.op {
                Op::ConstClass(ty) => registry.register_type(*ty, TypeUse::ConstClass),
                Op::NewInstance(ty) => registry.register_type(*ty, TypeUse::NewInstance),
                Op::NewArray { ty, .. } => registry.register_type(*ty, TypeUse::NewArray),
                Op::CheckCast { ty, .. } => registry.register_type(*ty, TypeUse::CheckCast),
                Op::InstanceOf { ty, .. } => registry.register_type(*ty, TypeUse::InstanceOf),
                Op::StaticGet(field) => registry.register_field(*field, FieldAccess::StaticRead),
                Op::StaticPut { field, .. } => {
                    registry.register_field(*field, FieldAccess::StaticWrite);
                }
                Op::InstanceGet { field, .. } => {
                    registry.register_field(*field, FieldAccess::InstanceRead);
                }
                Op::InstancePut { field, .. } => {
                    registry.register_field(*field, FieldAccess::InstanceWrite);
                }
                Op::Invoke {
                    kind,
                    method,
                    is_interface,
                    ..
                } => registry.register_invoke(method, *kind, *is_interface),
                Op::InvokeCustom { call_site, .. } => registry.register_call_site(call_site),
                Op::ConstMethodHandle(handle) => registry.register_method_handle(handle),
                Op::ConstNull
                | Op::ConstInt(_)
                | Op::ConstLong(_)
                | Op::ConstString(_)
                | Op::ConstMethodType(_)
                | Op::NewUnboxedEnumInstance { .. }
                | Op::ArrayGet { .. }
                | Op::ArrayPut { .. }
                | Op::ArrayLength(_)
                | Op::Binop { .. }
                | Op::DebugPosition => {}
            }
        }
    }
}

pub fn register_lir_uses(code: &LirCode, registry: &mut impl UseRegistry) -> Result<(), LirError> {
    use LirInstruction as I;

    for guard in code.try_catch().guards() {
        registry.register_type(guard, TypeUse::CatchGuard);
    }
    let type_at = |index: u32| -> Result<TypeRef, LirError> {
        match code.constant(index)? {
            LirConstant::Type(ty) => Ok(*ty),
            _ => Err(LirError::ConstantKind {
                index,
                expected: "type",
            }),
        }
    };
    let field_at = |index: u32| -> Result<FieldRef, LirError> {
        match code.constant(index)? {
            LirConstant::Field(field) => Ok(*field),
            _ => Err(LirError::ConstantKind {
                index,
                expected: "field",
            }),
        }
    };

    for view in code.iter() {
        match view?.decode()? {
            I::Ldc(c) => match code.constant(c)? {
                LirConstant::Type(ty) => registry.register_type(*ty, TypeUse::ConstClass),
                LirConstant::MethodHandle(handle) => registry.register_method_handle(handle),
                _ => {}
            },
            I::NewInstance(c) => registry.register_type(type_at(c)?, TypeUse::NewInstance),
            I::NewArray { ty, .. } => registry.register_type(type_at(ty)?, TypeUse::NewArray),
            I::CheckCast { ty, .. } => registry.register_type(type_at(ty)?, TypeUse::CheckCast),
            I::InstanceOf { ty, .. } => registry.register_type(type_at(ty)?, TypeUse::InstanceOf),
            I::StaticGet(c) => registry.register_field(field_at(c)?, FieldAccess::StaticRead),
            I::StaticPut { field, .. } => {
                registry.register_field(field_at(field)?, FieldAccess::StaticWrite);
            }
            I::InstanceGet { field, .. } => {
                registry.register_field(field_at(field)?, FieldAccess::InstanceRead);
            }
            I::InstancePut { field, .. } => {
                registry.register_field(field_at(field)?, FieldAccess::InstanceWrite);
            }
            I::Invoke {
                kind,
                is_interface,
                method,
                ..
            } => match code.constant(method)? {
                LirConstant::Method(m) => registry.register_invoke(m, kind, is_interface),
                _ => {
                    return Err(LirError::ConstantKind {
                        index: method,
                        expected: "method",
                    })
                }
            },
            I::InvokeCustom { call_site, .. } => {
                if let LirConstant::CallSite(cs) = code.constant(call_site)? {
                    registry.register_call_site(cs);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::IrBuilder;
    use crate::known;
    use crate::lir::ir_to_lir;
    use crate::test_helpers::method;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl UseRegistry for Recorder {
        fn register_type(&mut self, ty: TypeRef, use_: TypeUse) {
            self.events.push(format!("{use_:?} {ty}"));
        }

        fn register_field(&mut self, field: FieldRef, access: FieldAccess) {
            self.events.push(format!("{access:?} {field}"));
        }

        fn register_invoke(&mut self, method: &MethodRef, kind: InvokeKind, _is_interface: bool) {
            self.events.push(format!("{kind:?} {method}"));
        }
    }

    fn sample() -> IrCode {
        let holder = TypeRef::new("Lt/A;");
        let field = FieldRef::new(holder, "x", known::int());
        let mut b = IrBuilder::new(method("Lt/T;", "f", known::void(), &[]), true);
        let handler = b.new_block();
        b.add_catch_handler(known::throwable(), handler);
        let obj = b.emit_value(Op::NewInstance(holder), holder);
        b.invoke(
            InvokeKind::Direct,
            MethodRef::new(holder, known::init(), crate::Proto::void()),
            vec![obj],
        );
        let value = b.static_get(field.with_name(crate::Name::from("y")));
        b.instance_put(field, obj, value);
        b.ret(None);
        b.switch_to(handler);
        b.ret(None);
        b.finish().unwrap()
    }

    #[test]
    fn ir_and_lir_report_the_same_uses() {
        let ir = sample();
        let mut from_ir = Recorder::default();
        register_uses(&Code::Ir(std::sync::Arc::new(ir.clone())), &mut from_ir).unwrap();

        let lir = ir_to_lir(&ir).unwrap();
        let mut from_lir = Recorder::default();
        register_uses(&Code::Lir(std::sync::Arc::new(lir)), &mut from_lir).unwrap();

        assert_eq!(from_ir.events, from_lir.events);
        assert_eq!(
            from_ir.events,
            vec![
                "CatchGuard Ljava/lang/Throwable;",
                "NewInstance Lt/A;",
                "Direct Lt/A;-><init>()V",
                "StaticRead Lt/A;->y:I",
                "InstanceWrite Lt/A;->x:I",
            ]
        );
    }

    #[test]
    fn field_access_kinds() {
        assert!(FieldAccess::StaticRead.is_read());
        assert!(!FieldAccess::InstanceWrite.is_read());
    }
}
