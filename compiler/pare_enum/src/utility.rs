//! The synthesized utility classes.
//!
//! # Architecture
//!
//! - **Shared utility**: one class per run, next to the smallest unboxed
//!   enum. It holds the `$VALUES` lookup array, whose index `0` stands for
//!   `null`, and the helpers every unboxed enum uses in place of the
//!   `java.lang.Enum` methods.
//! - **Local utility**: one class per unboxed enum. The tree fixer moves the
//!   enum's static fields and methods there; this module adds the methods
//!   that depend on the constants: `$name`, `valueOf` and one getter per
//!   read instance field.
//!
//! Every body built here is written against the new names already.

use pare_app::FieldAccessInfoModifier;
use pare_ir::ir::{
    BinopKind, IfKind, IfType, InvokeKind, IrBuilder, IrError, NumericType, Op, Terminator,
    ValueId,
};
use pare_ir::program::StaticValue;
use pare_ir::{
    known, AccessFlags, FieldRef, MethodRef, Name, Program, ProgramClass, ProgramField,
    ProgramMethod, Proto, TypeRef,
};

use crate::enum_data::{unboxed_value, EnumData};
use crate::error::EnumError;

const SHARED_SUFFIX: &str = "$$EnumUnboxingSharedUtility";
const LOCAL_SUFFIX: &str = "$$EnumUnboxingLocalUtility";

fn utility_access() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC
}

fn method_access() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::SYNTHETIC
}

fn class_initializer_access() -> AccessFlags {
    AccessFlags::STATIC | AccessFlags::CONSTRUCTOR
}

/// `candidate`, or `candidate` with a counter appended until no class of
/// `program` has the name.
fn unique_type(program: &Program, candidate: impl Fn(&str) -> TypeRef) -> TypeRef {
    let mut ty = candidate("");
    let mut counter = 1u32;
    while program.contains(ty) {
        ty = candidate(&counter.to_string());
        counter += 1;
    }
    ty
}

fn synthesize(
    reference: MethodRef,
    access: AccessFlags,
    body: impl FnOnce(&mut IrBuilder),
) -> Result<ProgramMethod, EnumError> {
    let mut builder = IrBuilder::new(reference.clone(), access.is_static());
    body(&mut builder);
    let code = builder
        .finish()
        .map_err(|source| EnumError::Synthesize {
            method: reference.clone(),
            source,
        })?;
    Ok(ProgramMethod::new(reference, access, Some(code.into())))
}

// ── Body fragments ──────────────────────────────────────────────────

fn binop(b: &mut IrBuilder, op: BinopKind, lhs: ValueId, rhs: ValueId) -> ValueId {
    b.emit_value(
        Op::Binop {
            op,
            ty: NumericType::Int,
            lhs,
            rhs,
        },
        known::int(),
    )
}

/// `throw new T()` or `throw new T(message)`.
fn throw_new(b: &mut IrBuilder, exception: TypeRef, message: Option<ValueId>) {
    let instance = b.emit_value(Op::NewInstance(exception), exception);
    let (params, args) = match message {
        Some(message) => (vec![known::string()], vec![instance, message]),
        None => (Vec::new(), vec![instance]),
    };
    let init = MethodRef::new(exception, known::init(), Proto::new(known::void(), params));
    b.invoke(InvokeKind::Direct, init, args);
    b.terminate(Terminator::Throw(instance));
}

/// One case per ordinal: the block reached when `value` is the constant
/// with that ordinal is handed to `case`, which must terminate it. Any
/// other value, `0` included, throws a `NullPointerException`.
fn dispatch_on_constant(
    b: &mut IrBuilder,
    value: ValueId,
    count: usize,
    mut case: impl FnMut(&mut IrBuilder, i32),
) {
    for ordinal in (0..).take(count) {
        let hit = b.new_block();
        let miss = b.new_block();
        let expected = b.const_int(unboxed_value(ordinal));
        b.terminate(Terminator::If {
            kind: IfKind::Ne,
            ty: IfType::Int,
            lhs: value,
            rhs: Some(expected),
            target: miss,
        });
        b.switch_to(hit);
        case(b, ordinal);
        b.switch_to(miss);
    }
    throw_new(b, known::null_pointer_exception(), None);
}

/// A constant of type `ty`. Unboxed enum values are `int`s, so their
/// `null` is `0`.
fn constant(b: &mut IrBuilder, value: StaticValue, ty: TypeRef) -> ValueId {
    match value {
        StaticValue::Int(v) => match i32::try_from(v) {
            Ok(v) if ty != known::long() => b.emit_value(Op::ConstInt(v), ty),
            _ => b.emit_value(Op::ConstLong(v), ty),
        },
        StaticValue::String(s) => b.const_string(s),
        StaticValue::Null if ty.is_primitive() => b.const_int(0),
        StaticValue::Null => b.emit_value(Op::ConstNull, ty),
    }
}

// ── Shared utility ──────────────────────────────────────────────────

pub(crate) struct SharedUtility {
    ty: TypeRef,
    /// Number of constants of the largest unboxed enum.
    max_values_size: usize,
}

impl SharedUtility {
    /// Named after the package of `smallest_enum`, so the name only depends
    /// on the input program.
    pub(crate) fn new(program: &Program, smallest_enum: TypeRef, max_values_size: usize) -> Self {
        let package = smallest_enum.package();
        let ty = unique_type(program, |counter| {
            if package.is_empty() {
                TypeRef::class(&format!("{SHARED_SUFFIX}{counter}"))
            } else {
                TypeRef::class(&format!("{package}/{SHARED_SUFFIX}{counter}"))
            }
        });
        SharedUtility {
            ty,
            max_values_size,
        }
    }

    pub(crate) fn ty(&self) -> TypeRef {
        self.ty
    }

    fn method(&self, name: &str, ret: TypeRef, params: Vec<TypeRef>) -> MethodRef {
        MethodRef::new(self.ty, name, Proto::new(ret, params))
    }

    pub(crate) fn values_field(&self) -> FieldRef {
        FieldRef::new(self.ty, known::values_field(), known::int_array())
    }

    pub(crate) fn check_not_zero(&self) -> MethodRef {
        self.method("checkNotZero", known::void(), vec![known::int()])
    }

    pub(crate) fn check_not_zero_with_message(&self) -> MethodRef {
        self.method(
            "checkNotZero",
            known::void(),
            vec![known::int(), known::string()],
        )
    }

    pub(crate) fn compare_to(&self) -> MethodRef {
        self.method("compareTo", known::int(), vec![known::int(), known::int()])
    }

    pub(crate) fn equals(&self) -> MethodRef {
        self.method("equals", known::boolean(), vec![known::int(), known::int()])
    }

    pub(crate) fn ordinal(&self) -> MethodRef {
        self.method("ordinal", known::int(), vec![known::int()])
    }

    pub(crate) fn values(&self) -> MethodRef {
        self.method("values", known::int_array(), vec![known::int()])
    }

    /// The class with every helper. Returns the class and the synthesized
    /// methods.
    pub(crate) fn build(
        &self,
        field_access: &mut FieldAccessInfoModifier,
    ) -> Result<(ProgramClass, Vec<MethodRef>), EnumError> {
        let mut class = ProgramClass::new(self.ty, Some(known::object()));
        class.access = utility_access();
        class.fields.push(ProgramField::new(
            self.values_field(),
            AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
        ));

        class.methods.push(self.build_class_initializer()?);
        class.methods.push(self.build_check_not_zero(false)?);
        class.methods.push(self.build_check_not_zero(true)?);
        class.methods.push(self.build_compare_to()?);
        class.methods.push(self.build_equals()?);
        class.methods.push(self.build_ordinal()?);
        class.methods.push(self.build_values()?);

        let clinit = MethodRef::new(self.ty, known::clinit(), Proto::void());
        field_access.record_write(self.values_field(), clinit);
        field_access.record_read(self.values_field(), self.values());
        let synthesized = class.methods.iter().map(|m| m.reference.clone()).collect();
        Ok((class, synthesized))
    }

    /// `$VALUES = new int[max + 1]` with `$VALUES[i] = i`.
    fn build_class_initializer(&self) -> Result<ProgramMethod, EnumError> {
        let reference = MethodRef::new(self.ty, known::clinit(), Proto::void());
        let length = self.max_values_size + 1;
        synthesize(reference, class_initializer_access(), |b| {
            let size = b.const_int(i32::try_from(length).unwrap_or(i32::MAX));
            let array = b.emit_value(
                Op::NewArray {
                    ty: known::int_array(),
                    size,
                },
                known::int_array(),
            );
            for i in (0..).take(length) {
                let index = b.const_int(i);
                b.emit(Op::ArrayPut {
                    array,
                    index,
                    value: index,
                });
            }
            b.emit(Op::StaticPut {
                field: self.values_field(),
                value: array,
            });
            b.ret(None);
        })
    }

    fn build_check_not_zero(&self, with_message: bool) -> Result<ProgramMethod, EnumError> {
        let reference = if with_message {
            self.check_not_zero_with_message()
        } else {
            self.check_not_zero()
        };
        synthesize(reference, method_access(), |b| {
            let value = b.argument(0);
            let message = with_message.then(|| b.argument(1));
            let fail = b.new_block();
            let done = b.new_block();
            b.terminate(Terminator::If {
                kind: IfKind::Ne,
                ty: IfType::Int,
                lhs: value,
                rhs: None,
                target: done,
            });
            b.switch_to(fail);
            throw_new(b, known::null_pointer_exception(), message);
            b.switch_to(done);
            b.ret(None);
        })
    }

    fn build_compare_to(&self) -> Result<ProgramMethod, EnumError> {
        synthesize(self.compare_to(), method_access(), |b| {
            let (lhs, rhs) = (b.argument(0), b.argument(1));
            b.invoke(InvokeKind::Static, self.check_not_zero(), vec![lhs]);
            b.invoke(InvokeKind::Static, self.check_not_zero(), vec![rhs]);
            let difference = binop(b, BinopKind::Sub, lhs, rhs);
            b.ret(Some(difference));
        })
    }

    fn build_equals(&self) -> Result<ProgramMethod, EnumError> {
        synthesize(self.equals(), method_access(), |b| {
            let (lhs, rhs) = (b.argument(0), b.argument(1));
            b.invoke(InvokeKind::Static, self.check_not_zero(), vec![lhs]);
            let same = b.new_block();
            let different = b.new_block();
            b.terminate(Terminator::If {
                kind: IfKind::Ne,
                ty: IfType::Int,
                lhs,
                rhs: Some(rhs),
                target: different,
            });
            b.switch_to(same);
            let one = b.emit_value(Op::ConstInt(1), known::boolean());
            b.ret(Some(one));
            b.switch_to(different);
            let zero = b.emit_value(Op::ConstInt(0), known::boolean());
            b.ret(Some(zero));
        })
    }

    fn build_ordinal(&self) -> Result<ProgramMethod, EnumError> {
        synthesize(self.ordinal(), method_access(), |b| {
            let value = b.argument(0);
            b.invoke(InvokeKind::Static, self.check_not_zero(), vec![value]);
            let one = b.const_int(1);
            let ordinal = binop(b, BinopKind::Sub, value, one);
            b.ret(Some(ordinal));
        })
    }

    /// `values(n)`: the first `n` entries of `$VALUES` after the `null` slot.
    fn build_values(&self) -> Result<ProgramMethod, EnumError> {
        let reference = self.values();
        let mut builder = IrBuilder::new(reference.clone(), true);
        let b = &mut builder;
        let size = b.argument(0);
        let header = b.new_block();
        let body = b.new_block();
        let exit = b.new_block();

        let result = b.emit_value(
            Op::NewArray {
                ty: known::int_array(),
                size,
            },
            known::int_array(),
        );
        let lookup = b.static_get(self.values_field());
        let zero = b.const_int(0);
        b.terminate(Terminator::Goto(header));

        // The phi's back-edge operand is defined in the body; patched below.
        b.switch_to(header);
        let index = b.phi(known::int(), vec![zero, zero]);
        b.terminate(Terminator::If {
            kind: IfKind::Ge,
            ty: IfType::Int,
            lhs: index,
            rhs: Some(size),
            target: exit,
        });

        b.switch_to(body);
        let one = b.const_int(1);
        let source = binop(b, BinopKind::Add, index, one);
        let value = b.emit_value(
            Op::ArrayGet {
                ty: known::int(),
                array: lookup,
                index: source,
            },
            known::int(),
        );
        b.emit(Op::ArrayPut {
            array: result,
            index,
            value,
        });
        b.terminate(Terminator::Goto(header));

        b.switch_to(exit);
        b.ret(Some(result));

        let mut code = builder.finish().map_err(|source| synthesize_error(&reference, source))?;
        let back_edge = source;
        if let Some(phi) = code.blocks[header.index()].phis.first_mut() {
            if let Some(operand) = phi.operands.get_mut(1) {
                *operand = back_edge;
            }
        }
        code.verify().map_err(|source| synthesize_error(&reference, source))?;
        Ok(ProgramMethod::new(reference, method_access(), Some(code.into())))
    }
}

fn synthesize_error(method: &MethodRef, source: IrError) -> EnumError {
    EnumError::Synthesize {
        method: method.clone(),
        source,
    }
}

// ── Local utility ───────────────────────────────────────────────────

pub(crate) struct LocalUtility {
    ty: TypeRef,
}

impl LocalUtility {
    pub(crate) fn new(program: &Program, enum_type: TypeRef) -> Self {
        let ty = unique_type(program, |counter| {
            enum_type.with_suffix(&format!("{LOCAL_SUFFIX}{counter}"))
        });
        LocalUtility { ty }
    }

    pub(crate) fn ty(&self) -> TypeRef {
        self.ty
    }

    pub(crate) fn empty_class(&self) -> ProgramClass {
        let mut class = ProgramClass::new(self.ty, Some(known::object()));
        class.access = utility_access();
        class
    }

    pub(crate) fn name_method(&self) -> MethodRef {
        MethodRef::new(
            self.ty,
            "$name",
            Proto::new(known::string(), vec![known::int()]),
        )
    }

    pub(crate) fn value_of(&self) -> MethodRef {
        MethodRef::new(
            self.ty,
            known::value_of(),
            Proto::new(known::int(), vec![known::string()]),
        )
    }

    /// Getter for the instance field `field`, whose type is `ty` under the
    /// new names.
    pub(crate) fn getter(&self, field: FieldRef, ty: TypeRef) -> MethodRef {
        MethodRef::new(
            self.ty,
            Name::intern(&format!("get${}", field.name)),
            Proto::new(ty, vec![known::int()]),
        )
    }

    /// `$name(I)`: the name of the constant.
    pub(crate) fn build_name_method(&self, data: &EnumData) -> Result<ProgramMethod, EnumError> {
        synthesize(self.name_method(), method_access(), |b| {
            let value = b.argument(0);
            dispatch_on_constant(b, value, data.values_size(), |b, ordinal| {
                let name = data
                    .constants()
                    .get(usize::try_from(ordinal).unwrap_or(usize::MAX))
                    .map(|c| c.name);
                let name = match name {
                    Some(name) => b.const_string(name),
                    None => b.const_null(),
                };
                b.ret(Some(name));
            });
        })
    }

    /// `valueOf(String)I`: the constant with that name.
    pub(crate) fn build_value_of(&self, data: &EnumData) -> Result<ProgramMethod, EnumError> {
        let equals = MethodRef::new(
            known::string(),
            known::equals(),
            Proto::new(known::boolean(), vec![known::object()]),
        );
        synthesize(self.value_of(), method_access(), |b| {
            let name = b.argument(0);
            let null = b.new_block();
            let first = b.new_block();
            b.terminate(Terminator::If {
                kind: IfKind::Ne,
                ty: IfType::Object,
                lhs: name,
                rhs: None,
                target: first,
            });
            b.switch_to(null);
            throw_new(b, known::null_pointer_exception(), None);

            b.switch_to(first);
            for constant in data.constants() {
                let hit = b.new_block();
                let miss = b.new_block();
                let candidate = b.const_string(constant.name);
                let matches = b
                    .invoke(InvokeKind::Virtual, equals.clone(), vec![candidate, name])
                    .unwrap_or(candidate);
                b.terminate(Terminator::If {
                    kind: IfKind::Eq,
                    ty: IfType::Int,
                    lhs: matches,
                    rhs: None,
                    target: miss,
                });
                b.switch_to(hit);
                let value = b.const_int(constant.unboxed_value());
                b.ret(Some(value));
                b.switch_to(miss);
            }
            throw_new(b, known::illegal_argument_exception(), Some(name));
        })
    }

    /// The getter of `field`, answering the constant value per ordinal.
    pub(crate) fn build_getter(
        &self,
        data: &EnumData,
        field: FieldRef,
        ty: TypeRef,
    ) -> Result<ProgramMethod, EnumError> {
        let values = data.instance_field_values(&field).unwrap_or_default();
        synthesize(self.getter(field, ty), method_access(), |b| {
            let value = b.argument(0);
            dispatch_on_constant(b, value, values.len(), |b, ordinal| {
                let field_value = values
                    .get(usize::try_from(ordinal).unwrap_or(usize::MAX))
                    .copied()
                    .unwrap_or(StaticValue::Null);
                let result = constant(b, field_value, ty);
                b.ret(Some(result));
            });
        })
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
