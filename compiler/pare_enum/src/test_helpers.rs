//! Program factories for pare_enum tests.

use pare_app::{AppView, FieldAccessInfoCollection, KeepInfo};
use pare_ir::ir::{InvokeKind, IrBuilder, Op, ValueId};
use pare_ir::{
    known, AccessFlags, FieldRef, MethodRef, Name, Program, ProgramClass, ProgramField,
    ProgramMethod, Proto, TypeRef,
};

use crate::analyze_instance_initializers;

pub(crate) const OBJECT: &str = "Ljava/lang/Object;";
pub(crate) const STRING: &str = "Ljava/lang/String;";
pub(crate) const ENUM: &str = "Ljava/lang/Enum;";
pub(crate) const COLOR: &str = "Lp/Color;";
pub(crate) const COLOR_ARRAY: &str = "[Lp/Color;";
pub(crate) const USER: &str = "Lp/User;";

pub(crate) fn ty(descriptor: &str) -> TypeRef {
    TypeRef::new(descriptor)
}

pub(crate) fn field(holder: &str, name: &str, field_type: &str) -> FieldRef {
    FieldRef::new(ty(holder), name, ty(field_type))
}

/// `method("Lp/A;", "m", "V", &["I"])` is `Lp/A;->m(I)V`.
pub(crate) fn method(holder: &str, name: &str, ret: &str, params: &[&str]) -> MethodRef {
    let params: Vec<TypeRef> = params.iter().map(|p| ty(p)).collect();
    MethodRef::new(ty(holder), name, Proto::new(ty(ret), params))
}

/// A program class extending `superclass`.
pub(crate) fn class(descriptor: &str, superclass: &str) -> ProgramClass {
    ProgramClass::new(ty(descriptor), Some(ty(superclass)))
}

/// A method whose IR body is produced by `body`. Static iff `access` says so.
pub(crate) fn with_body(
    reference: MethodRef,
    access: AccessFlags,
    body: impl FnOnce(&mut IrBuilder),
) -> ProgramMethod {
    let mut builder = IrBuilder::new(reference.clone(), access.is_static());
    body(&mut builder);
    let code = builder
        .finish()
        .unwrap_or_else(|e| panic!("test body for {reference} is malformed: {e}"));
    ProgramMethod::new(reference, access, Some(code.into()))
}

pub(crate) fn public_static() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC
}

/// `Enum.<init>(String, int)`.
pub(crate) fn enum_base_initializer() -> MethodRef {
    method(ENUM, "<init>", "V", &[STRING, "I"])
}

/// `E.<init>(String, int, extra...)`.
pub(crate) fn enum_constructor_ref(enum_type: &str, extra: &[&str]) -> MethodRef {
    let mut params = vec![STRING, "I"];
    params.extend_from_slice(extra);
    method(enum_type, "<init>", "V", &params)
}

/// `private E(String name, int ordinal)` calling `super(name, ordinal)`.
pub(crate) fn plain_enum_constructor(enum_type: &str) -> ProgramMethod {
    with_body(
        enum_constructor_ref(enum_type, &[]),
        AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR,
        |b| {
            let args = b.arguments()[..3].to_vec();
            b.invoke(InvokeKind::Direct, enum_base_initializer(), args);
            b.ret(None);
        },
    )
}

/// An enum declaring one constant field per name, `$VALUES`, `values()`,
/// `valueOf(String)` and a class initializer creating each constant with
/// `constructor`, passing `extra_args(ordinal)` after the name and ordinal.
pub(crate) fn enum_class(
    enum_type: &str,
    names: &[&str],
    constructor: ProgramMethod,
    extra_args: impl Fn(&mut IrBuilder, i32) -> Vec<ValueId>,
) -> ProgramClass {
    let mut class = class(enum_type, ENUM);
    class.access = AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ENUM;
    let array_type = ty(enum_type).to_array();
    for name in names {
        class.fields.push(ProgramField::new(
            field(enum_type, name, enum_type),
            AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::ENUM,
        ));
    }
    let values_field = FieldRef::new(ty(enum_type), known::values_field(), array_type);
    class.fields.push(ProgramField::new(
        values_field,
        AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
    ));

    let constructor_ref = constructor.reference.clone();
    let clinit = with_body(
        method(enum_type, "<clinit>", "V", &[]),
        AccessFlags::STATIC | AccessFlags::CONSTRUCTOR,
        |b| {
            let mut instances = Vec::new();
            for (ordinal, name) in (0..).zip(names) {
                let instance = b.emit_value(Op::NewInstance(ty(enum_type)), ty(enum_type));
                let name_value = b.const_string(Name::intern(name));
                let ordinal_value = b.const_int(ordinal);
                let mut args = vec![instance, name_value, ordinal_value];
                args.extend(extra_args(b, ordinal));
                b.invoke(InvokeKind::Direct, constructor_ref.clone(), args);
                b.emit(Op::StaticPut {
                    field: field(enum_type, name, enum_type),
                    value: instance,
                });
                instances.push(instance);
            }
            let size = b.const_int(i32::try_from(names.len()).unwrap_or(i32::MAX));
            let array = b.emit_value(
                Op::NewArray {
                    ty: array_type,
                    size,
                },
                array_type,
            );
            for (index, instance) in (0..).zip(instances) {
                let index = b.const_int(index);
                b.emit(Op::ArrayPut {
                    array,
                    index,
                    value: instance,
                });
            }
            b.emit(Op::StaticPut {
                field: values_field,
                value: array,
            });
            b.ret(None);
        },
    );
    class.methods.push(clinit);
    class.methods.push(constructor);
    class.methods.push(with_body(
        MethodRef::new(ty(enum_type), known::values(), Proto::new(array_type, Vec::new())),
        public_static(),
        |b| {
            let values = b.static_get(values_field);
            b.ret(Some(values));
        },
    ));
    class.methods.push(with_body(
        MethodRef::new(
            ty(enum_type),
            known::value_of(),
            Proto::new(ty(enum_type), vec![known::string()]),
        ),
        public_static(),
        |b| {
            let null = b.emit_value(Op::ConstNull, ty(enum_type));
            b.ret(Some(null));
        },
    ));
    class
}

/// `enum Color { RED, GREEN, BLUE }`.
pub(crate) fn color_enum() -> ProgramClass {
    enum_class(
        COLOR,
        &["RED", "GREEN", "BLUE"],
        plain_enum_constructor(COLOR),
        |_, _| Vec::new(),
    )
}

/// A class `USER` with one static method built by `body`.
pub(crate) fn user_of(reference: MethodRef, body: impl FnOnce(&mut IrBuilder)) -> ProgramClass {
    let mut user = class(USER, OBJECT);
    user.methods.push(with_body(reference, public_static(), body));
    user
}

/// An app over `classes` plus the library classes they need, with
/// instance initializers analyzed and field access info computed.
pub(crate) fn app(classes: impl IntoIterator<Item = ProgramClass>, keep_info: KeepInfo) -> AppView {
    let program: Program = [
        ProgramClass::library(known::object(), None),
        ProgramClass::library(known::enum_base(), Some(known::object())),
        ProgramClass::library(known::string(), Some(known::object())),
    ]
    .into_iter()
    .chain(classes)
    .collect();
    let program = analyze_instance_initializers(&program)
        .unwrap_or_else(|e| panic!("cannot analyze initializers: {e}"));
    let field_access = FieldAccessInfoCollection::compute(&program)
        .unwrap_or_else(|e| panic!("cannot compute field access info: {e}"));
    AppView::new(program, keep_info).with_field_access_info(field_access)
}
