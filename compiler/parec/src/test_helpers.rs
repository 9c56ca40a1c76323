//! Program factories for pipeline tests.

use pare_ir::ir::{InvokeKind, IrBuilder, Op};
use pare_ir::{
    known, AccessFlags, FieldRef, MethodRef, Name, Program, ProgramClass, ProgramField,
    ProgramMethod, Proto, TypeRef,
};

pub(crate) const OBJECT: &str = "Ljava/lang/Object;";
pub(crate) const STRING: &str = "Ljava/lang/String;";
pub(crate) const ENUM: &str = "Ljava/lang/Enum;";
pub(crate) const COLOR: &str = "Lp/Color;";
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

pub(crate) fn class(descriptor: &str, superclass: &str) -> ProgramClass {
    ProgramClass::new(ty(descriptor), Some(ty(superclass)))
}

pub(crate) fn instance_field(holder: &str, name: &str, field_type: &str) -> ProgramField {
    ProgramField::new(field(holder, name, field_type), AccessFlags::PRIVATE)
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

/// `Object`, `Enum` and `String`.
pub(crate) fn library_classes() -> Vec<ProgramClass> {
    vec![
        ProgramClass::library(known::object(), None),
        ProgramClass::library(known::enum_base(), Some(known::object())),
        ProgramClass::library(known::string(), Some(known::object())),
    ]
}

/// `enum Color { RED, GREEN, BLUE }` with `$VALUES`, `values()` and
/// `valueOf(String)`.
pub(crate) fn color_enum() -> ProgramClass {
    let names = ["RED", "GREEN", "BLUE"];
    let color = ty(COLOR);
    let array_type = color.to_array();
    let mut class = class(COLOR, ENUM);
    class.access = AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ENUM;
    for name in names {
        class.fields.push(ProgramField::new(
            field(COLOR, name, COLOR),
            AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::ENUM,
        ));
    }
    let values_field = FieldRef::new(color, known::values_field(), array_type);
    class.fields.push(ProgramField::new(
        values_field,
        AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
    ));

    let constructor = method(COLOR, "<init>", "V", &[STRING, "I"]);
    class.methods.push(with_body(
        method(COLOR, "<clinit>", "V", &[]),
        AccessFlags::STATIC | AccessFlags::CONSTRUCTOR,
        |b| {
            let mut instances = Vec::new();
            for (ordinal, name) in (0..).zip(names) {
                let instance = b.emit_value(Op::NewInstance(color), color);
                let name_value = b.const_string(Name::intern(name));
                let ordinal_value = b.const_int(ordinal);
                b.invoke(
                    InvokeKind::Direct,
                    constructor.clone(),
                    vec![instance, name_value, ordinal_value],
                );
                b.emit(Op::StaticPut {
                    field: field(COLOR, name, COLOR),
                    value: instance,
                });
                instances.push(instance);
            }
            let size = b.const_int(3);
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
    ));
    class.methods.push(with_body(
        constructor,
        AccessFlags::PRIVATE | AccessFlags::CONSTRUCTOR,
        |b| {
            let args = b.arguments()[..3].to_vec();
            b.invoke(
                InvokeKind::Direct,
                method(ENUM, "<init>", "V", &[STRING, "I"]),
                args,
            );
            b.ret(None);
        },
    ));
    class.methods.push(with_body(
        MethodRef::new(color, known::values(), Proto::new(array_type, Vec::new())),
        public_static(),
        |b| {
            let values = b.static_get(values_field);
            b.ret(Some(values));
        },
    ));
    class.methods.push(with_body(
        MethodRef::new(color, known::value_of(), Proto::new(color, vec![known::string()])),
        public_static(),
        |b| {
            let null = b.emit_value(Op::ConstNull, color);
            b.ret(Some(null));
        },
    ));
    class
}

/// A class with one `int` field and a static identity method `id(I)I`.
/// Two of these merge.
pub(crate) fn holder(descriptor: &str) -> ProgramClass {
    let mut holder = class(descriptor, OBJECT);
    holder.fields.push(instance_field(descriptor, "x", "I"));
    holder.methods.push(with_body(
        method(descriptor, "id", "I", &["I"]),
        public_static(),
        |b| {
            let x = b.argument(0);
            b.ret(Some(x));
        },
    ));
    holder
}

/// `User` with `useRed()I`, `describe(Color)String` and `run()V`, which
/// calls `A.id(2)`, `C.id(3)` and `describe(GREEN)`.
pub(crate) fn user() -> ProgramClass {
    let mut user = class(USER, OBJECT);
    user.methods.push(with_body(
        method(USER, "useRed", "I", &[]),
        public_static(),
        |b| {
            let red = b.static_get(field(COLOR, "RED", COLOR));
            let ordinal = b
                .invoke(InvokeKind::Virtual, method(ENUM, "ordinal", "I", &[]), vec![red])
                .unwrap_or_else(|| panic!("ordinal() returns a value"));
            b.ret(Some(ordinal));
        },
    ));
    user.methods.push(with_body(
        method(USER, "describe", STRING, &[COLOR]),
        public_static(),
        |b| {
            let c = b.argument(0);
            let name = b
                .invoke(InvokeKind::Virtual, method(COLOR, "name", STRING, &[]), vec![c])
                .unwrap_or_else(|| panic!("name() returns a value"));
            b.ret(Some(name));
        },
    ));
    user.methods.push(with_body(
        method(USER, "run", "V", &[]),
        public_static(),
        |b| {
            let two = b.const_int(2);
            b.invoke(InvokeKind::Static, method("Lp/A;", "id", "I", &["I"]), vec![two]);
            let three = b.const_int(3);
            b.invoke(InvokeKind::Static, method("Lp/C;", "id", "I", &["I"]), vec![three]);
            let green = b.static_get(field(COLOR, "GREEN", COLOR));
            b.invoke(
                InvokeKind::Static,
                method(USER, "describe", STRING, &[COLOR]),
                vec![green],
            );
            b.ret(None);
        },
    ));
    user
}

/// Library classes, two mergeable holders `A` and `C`, `Color` and `User`.
pub(crate) fn sample_program() -> Program {
    library_classes()
        .into_iter()
        .chain([holder("Lp/A;"), holder("Lp/C;"), color_enum(), user()])
        .collect()
}
