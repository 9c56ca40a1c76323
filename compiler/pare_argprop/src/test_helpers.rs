//! Program factories for pare_argprop tests.

use pare_app::{AppView, FieldAccessInfoCollection, KeepInfo};
use pare_ir::ir::IrBuilder;
use pare_ir::{
    known, AccessFlags, FieldRef, MethodRef, Program, ProgramClass, ProgramField, ProgramMethod,
    Proto, TypeRef,
};

pub(crate) const OBJECT: &str = "Ljava/lang/Object;";
pub(crate) const STRING: &str = "Ljava/lang/String;";
pub(crate) const SHAPE: &str = "Lp/Shape;";
pub(crate) const CIRCLE: &str = "Lp/Circle;";
pub(crate) const SQUARE: &str = "Lp/Square;";
pub(crate) const MAIN: &str = "Lp/Main;";

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

pub(crate) fn returns_nothing(reference: MethodRef, access: AccessFlags) -> ProgramMethod {
    with_body(reference, access, |b| b.ret(None))
}

pub(crate) fn static_field(reference: FieldRef) -> ProgramField {
    ProgramField::new(reference, AccessFlags::PUBLIC | AccessFlags::STATIC)
}

/// `Shape` with a virtual `draw(I)V`, overridden by `Circle` and inherited
/// by `Square`.
pub(crate) fn shapes() -> Vec<ProgramClass> {
    let draw = |holder| returns_nothing(method(holder, "draw", "V", &["I"]), AccessFlags::PUBLIC);
    let constructor = |holder| {
        returns_nothing(
            method(holder, "<init>", "V", &[]),
            AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR,
        )
    };
    let mut shape = class(SHAPE, OBJECT);
    shape.methods.push(constructor(SHAPE));
    shape.methods.push(draw(SHAPE));
    let mut circle = class(CIRCLE, SHAPE);
    circle.methods.push(constructor(CIRCLE));
    circle.methods.push(draw(CIRCLE));
    let mut square = class(SQUARE, SHAPE);
    square.methods.push(constructor(SQUARE));
    vec![shape, circle, square]
}

/// `Main` holding the given methods.
pub(crate) fn main_class(methods: impl IntoIterator<Item = ProgramMethod>) -> ProgramClass {
    let mut main = class(MAIN, OBJECT);
    main.methods.extend(methods);
    main
}

/// An app over `classes` plus the library classes they need.
pub(crate) fn app(classes: impl IntoIterator<Item = ProgramClass>, keep_info: KeepInfo) -> AppView {
    let program: Program = [
        ProgramClass::library(known::object(), None),
        ProgramClass::library(known::string(), Some(known::object())),
    ]
    .into_iter()
    .chain(classes)
    .collect();
    let field_access = FieldAccessInfoCollection::compute(&program)
        .unwrap_or_else(|e| panic!("cannot compute field access info: {e}"));
    AppView::new(program, keep_info).with_field_access_info(field_access)
}
