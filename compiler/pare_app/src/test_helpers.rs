//! Program factories for pare_app tests.

use pare_ir::ir::IrBuilder;
use pare_ir::{known, AccessFlags, FieldRef, MethodRef, ProgramClass, ProgramMethod, Proto, TypeRef};

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

pub(crate) fn object_class() -> ProgramClass {
    ProgramClass::library(known::object(), None)
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
