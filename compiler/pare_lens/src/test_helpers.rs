//! Reference factories for lens tests.

use pare_ir::{FieldRef, MethodRef, Proto, TypeRef};

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
