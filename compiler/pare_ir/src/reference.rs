//! Member references: prototypes, fields, methods, method handles and call sites.
//!
//! All references are value types ordered and hashed structurally, so they
//! can key both the `FxHashMap`s of the lens layers and the `BTreeMap`s that
//! give the passes a deterministic iteration order.

use std::fmt;
use std::sync::Arc;

use crate::types::known;
use crate::{Name, TypeRef};

// ── Prototypes ──────────────────────────────────────────────────────

/// A method prototype: parameter types and return type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Proto {
    pub return_type: TypeRef,
    pub params: Arc<[TypeRef]>,
}

impl Proto {
    pub fn new(return_type: TypeRef, params: impl Into<Arc<[TypeRef]>>) -> Self {
        Proto {
            return_type,
            params: params.into(),
        }
    }

    /// `()V`.
    pub fn void() -> Self {
        Self::new(known::void(), Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn with_params(&self, params: impl Into<Arc<[TypeRef]>>) -> Self {
        Self::new(self.return_type, params)
    }

    pub fn with_return_type(&self, return_type: TypeRef) -> Self {
        Proto {
            return_type,
            params: Arc::clone(&self.params),
        }
    }

    /// Prototype with `ty` inserted as the first parameter.
    pub fn prepend_param(&self, ty: TypeRef) -> Self {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        params.push(ty);
        params.extend_from_slice(&self.params);
        self.with_params(params)
    }

    /// Prototype with `extra` appended after the existing parameters.
    pub fn append_params(&self, extra: impl IntoIterator<Item = TypeRef>) -> Self {
        let mut params = self.params.to_vec();
        params.extend(extra);
        self.with_params(params)
    }

    /// Rewrite every type (return and parameters) through `f`.
    pub fn map_types(&self, mut f: impl FnMut(TypeRef) -> TypeRef) -> Self {
        let return_type = f(self.return_type);
        let mut changed = return_type != self.return_type;
        let params: Vec<TypeRef> = self
            .params
            .iter()
            .map(|&p| {
                let mapped = f(p);
                changed |= mapped != p;
                mapped
            })
            .collect();
        if changed {
            Proto::new(return_type, params)
        } else {
            self.clone()
        }
    }

    /// Return type followed by parameter types.
    pub fn types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        std::iter::once(self.return_type).chain(self.params.iter().copied())
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in self.params.iter() {
            f.write_str(p.descriptor())?;
        }
        write!(f, "){}", self.return_type)
    }
}

impl fmt::Debug for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Fields and methods ──────────────────────────────────────────────

/// Reference to a field: holder, name and type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub holder: TypeRef,
    pub name: Name,
    pub ty: TypeRef,
}

impl FieldRef {
    pub fn new(holder: TypeRef, name: impl Into<Name>, ty: TypeRef) -> Self {
        FieldRef {
            holder,
            name: name.into(),
            ty,
        }
    }

    #[must_use]
    pub fn with_holder(self, holder: TypeRef) -> Self {
        FieldRef { holder, ..self }
    }

    #[must_use]
    pub fn with_name(self, name: Name) -> Self {
        FieldRef { name, ..self }
    }

    #[must_use]
    pub fn with_type(self, ty: TypeRef) -> Self {
        FieldRef { ty, ..self }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.holder, self.name, self.ty)
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Name and prototype of a method, without its holder.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    pub name: Name,
    pub proto: Proto,
}

impl fmt::Debug for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.proto)
    }
}

/// Reference to a method: holder, name and prototype.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    pub holder: TypeRef,
    pub name: Name,
    pub proto: Proto,
}

impl MethodRef {
    pub fn new(holder: TypeRef, name: impl Into<Name>, proto: Proto) -> Self {
        MethodRef {
            holder,
            name: name.into(),
            proto,
        }
    }

    pub fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name,
            proto: self.proto.clone(),
        }
    }

    pub fn is_instance_initializer(&self) -> bool {
        self.name == known::init()
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == known::clinit()
    }

    #[must_use]
    pub fn with_holder(&self, holder: TypeRef) -> Self {
        MethodRef {
            holder,
            name: self.name,
            proto: self.proto.clone(),
        }
    }

    #[must_use]
    pub fn with_name(&self, name: Name) -> Self {
        MethodRef {
            holder: self.holder,
            name,
            proto: self.proto.clone(),
        }
    }

    #[must_use]
    pub fn with_proto(&self, proto: Proto) -> Self {
        MethodRef {
            holder: self.holder,
            name: self.name,
            proto,
        }
    }

    /// Argument types as seen by the code: receiver first unless static.
    pub fn argument_types(&self, is_static: bool) -> Vec<TypeRef> {
        let mut args = Vec::with_capacity(self.proto.arity() + 1);
        if !is_static {
            args.push(self.holder);
        }
        args.extend_from_slice(&self.proto.params);
        args
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.holder, self.name, self.proto)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ── Method handles and call sites ───────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodHandleKind {
    StaticGet,
    StaticPut,
    InstanceGet,
    InstancePut,
    InvokeStatic,
    InvokeVirtual,
    InvokeDirect,
    InvokeInterface,
    InvokeConstructor,
}

impl MethodHandleKind {
    pub fn is_field_handle(self) -> bool {
        matches!(
            self,
            Self::StaticGet | Self::StaticPut | Self::InstanceGet | Self::InstancePut
        )
    }
}

/// Member a method handle points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleMember {
    Field(FieldRef),
    Method(MethodRef),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodHandle {
    pub kind: MethodHandleKind,
    pub member: HandleMember,
    pub is_interface: bool,
}

/// A static bootstrap argument of a call site.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BootstrapArg {
    Int(i64),
    String(Name),
    Type(TypeRef),
    Proto(Proto),
    Handle(MethodHandle),
}

/// An `invokedynamic` call site.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite {
    pub method_name: Name,
    pub proto: Proto,
    pub bootstrap: MethodHandle,
    pub bootstrap_args: Vec<BootstrapArg>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_proto_display() {
        let proto = Proto::new(
            known::void(),
            vec![known::int(), TypeRef::new("Lp/A;")],
        );
        assert_eq!(proto.to_string(), "(ILp/A;)V");
    }

    #[test]
    fn test_proto_edits() {
        let proto = Proto::new(known::int(), vec![known::object()]);
        assert_eq!(proto.prepend_param(known::int()).to_string(), "(ILjava/lang/Object;)I");
        assert_eq!(
            proto.append_params([known::boolean()]).to_string(),
            "(Ljava/lang/Object;Z)I"
        );
        let mapped = proto.map_types(|t| if t == known::object() { known::string() } else { t });
        assert_eq!(mapped.to_string(), "(Ljava/lang/String;)I");
    }

    #[test]
    fn test_method_ref_display_and_args() {
        let holder = TypeRef::new("Lp/A;");
        let m = MethodRef::new(holder, "run", Proto::new(known::void(), vec![known::int()]));
        assert_eq!(m.to_string(), "Lp/A;->run(I)V");
        assert_eq!(m.argument_types(false), vec![holder, known::int()]);
        assert_eq!(m.argument_types(true), vec![known::int()]);
        assert!(!m.is_instance_initializer());
    }

    #[test]
    fn test_field_ref_ordering_is_structural() {
        let a = FieldRef::new(TypeRef::new("Lp/A;"), "x", known::int());
        let b = FieldRef::new(TypeRef::new("Lp/B;"), "a", known::int());
        assert!(a < b);
        assert_eq!(a.to_string(), "Lp/A;->x:I");
    }
}
