//! Recognizing the members every enum has.

use std::collections::BTreeSet;

use pare_ir::ir::InvokeKind;
use pare_ir::{
    known, AccessFlags, MethodRef, ProgramClass, ProgramField, ProgramMethod, Proto, TypeRef,
};

/// `java.lang.Enum` methods that unboxed values still support.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EnumMethod {
    Ordinal,
    CompareTo,
    Equals,
    HashCode,
    Name,
    ToString,
}

impl EnumMethod {
    /// The supported method `method` names, judged by name and prototype.
    pub(crate) fn of(method: &MethodRef) -> Option<EnumMethod> {
        let proto = &method.proto;
        let ret = proto.return_type;
        let name = method.name;
        match proto.params.as_ref() {
            [] if name == known::ordinal() && ret == known::int() => Some(EnumMethod::Ordinal),
            [] if name == known::hash_code() && ret == known::int() => Some(EnumMethod::HashCode),
            [] if name == known::name() && ret == known::string() => Some(EnumMethod::Name),
            [] if name == known::to_string() && ret == known::string() => {
                Some(EnumMethod::ToString)
            }
            [_] if name == known::compare_to() && ret == known::int() => {
                Some(EnumMethod::CompareTo)
            }
            [p] if name == known::equals() && *p == known::object() && ret == known::boolean() => {
                Some(EnumMethod::Equals)
            }
            _ => None,
        }
    }

    /// Whether the method takes a second enum value.
    pub(crate) fn is_binary(self) -> bool {
        matches!(self, EnumMethod::CompareTo | EnumMethod::Equals)
    }
}

/// What a call on an enum receiver resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReceiverCall {
    /// An instance method the enum declares itself.
    Declared,
    Supported(EnumMethod),
    Invalid,
}

impl ReceiverCall {
    /// Classify a call of `method` on a value of the enum `class`.
    pub(crate) fn classify(
        class: Option<&ProgramClass>,
        kind: InvokeKind,
        method: &MethodRef,
    ) -> ReceiverCall {
        let Some(class) = class else {
            return ReceiverCall::Invalid;
        };
        let holder_ok = method.holder == class.ty
            || method.holder == known::enum_base()
            || method.holder == known::object();
        if !holder_ok {
            return ReceiverCall::Invalid;
        }
        if kind != InvokeKind::Super {
            // An override of `toString` moves along with the enum.
            if let Some(declared) = class.method_by_signature(method.name, &method.proto) {
                return if declared.is_static() {
                    ReceiverCall::Invalid
                } else {
                    ReceiverCall::Declared
                };
            }
        }
        EnumMethod::of(method).map_or(ReceiverCall::Invalid, ReceiverCall::Supported)
    }
}

/// A field holding one of the enum's constants.
pub(crate) fn is_constant_field(field: &ProgramField, enum_type: TypeRef) -> bool {
    field.is_static()
        && field.access.contains(AccessFlags::ENUM | AccessFlags::FINAL)
        && field.reference.ty == enum_type
}

/// The implicit `$VALUES` array.
pub(crate) fn is_values_field(field: &ProgramField, enum_type: TypeRef) -> bool {
    let reference = &field.reference;
    field.is_static()
        && field.access.contains(AccessFlags::SYNTHETIC | AccessFlags::FINAL)
        && reference.name == known::values_field()
        && reference.ty == enum_type.to_array()
}

/// `static E[] values()`.
pub(crate) fn is_values_method(method: &MethodRef, enum_type: TypeRef) -> bool {
    method.holder == enum_type
        && method.name == known::values()
        && method.proto.params.is_empty()
        && method.proto.return_type == enum_type.to_array()
}

/// `static E valueOf(String)`.
pub(crate) fn is_value_of_method(method: &MethodRef, enum_type: TypeRef) -> bool {
    method.holder == enum_type
        && method.name == known::value_of()
        && method.proto.params.as_ref() == [known::string()]
        && method.proto.return_type == enum_type
}

/// Members unboxing replaces outright, so their bodies are never analyzed.
pub(crate) fn is_replaced_method(method: &ProgramMethod, enum_type: TypeRef) -> bool {
    method.is_instance_initializer()
        || is_values_method(&method.reference, enum_type)
        || is_value_of_method(&method.reference, enum_type)
}

/// `Objects.requireNonNull(Object)` or `requireNonNull(Object, String)`.
pub(crate) fn is_require_non_null(method: &MethodRef) -> bool {
    if method.holder != known::objects()
        || method.name != known::require_non_null()
        || method.proto.return_type != known::object()
    {
        return false;
    }
    match method.proto.params.as_ref() {
        [value] => *value == known::object(),
        [value, message] => *value == known::object() && *message == known::string(),
        _ => false,
    }
}

/// Whether `proto` mentions any of `types`, directly or as an array.
pub(crate) fn proto_mentions(proto: &Proto, types: &BTreeSet<TypeRef>) -> bool {
    proto.types().any(|ty| types.contains(&ty.base_type()))
}
