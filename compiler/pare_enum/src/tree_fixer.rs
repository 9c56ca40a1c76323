//! Final signatures once unboxed enums are `int`s.
//!
//! # Architecture
//!
//! Each unboxed enum `E` disappears. Its static fields and its methods move
//! to the local utility class of `E`; instance methods become static there,
//! taking the receiver as a leading `int`. Constructors and `values()` are
//! dropped, `valueOf` is replaced by a synthesized name match, and the
//! fixed class initializer takes over the class initializer slot.
//!
//! Every other program class keeps its members, retyped. A method whose
//! prototype mentions an unboxed enum gets `$enumunboxing$` appended to its
//! name, so it can never override, or be overridden by, a library method
//! that still takes the enum. The suffix is chosen once per original
//! signature, so overrides stay overrides. Constructors cannot be renamed;
//! colliding ones get trailing `null` parameters of the shared utility type.

use std::collections::BTreeSet;

use pare_ir::ir::{InvokeKind, IrCode};
use pare_ir::{
    known, AccessFlags, Code, FieldRef, MethodRef, MethodSignature, Name, ProgramClass,
    ProgramField, ProgramMethod, Proto, TypeRef,
};
use pare_lens::{ExtraParameter, LensBuilder, PrototypeChanges};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::code::decode;
use crate::enum_data::EnumData;
use crate::error::EnumError;
use crate::members::{is_value_of_method, is_values_method, proto_mentions};
use crate::utility::LocalUtility;

const RENAME_SUFFIX: &str = "$enumunboxing$";

/// An unboxed enum, ready to be dissolved into its local utility class.
pub(crate) struct DissolvedEnum<'a> {
    pub(crate) class: &'a ProgramClass,
    pub(crate) data: &'a EnumData,
    pub(crate) class_initializer: Option<IrCode>,
    pub(crate) local: &'a LocalUtility,
}

pub(crate) struct TreeFixer<'a> {
    enums: &'a BTreeSet<TypeRef>,
    /// Type of the trailing `null` parameters of padded constructors.
    padding_type: TypeRef,
    builder: &'a mut LensBuilder,
    /// Every method signature of the program, renamed ones included.
    taken: FxHashSet<MethodSignature>,
    /// Original signature to the name it was renamed to.
    renames: FxHashMap<MethodSignature, Name>,
}

impl<'a> TreeFixer<'a> {
    pub(crate) fn new<'p>(
        program_classes: impl Iterator<Item = &'p ProgramClass>,
        enums: &'a BTreeSet<TypeRef>,
        padding_type: TypeRef,
        builder: &'a mut LensBuilder,
    ) -> Self {
        let taken = program_classes
            .flat_map(|c| c.methods.iter().map(|m| m.reference.signature()))
            .collect();
        TreeFixer {
            enums,
            padding_type,
            builder,
            taken,
            renames: FxHashMap::default(),
        }
    }

    pub(crate) fn map_type(&self, ty: TypeRef) -> TypeRef {
        map_type(self.enums, ty)
    }

    fn map_proto(&self, proto: &Proto) -> Proto {
        proto.map_types(|ty| self.map_type(ty))
    }

    // ── Unboxed enums ───────────────────────────────────────────

    /// The local utility class of `dissolved`, with the synthesized methods.
    pub(crate) fn dissolve(
        &mut self,
        dissolved: DissolvedEnum<'_>,
    ) -> Result<(ProgramClass, Vec<MethodRef>), EnumError> {
        let DissolvedEnum {
            class: enum_class,
            data,
            class_initializer,
            local,
        } = dissolved;
        let enum_type = enum_class.ty;
        self.builder.move_type(enum_type, known::int());

        let mut class = local.empty_class();
        let mut synthesized = Vec::new();
        let mut add_synthesized = |class: &mut ProgramClass, method: ProgramMethod| {
            synthesized.push(method.reference.clone());
            class.methods.push(method);
        };

        add_synthesized(&mut class, local.build_name_method(data)?);
        for &field in data.instance_fields() {
            let ty = self.map_type(field.ty);
            add_synthesized(&mut class, local.build_getter(data, field, ty)?);
        }

        for field in enum_class.static_fields() {
            let reference = FieldRef::new(
                local.ty(),
                field.reference.name,
                self.map_type(field.reference.ty),
            );
            self.builder.move_field(field.reference, reference);
            class.fields.push(ProgramField {
                reference,
                access: (field.access - (AccessFlags::PRIVATE | AccessFlags::PROTECTED | AccessFlags::ENUM))
                    | AccessFlags::PUBLIC,
                ..field.clone()
            });
        }

        if let Some(code) = class_initializer {
            let reference = MethodRef::new(local.ty(), known::clinit(), Proto::void());
            if let Some(original) = enum_class.class_initializer() {
                self.builder
                    .move_method(original.reference.clone(), reference.clone());
                class.methods.push(ProgramMethod {
                    reference,
                    code: Some(code.into()),
                    ..original.clone()
                });
            }
        }

        let mut local_taken: FxHashSet<MethodSignature> =
            class.methods.iter().map(|m| m.reference.signature()).collect();
        for method in &enum_class.methods {
            let original = &method.reference;
            if method.is_instance_initializer()
                || method.is_class_initializer()
                || is_values_method(original, enum_type)
            {
                continue;
            }
            if is_value_of_method(original, enum_type) {
                let value_of = local.build_value_of(data)?;
                local_taken.insert(value_of.reference.signature());
                self.builder
                    .move_method(original.clone(), value_of.reference.clone());
                add_synthesized(&mut class, value_of);
                continue;
            }

            let (name, proto) = if method.is_static() {
                (original.name, self.map_proto(&original.proto))
            } else {
                (
                    Name::intern(&format!("_{}", original.name)),
                    self.map_proto(&original.proto.prepend_param(enum_type)),
                )
            };
            let name = if local_taken.contains(&MethodSignature {
                name,
                proto: proto.clone(),
            }) {
                fresh_name(name, |n| {
                    !local_taken.contains(&MethodSignature {
                        name: n,
                        proto: proto.clone(),
                    })
                })
            } else {
                name
            };
            let reference = MethodRef::new(local.ty(), name, proto);
            local_taken.insert(reference.signature());

            self.builder.move_method(original.clone(), reference.clone());
            if !method.is_static() {
                self.builder
                    .record_invoke_kind(reference.clone(), InvokeKind::Static);
            }
            // Bodies keep the receiver as an argument; decode them while
            // the original signature is at hand.
            let code = decode(method)?.map(Code::from);
            tracing::trace!(from = %original, to = %reference, "moved enum method");
            class.methods.push(ProgramMethod {
                reference,
                access: (method.access
                    - (AccessFlags::PRIVATE
                        | AccessFlags::PROTECTED
                        | AccessFlags::FINAL
                        | AccessFlags::ABSTRACT))
                    | AccessFlags::PUBLIC
                    | AccessFlags::STATIC,
                code,
                info: method.info.clone(),
            });
        }
        Ok((class, synthesized))
    }

    // ── Other classes ───────────────────────────────────────────

    /// `class` with every mention of an unboxed enum in its member
    /// signatures replaced.
    pub(crate) fn fix_class(&mut self, class: &ProgramClass) -> ProgramClass {
        let fields = class
            .fields
            .iter()
            .map(|field| {
                let reference = field.reference.with_type(self.map_type(field.reference.ty));
                if reference != field.reference {
                    self.builder.move_field(field.reference, reference);
                }
                ProgramField {
                    reference,
                    ..field.clone()
                }
            })
            .collect();

        let mut constructors: FxHashSet<Proto> = class
            .instance_initializers()
            .filter(|m| !proto_mentions(&m.reference.proto, self.enums))
            .map(|m| m.reference.proto.clone())
            .collect();
        let methods = class
            .methods
            .iter()
            .map(|method| {
                if !proto_mentions(&method.reference.proto, self.enums) {
                    return method.clone();
                }
                let reference = if method.is_instance_initializer() {
                    self.pad_constructor(&method.reference, &mut constructors)
                } else {
                    let proto = self.map_proto(&method.reference.proto);
                    let name = self.renamed(method.reference.signature(), &proto);
                    MethodRef::new(class.ty, name, proto)
                };
                self.builder
                    .move_method(method.reference.clone(), reference.clone());
                tracing::trace!(from = %method.reference, to = %reference, "retyped method");
                ProgramMethod {
                    reference,
                    ..method.clone()
                }
            })
            .collect();

        ProgramClass {
            fields,
            methods,
            ..class.clone()
        }
    }

    fn pad_constructor(&mut self, original: &MethodRef, taken: &mut FxHashSet<Proto>) -> MethodRef {
        let mut proto = self.map_proto(&original.proto);
        let mut changes = PrototypeChanges::none();
        while taken.contains(&proto) {
            proto = proto.append_params([self.padding_type]);
            changes = changes.with_extra_parameter(ExtraParameter::UnusedNull(self.padding_type));
        }
        taken.insert(proto.clone());
        let reference = original.with_proto(proto);
        self.builder
            .record_prototype_changes(reference.clone(), changes);
        reference
    }

    /// The new name of every method with signature `original`, whose
    /// prototype becomes `proto`.
    fn renamed(&mut self, original: MethodSignature, proto: &Proto) -> Name {
        if let Some(&name) = self.renames.get(&original) {
            return name;
        }
        let suffixed = Name::intern(&format!("{}{RENAME_SUFFIX}", original.name));
        let is_free = |name: Name| {
            !self.taken.contains(&MethodSignature {
                name,
                proto: proto.clone(),
            })
        };
        let name = if is_free(suffixed) {
            suffixed
        } else {
            fresh_name(suffixed, is_free)
        };
        self.taken.insert(MethodSignature {
            name,
            proto: proto.clone(),
        });
        self.renames.insert(original, name);
        name
    }
}

/// `ty` with an unboxed enum base type replaced by `int`.
pub(crate) fn map_type(enums: &BTreeSet<TypeRef>, ty: TypeRef) -> TypeRef {
    ty.map_base(|base| {
        if enums.contains(&base) {
            known::int()
        } else {
            base
        }
    })
}

/// The first `name$N` that is free.
fn fresh_name(name: Name, is_free: impl Fn(Name) -> bool) -> Name {
    (1u32..)
        .map(|i| Name::intern(&format!("{name}${i}")))
        .find(|&candidate| is_free(candidate))
        .unwrap_or(name)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
