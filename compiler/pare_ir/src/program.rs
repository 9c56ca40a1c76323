//! The whole-program model: classes, fields, methods and their code.
//!
//! A [`Program`] is an ordered map from type to class definition. Classes are
//! shared behind `Arc` so passes can produce a new program that reuses every
//! class they did not touch.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ir::IrCode;
use crate::lir::LirCode;
use crate::types::known;
use crate::{AccessFlags, FieldRef, MethodRef, Name, Proto, TypeRef};

// ── Code ────────────────────────────────────────────────────────────

/// A method body, either in SSA form or in the compact encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Code {
    Ir(Arc<IrCode>),
    Lir(Arc<LirCode>),
}

impl Code {
    pub fn is_lir(&self) -> bool {
        matches!(self, Code::Lir(_))
    }
}

impl From<IrCode> for Code {
    fn from(code: IrCode) -> Self {
        Code::Ir(Arc::new(code))
    }
}

impl From<LirCode> for Code {
    fn from(code: LirCode) -> Self {
        Code::Lir(Arc::new(code))
    }
}

// ── Method info ─────────────────────────────────────────────────────

/// Where an instance initializer gets a value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitializerValue {
    /// The initializer's argument at this index (receiver is 0).
    Argument(u32),
    ConstantInt(i64),
    ConstantString(Name),
    Null,
}

/// What an enum instance initializer does with its arguments.
///
/// `ordinal` and `name` describe the values forwarded to the `Enum`
/// super-initializer; `field_writes` the instance fields assigned on the
/// receiver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceInitializerInfo {
    pub ordinal: Option<InitializerValue>,
    pub name: Option<InitializerValue>,
    pub field_writes: BTreeMap<FieldRef, InitializerValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodInfo {
    /// Body must be inlined into every caller before output.
    pub force_inline: bool,
    pub instance_initializer: Option<InstanceInitializerInfo>,
}

// ── Definitions ─────────────────────────────────────────────────────

/// Compile-time value of a static field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticValue {
    Int(i64),
    String(Name),
    Null,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgramField {
    pub reference: FieldRef,
    pub access: AccessFlags,
    pub static_value: Option<StaticValue>,
}

impl ProgramField {
    pub fn new(reference: FieldRef, access: AccessFlags) -> Self {
        ProgramField {
            reference,
            access,
            static_value: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn is_volatile(&self) -> bool {
        self.access.is_volatile()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgramMethod {
    pub reference: MethodRef,
    pub access: AccessFlags,
    pub code: Option<Code>,
    pub info: MethodInfo,
}

impl ProgramMethod {
    pub fn new(reference: MethodRef, access: AccessFlags, code: Option<Code>) -> Self {
        ProgramMethod {
            reference,
            access,
            code,
            info: MethodInfo::default(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn is_private(&self) -> bool {
        self.access.is_private()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    pub fn is_instance_initializer(&self) -> bool {
        self.reference.is_instance_initializer()
    }

    pub fn is_class_initializer(&self) -> bool {
        self.reference.is_class_initializer()
    }

    /// Static, private, or an initializer: never dispatched virtually.
    pub fn is_direct(&self) -> bool {
        self.is_static()
            || self.is_private()
            || self.is_instance_initializer()
            || self.is_class_initializer()
    }

    pub fn is_virtual(&self) -> bool {
        !self.is_direct()
    }

    pub fn argument_types(&self) -> Vec<TypeRef> {
        self.reference.argument_types(self.is_static())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// Part of the input being optimized.
    Program,
    /// Platform class visible to the program but never rewritten.
    Library,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgramClass {
    pub ty: TypeRef,
    pub kind: ClassKind,
    pub access: AccessFlags,
    pub superclass: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    /// Annotation types applied to the class.
    pub annotations: Vec<TypeRef>,
    pub fields: Vec<ProgramField>,
    pub methods: Vec<ProgramMethod>,
}

impl ProgramClass {
    /// An empty public program class.
    pub fn new(ty: TypeRef, superclass: Option<TypeRef>) -> Self {
        ProgramClass {
            ty,
            kind: ClassKind::Program,
            access: AccessFlags::PUBLIC,
            superclass,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// An empty public library class.
    pub fn library(ty: TypeRef, superclass: Option<TypeRef>) -> Self {
        ProgramClass {
            kind: ClassKind::Library,
            ..Self::new(ty, superclass)
        }
    }

    pub fn is_program(&self) -> bool {
        self.kind == ClassKind::Program
    }

    pub fn is_library(&self) -> bool {
        self.kind == ClassKind::Library
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    pub fn is_annotation(&self) -> bool {
        self.access.contains(AccessFlags::ANNOTATION)
    }

    /// A direct subclass of `java.lang.Enum` flagged as an enum.
    pub fn is_enum(&self) -> bool {
        self.access.contains(AccessFlags::ENUM) && self.superclass == Some(known::enum_base())
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &ProgramField> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &ProgramField> {
        self.fields.iter().filter(|f| f.is_static())
    }

    pub fn field(&self, reference: &FieldRef) -> Option<&ProgramField> {
        self.fields.iter().find(|f| f.reference == *reference)
    }

    pub fn method(&self, reference: &MethodRef) -> Option<&ProgramMethod> {
        self.methods.iter().find(|m| m.reference == *reference)
    }

    pub fn method_by_signature(&self, name: Name, proto: &Proto) -> Option<&ProgramMethod> {
        self.methods
            .iter()
            .find(|m| m.reference.name == name && m.reference.proto == *proto)
    }

    pub fn class_initializer(&self) -> Option<&ProgramMethod> {
        self.methods.iter().find(|m| m.is_class_initializer())
    }

    pub fn instance_initializers(&self) -> impl Iterator<Item = &ProgramMethod> {
        self.methods.iter().filter(|m| m.is_instance_initializer())
    }

    pub fn direct_methods(&self) -> impl Iterator<Item = &ProgramMethod> {
        self.methods.iter().filter(|m| m.is_direct())
    }

    pub fn virtual_methods(&self) -> impl Iterator<Item = &ProgramMethod> {
        self.methods.iter().filter(|m| m.is_virtual())
    }

    /// `superclass` followed by `interfaces`.
    pub fn supertypes(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.superclass.iter().copied().chain(self.interfaces.iter().copied())
    }
}

// ── Program ─────────────────────────────────────────────────────────

/// All classes visible to the optimizer, keyed and ordered by type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    classes: BTreeMap<TypeRef, Arc<ProgramClass>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a class definition.
    pub fn insert(&mut self, class: impl Into<Arc<ProgramClass>>) {
        let class = class.into();
        self.classes.insert(class.ty, class);
    }

    pub fn remove(&mut self, ty: TypeRef) -> Option<Arc<ProgramClass>> {
        self.classes.remove(&ty)
    }

    pub fn class(&self, ty: TypeRef) -> Option<&Arc<ProgramClass>> {
        self.classes.get(&ty)
    }

    pub fn contains(&self, ty: TypeRef) -> bool {
        self.classes.contains_key(&ty)
    }

    /// Every class, in type order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ProgramClass>> {
        self.classes.values()
    }

    /// Program (non-library) classes, in type order.
    pub fn program_classes(&self) -> impl Iterator<Item = &Arc<ProgramClass>> {
        self.classes.values().filter(|c| c.is_program())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn method(&self, reference: &MethodRef) -> Option<&ProgramMethod> {
        self.class(reference.holder)?.method(reference)
    }

    pub fn field(&self, reference: &FieldRef) -> Option<&ProgramField> {
        self.class(reference.holder)?.field(reference)
    }
}

impl FromIterator<ProgramClass> for Program {
    fn from_iter<T: IntoIterator<Item = ProgramClass>>(iter: T) -> Self {
        let mut program = Program::new();
        for class in iter {
            program.insert(class);
        }
        program
    }
}

impl FromIterator<Arc<ProgramClass>> for Program {
    fn from_iter<T: IntoIterator<Item = Arc<ProgramClass>>>(iter: T) -> Self {
        let mut program = Program::new();
        for class in iter {
            program.insert(class);
        }
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_class() -> ProgramClass {
        let ty = TypeRef::new("Lp/A;");
        let mut class = ProgramClass::new(ty, Some(known::object()));
        class.fields.push(ProgramField::new(
            FieldRef::new(ty, "x", known::int()),
            AccessFlags::PRIVATE,
        ));
        class.fields.push(ProgramField::new(
            FieldRef::new(ty, "COUNT", known::int()),
            AccessFlags::STATIC,
        ));
        class.methods.push(ProgramMethod::new(
            MethodRef::new(ty, known::init(), Proto::void()),
            AccessFlags::PUBLIC,
            None,
        ));
        class.methods.push(ProgramMethod::new(
            MethodRef::new(ty, "run", Proto::void()),
            AccessFlags::PUBLIC,
            None,
        ));
        class
    }

    #[test]
    fn test_member_partitions() {
        let class = sample_class();
        assert_eq!(class.instance_fields().count(), 1);
        assert_eq!(class.static_fields().count(), 1);
        assert_eq!(class.direct_methods().count(), 1);
        assert_eq!(class.virtual_methods().count(), 1);
        assert_eq!(class.instance_initializers().count(), 1);
        assert!(class.class_initializer().is_none());
    }

    #[test]
    fn test_program_lookup() {
        let program: Program = [sample_class()].into_iter().collect();
        let run = MethodRef::new(TypeRef::new("Lp/A;"), "run", Proto::void());
        assert!(program.method(&run).is_some());
        assert!(program.method(&run.with_name(Name::intern("walk"))).is_none());
        assert_eq!(program.program_classes().count(), 1);
    }

    #[test]
    fn test_is_enum_requires_enum_superclass() {
        let mut class = ProgramClass::new(TypeRef::new("Lp/E;"), Some(known::enum_base()));
        assert!(!class.is_enum());
        class.access |= AccessFlags::ENUM;
        assert!(class.is_enum());
    }
}
