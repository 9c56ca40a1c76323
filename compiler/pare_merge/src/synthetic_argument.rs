//! The class whose `null` disambiguates colliding constructors.

use pare_ir::{known, AccessFlags, Program, ProgramClass, TypeRef};

const SUFFIX: &str = "$$MergedConstructorArgument";

/// One per merger run, named after the smallest target type so the name
/// only depends on the input program. Added to the program only if some
/// signature used it.
pub(crate) struct SyntheticArgumentClass {
    ty: TypeRef,
    used: bool,
}

impl SyntheticArgumentClass {
    pub(crate) fn new(program: &Program, smallest_target: TypeRef) -> Self {
        let mut ty = smallest_target.with_suffix(SUFFIX);
        let mut counter = 1;
        while program.contains(ty) {
            ty = smallest_target.with_suffix(&format!("{SUFFIX}{counter}"));
            counter += 1;
        }
        SyntheticArgumentClass { ty, used: false }
    }

    /// The type, marking the class as needed.
    pub(crate) fn use_type(&mut self) -> TypeRef {
        self.used = true;
        self.ty
    }

    pub(crate) fn into_class(self) -> Option<ProgramClass> {
        self.used.then(|| {
            let mut class = ProgramClass::new(self.ty, Some(known::object()));
            class.access = AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC;
            class
        })
    }
}
