//! Access flags for classes, fields and methods.

use bitflags::bitflags;

bitflags! {
    /// JVM-style access flags shared by classes, fields and methods.
    ///
    /// Not every flag is meaningful on every kind of definition; passes
    /// only consult the flags relevant to what they are looking at.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct AccessFlags: u32 {
        // === Visibility ===
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        const PROTECTED = 1 << 2;

        // === Member flags ===
        const STATIC = 1 << 3;
        const FINAL = 1 << 4;
        const SYNCHRONIZED = 1 << 5;
        /// `volatile` on fields, `bridge` on methods.
        const VOLATILE = 1 << 6;
        const BRIDGE = 1 << 6;
        /// `transient` on fields, `varargs` on methods.
        const TRANSIENT = 1 << 7;
        const VARARGS = 1 << 7;
        const NATIVE = 1 << 8;
        const ABSTRACT = 1 << 10;

        // === Class kinds ===
        const INTERFACE = 1 << 9;
        const ANNOTATION = 1 << 13;
        const ENUM = 1 << 14;

        /// Compiler-generated; not present in source.
        const SYNTHETIC = 1 << 12;
        /// Marks instance and class initializers.
        const CONSTRUCTOR = 1 << 16;
    }
}

impl AccessFlags {
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_volatile(self) -> bool {
        self.contains(Self::VOLATILE)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    /// Replace the visibility bits with `PUBLIC`.
    #[must_use]
    pub fn promote_to_public(self) -> Self {
        (self - (Self::PRIVATE | Self::PROTECTED)) | Self::PUBLIC
    }
}
