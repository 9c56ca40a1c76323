//! Type descriptors.
//!
//! A [`TypeRef`] is an interned JVM-style descriptor: `I`, `V`, `Lpkg/Cls;`,
//! `[[Lpkg/Cls;`. Everything the passes need (array structure, primitive-ness,
//! package, base type substitution) is derived from the descriptor text.

use std::fmt;

use crate::Name;

/// Interned type descriptor.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeRef(Name);

impl TypeRef {
    /// Intern a descriptor.
    pub fn new(descriptor: &str) -> Self {
        debug_assert!(
            is_valid_descriptor(descriptor),
            "malformed type descriptor {descriptor:?}"
        );
        TypeRef(Name::intern(descriptor))
    }

    /// Type for a binary class name such as `java/lang/Object`.
    pub fn class(binary_name: &str) -> Self {
        Self::new(&format!("L{binary_name};"))
    }

    #[inline]
    pub fn name(self) -> Name {
        self.0
    }

    #[inline]
    pub fn descriptor(self) -> &'static str {
        self.0.as_str()
    }

    fn first_byte(self) -> u8 {
        self.descriptor().as_bytes().first().copied().unwrap_or(b'V')
    }

    pub fn is_void(self) -> bool {
        self.descriptor() == "V"
    }

    /// True for the eight primitive value types (not `V`).
    pub fn is_primitive(self) -> bool {
        self.descriptor().len() == 1 && !self.is_void()
    }

    /// True for `J` and `D`.
    pub fn is_wide(self) -> bool {
        matches!(self.descriptor(), "J" | "D")
    }

    pub fn is_class(self) -> bool {
        self.first_byte() == b'L'
    }

    pub fn is_array(self) -> bool {
        self.first_byte() == b'['
    }

    pub fn is_reference(self) -> bool {
        self.is_class() || self.is_array()
    }

    /// Number of leading `[`.
    pub fn array_dimensions(self) -> usize {
        self.descriptor().bytes().take_while(|&b| b == b'[').count()
    }

    /// The type with every array dimension stripped.
    pub fn base_type(self) -> TypeRef {
        let dims = self.array_dimensions();
        if dims == 0 {
            self
        } else {
            TypeRef::new(&self.descriptor()[dims..])
        }
    }

    /// The type with one array dimension stripped, if this is an array.
    pub fn element_type(self) -> Option<TypeRef> {
        self.is_array()
            .then(|| TypeRef::new(&self.descriptor()[1..]))
    }

    pub fn to_array(self) -> TypeRef {
        TypeRef::new(&format!("[{}", self.descriptor()))
    }

    /// Keep the array dimensions, swap the base type.
    pub fn replace_base_type(self, base: TypeRef) -> TypeRef {
        let dims = self.array_dimensions();
        if dims == 0 {
            return base;
        }
        let mut descriptor = "[".repeat(dims);
        descriptor.push_str(base.descriptor());
        TypeRef::new(&descriptor)
    }

    /// `java/lang/Object` for `Ljava/lang/Object;`, the descriptor otherwise.
    pub fn binary_name(self) -> &'static str {
        let d = self.descriptor();
        if self.is_class() {
            &d[1..d.len() - 1]
        } else {
            d
        }
    }

    /// Package of a class type, `java/lang` for `Ljava/lang/Object;`.
    pub fn package(self) -> &'static str {
        let binary = self.binary_name();
        binary.rfind('/').map_or("", |idx| &binary[..idx])
    }

    /// Unqualified class name, `Object` for `Ljava/lang/Object;`.
    pub fn simple_name(self) -> &'static str {
        let binary = self.binary_name();
        binary.rfind('/').map_or(binary, |idx| &binary[idx + 1..])
    }

    /// Class type whose binary name is this one's with `suffix` appended.
    pub fn with_suffix(self, suffix: &str) -> TypeRef {
        debug_assert!(self.is_class());
        TypeRef::class(&format!("{}{suffix}", self.binary_name()))
    }

    /// Rewrite the base type through `f`, keeping array structure.
    pub fn map_base(self, f: impl FnOnce(TypeRef) -> TypeRef) -> TypeRef {
        if self.is_array() {
            let base = self.base_type();
            let mapped = f(base);
            if mapped == base {
                self
            } else {
                self.replace_base_type(mapped)
            }
        } else {
            f(self)
        }
    }
}

fn is_valid_descriptor(d: &str) -> bool {
    let base = d.trim_start_matches('[');
    match base.as_bytes() {
        [b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D'] => true,
        [b'V'] => base.len() == d.len(),
        [b'L', .., b';'] => base.len() > 2,
        _ => false,
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

/// Well-known types and member names.
pub mod known {
    use std::sync::OnceLock;

    use super::TypeRef;
    use crate::Name;

    macro_rules! known_types {
        ($($(#[$meta:meta])* $fn_name:ident => $descriptor:literal;)*) => {
            $(
                $(#[$meta])*
                pub fn $fn_name() -> TypeRef {
                    static CELL: OnceLock<TypeRef> = OnceLock::new();
                    *CELL.get_or_init(|| TypeRef::new($descriptor))
                }
            )*
        };
    }

    macro_rules! known_names {
        ($($fn_name:ident => $text:literal;)*) => {
            $(
                pub fn $fn_name() -> Name {
                    static CELL: OnceLock<Name> = OnceLock::new();
                    *CELL.get_or_init(|| Name::intern($text))
                }
            )*
        };
    }

    known_types! {
        void => "V";
        boolean => "Z";
        int => "I";
        long => "J";
        int_array => "[I";
        object => "Ljava/lang/Object;";
        string => "Ljava/lang/String;";
        class => "Ljava/lang/Class;";
        /// `java.lang.Enum`, superclass of every enum.
        enum_base => "Ljava/lang/Enum;";
        objects => "Ljava/util/Objects;";
        method_handle => "Ljava/lang/invoke/MethodHandle;";
        method_type => "Ljava/lang/invoke/MethodType;";
        throwable => "Ljava/lang/Throwable;";
        null_pointer_exception => "Ljava/lang/NullPointerException;";
        illegal_argument_exception => "Ljava/lang/IllegalArgumentException;";
    }

    known_names! {
        init => "<init>";
        clinit => "<clinit>";
        ordinal => "ordinal";
        name => "name";
        to_string => "toString";
        hash_code => "hashCode";
        equals => "equals";
        compare_to => "compareTo";
        values => "values";
        value_of => "valueOf";
        values_field => "$VALUES";
        require_non_null => "requireNonNull";
    }
}
