//! Program model and code representations for the pare shrinker.
//!
//! # Architecture
//!
//! - **Names and types**: [`Name`] (interned string) and [`TypeRef`]
//!   (interned descriptor) are `Copy` handles into one process-wide interner.
//! - **References**: [`FieldRef`], [`MethodRef`], [`Proto`] and friends
//!   identify members structurally.
//! - **Program**: [`Program`] maps types to [`ProgramClass`] definitions whose
//!   methods carry a [`Code`] body.
//! - **Code**: bodies are either SSA IR ([`ir::IrCode`]), used while a pass
//!   analyzes or rewrites them, or LIR ([`lir::LirCode`]), the compact form
//!   they are stored in between passes.

mod flags;
mod interner;
pub mod ir;
pub mod lir;
mod name;
pub mod program;
mod reference;
mod types;
pub mod uses;

#[cfg(test)]
mod test_helpers;

pub use flags::AccessFlags;
pub use interner::{global as global_interner, InternError, StringInterner};
pub use name::Name;
pub use program::{Code, Program, ProgramClass, ProgramField, ProgramMethod};
pub use reference::{
    BootstrapArg, CallSite, FieldRef, HandleMember, MethodHandle, MethodHandleKind, MethodRef,
    MethodSignature, Proto,
};
pub use types::{known, TypeRef};
