//! Enum unboxing.
//!
//! # Architecture
//!
//! Enums whose instances never escape into untyped contexts are replaced by
//! `int`s: constant `E.X` with ordinal `n` becomes `n + 1`, and `null`
//! becomes `0`.
//!
//! 1. **Instance initializers** ([`analyze_instance_initializers`]) record,
//!    per constructor, which instance fields are set from which argument.
//!    Must run once before the unboxer.
//! 2. **Candidates** are the program enums that are not kept, have no
//!    subtypes and a small enough number of instance fields.
//! 3. **Use sites** of every candidate are scanned in every method body;
//!    a use the rewriter cannot express rejects the enum.
//! 4. **Class initializers** of the remaining enums are evaluated
//!    symbolically to learn the ordinal, name and read instance field
//!    values of each constant. Instance creation is removed.
//! 5. **Tree fixing** dissolves each enum into a local utility class and
//!    retypes every signature mentioning it. Helpers shared by all enums
//!    (`ordinal`, `compareTo`, `values`, ...) live in one shared utility
//!    class.
//!
//! The run yields a new program and one lens layer. Method bodies still
//! mention the enums until [`UnboxingResult::rewrite_code`] runs, which
//! rewrites enum operations into `int` operations before applying the lens.
//!
//! Every candidate that is not unboxed is listed in the
//! [`UnboxingReport`] with all reasons found.

mod candidates;
mod class_initializers;
mod code;
mod enum_data;
mod error;
mod initializers;
mod members;
mod report;
mod rewriter;
mod tree_fixer;
mod unboxer;
mod use_sites;
mod utility;

#[cfg(test)]
mod test_helpers;

pub use enum_data::{unboxed_value, EnumConstant, EnumData, EnumDataMap};
pub use error::EnumError;
pub use initializers::analyze_instance_initializers;
pub use report::{Reason, UnboxingReport};
pub use unboxer::{EnumUnboxer, UnboxerOptions, UnboxingResult};

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
