//! Horizontal class merging.
//!
//! # Architecture
//!
//! Classes with the same shape are fused into one target class:
//!
//! 1. **Discovery** groups program classes by superclass, interface-ness
//!    and abstractness.
//! 2. **Policies** ([`policies`]) evict classes and split groups until every
//!    group can be merged safely; groups left with one class are dropped.
//! 3. **Field merging** assigns every instance field of every source class
//!    to a field of the target, widening types where needed.
//! 4. **Constructor merging** moves constructor bodies into helpers behind
//!    one dispatching constructor per prototype when the merged class needs
//!    a class id.
//! 5. **Tree fixing** gives every remaining member of every class its final
//!    signature and records all renames into the lens builder.
//!
//! The result is a new [`Program`](pare_ir::Program) and one lens layer;
//! method bodies are rewritten afterwards by the caller, through
//! [`MethodProcessor`](pare_app::MethodProcessor).

mod constructors;
mod error;
mod fields;
mod group;
mod merger;
pub mod policies;
mod report;
mod synthetic_argument;
mod tree_fixer;

#[cfg(test)]
mod test_helpers;

pub use error::MergeError;
pub use group::{MergeGroup, TypeMap};
pub use merger::{HorizontalClassMerger, MergeResult, MergerOptions};
pub use report::MergeReport;

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
