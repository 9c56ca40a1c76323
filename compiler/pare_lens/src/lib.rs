//! Graph lenses: the composable rewrite history of a compilation.
//!
//! Every whole-program pass that renames, merges or re-types program
//! entities records what it did into a [`LensBuilder`] and pushes the built
//! layer onto the current [`GraphLens`]. Later passes use the chain to
//! rewrite code written against older names, and diagnostics use it to map
//! current names back to the original program.

mod builder;
mod changes;
mod lens;
mod lookup;

#[cfg(test)]
mod test_helpers;

pub use builder::{LensBuilder, LensError};
pub use changes::{ArgumentChange, ExtraParameter, PrototypeChanges, RewrittenReturn};
pub use lens::{GraphLens, LensKind, LensNode, NestedLens};
pub use lookup::{FieldLookupResult, MethodLookupResult};
