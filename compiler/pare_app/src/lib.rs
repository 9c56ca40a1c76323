//! Application-wide state shared by the whole-program passes.
//!
//! # Architecture
//!
//! Passes never mutate the program in place. Each one reads an [`AppView`],
//! produces a new [`Program`](pare_ir::Program) plus a lens layer, and
//! commits in three steps:
//!
//! 1. [`AppView::rewritten_with_lens`] installs the program and the new lens
//!    and carries keep info and field access info over to the new names;
//! 2. [`MethodProcessor::rewrite_code`] rewrites every body from the code
//!    lens to the new lens;
//! 3. [`AppView::with_cleared_code_rewriting`] installs the rewritten program
//!    and marks the lens as the new code lens.

mod app_view;
mod error;
mod field_access;
mod hierarchy;
mod keep_info;
mod lir_rewriter;
mod processor;
mod rewriter;

#[cfg(test)]
mod test_helpers;

pub use app_view::AppView;
pub use error::RewriteError;
pub use field_access::{FieldAccessInfo, FieldAccessInfoCollection, FieldAccessInfoModifier};
pub use hierarchy::ClassHierarchy;
pub use keep_info::KeepInfo;
pub use lir_rewriter::{LirLensCodeRewriter, LirRewrite};
pub use processor::{MethodProcessor, RewriteStats};
pub use rewriter::LensCodeRewriter;
