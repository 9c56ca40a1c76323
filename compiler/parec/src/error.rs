//! Errors that abort a pipeline run.

use std::fmt;

use pare_app::RewriteError;
use pare_argprop::ArgPropError;
use pare_enum::EnumError;
use pare_merge::MergeError;

/// A pass of the pipeline that installs a lens layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    HorizontalClassMerging,
    EnumUnboxing,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pass::HorizontalClassMerging => "horizontal class merging",
            Pass::EnumUnboxing => "enum unboxing",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cannot start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Normalizing or rewriting a body failed.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error("horizontal class merging failed: {0}")]
    Merge(#[from] MergeError),
    #[error("enum unboxing failed: {0}")]
    Enum(#[from] EnumError),
    #[error("argument propagation failed: {0}")]
    ArgumentPropagation(#[from] ArgPropError),
    /// `current` no longer leads back to `original` through the lens chain.
    #[error("after {pass}, {current} (renamed from {original}) maps back to {found}")]
    LensVerification {
        pass: Pass,
        original: String,
        current: String,
        found: String,
    },
}
