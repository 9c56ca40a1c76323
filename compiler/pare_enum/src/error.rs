//! Errors raised while unboxing enums.

use pare_app::RewriteError;
use pare_ir::ir::IrError;
use pare_ir::lir::LirError;
use pare_ir::MethodRef;
use pare_lens::LensError;

#[derive(Debug, thiserror::Error)]
pub enum EnumError {
    #[error("cannot decode {method}: {source}")]
    Decode {
        method: MethodRef,
        #[source]
        source: LirError,
    },
    #[error("cannot encode {method}: {source}")]
    Encode {
        method: MethodRef,
        #[source]
        source: LirError,
    },
    /// A utility method came out malformed.
    #[error("cannot synthesize {method}: {source}")]
    Synthesize {
        method: MethodRef,
        #[source]
        source: IrError,
    },
    #[error(transparent)]
    Lens(#[from] LensError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}
