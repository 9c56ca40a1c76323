//! Errors raised by the horizontal class merger.

use pare_ir::ir::IrError;
use pare_ir::lir::LirError;
use pare_ir::MethodRef;
use pare_lens::LensError;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A policy could not scan a method body.
    #[error("cannot scan program code: {0}")]
    Scan(#[source] LirError),
    /// A synthesized constructor came out malformed.
    #[error("cannot synthesize {method}: {source}")]
    Synthesize {
        method: MethodRef,
        #[source]
        source: IrError,
    },
    #[error(transparent)]
    Lens(#[from] LensError),
}
