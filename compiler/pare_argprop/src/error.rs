//! Errors raised while propagating arguments.

use pare_ir::lir::LirError;
use pare_ir::MethodRef;

#[derive(Debug, thiserror::Error)]
pub enum ArgPropError {
    #[error("cannot decode {method}: {source}")]
    Decode {
        method: MethodRef,
        #[source]
        source: LirError,
    },
}
