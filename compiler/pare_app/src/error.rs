//! Errors raised while rewriting program code.

use pare_ir::lir::LirError;
use pare_ir::MethodRef;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// A body could not be decoded or encoded.
    #[error("cannot rewrite {method}: {source}")]
    Lir {
        method: MethodRef,
        #[source]
        source: LirError,
    },
    /// Field access info could not be collected.
    #[error("cannot scan program code: {0}")]
    Scan(#[source] LirError),
}

impl RewriteError {
    pub fn lir(method: &MethodRef, source: LirError) -> Self {
        RewriteError::Lir {
            method: method.clone(),
            source,
        }
    }
}
