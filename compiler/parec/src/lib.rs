//! The pare pipeline driver.
//!
//! # Architecture
//!
//! ```text
//! Program + KeepInfo
//!     │
//!     ▼
//! normalize ──► every body encoded as LIR, field access info collected
//!     │
//!     ▼
//! horizontal class merging ──► lens layer, bodies rewritten, cleared
//!     │
//!     ▼
//! enum unboxing ──► lens layer, bodies rewritten, cleared
//!     │
//!     ▼
//! argument propagation ──► parameter and field states
//! ```
//!
//! [`Pipeline::run`] executes the whole sequence on one worker pool and
//! returns a [`CompilationResult`]. Passes can be switched off through
//! [`Options`].

use std::sync::Once;

mod error;
mod options;
mod pipeline;
mod verify;

#[cfg(test)]
mod test_helpers;

pub use error::{Pass, PipelineError};
pub use options::Options;
pub use pipeline::{CompilationResult, Pipeline};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber when `PARE_LOG` is set.
///
/// `PARE_LOG` takes `EnvFilter` directives, e.g. `PARE_LOG=debug` or
/// `PARE_LOG=pare_enum=trace`. Without it no subscriber is installed and
/// logging costs nothing. Only the first call has any effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("PARE_LOG").is_ok() {
            let filter = EnvFilter::from_env("PARE_LOG");
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
