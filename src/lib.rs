//! Sluice: cancellable concurrent pipelines over bounded channels.
//!
//! Every component (generator, stage, fan-out pool, heartbeat) runs on its own thread, owns the
//! sending side of a freshly created output channel, and races every channel operation against one
//! shared [`CancellationToken`]. Firing the token is therefore enough to make every task exit and
//! every channel close.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod signal;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineContext, ShutdownHandle};
pub use signal::{CancellationToken, Signal, or};

use log::debug;

/// Result alias used by public sluice API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Build a [`Pipeline`] from `opts` after validating them.
///
/// ```ignore
/// let p = sluice::new_pipeline(&PipelineOpts::default())?;
/// let running = p.source(1..).stage(|v: u64| v * 2).finish();
/// // ... later
/// running.shutdown.shutdown_and_wait()?;
/// ```
pub fn new_pipeline(opts: &PipelineOpts) -> Result<Pipeline> {
    opts.validate()?;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    Ok(Pipeline::new(opts.clone()))
}
