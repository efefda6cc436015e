//! Failure kinds that callers need to tell apart.
//!
//! Item-level failures travel as data inside the channel's item type. The kinds below are the
//! ones that end a pipeline (or are reported about it after the fact).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Neither a pulse nor a result arrived within the timeout: the producer is presumed dead.
    #[error("producer stalled: no pulse or result within {timeout:?}")]
    Stalled { timeout: Duration },

    /// A pipeline task panicked. Its output channel was still closed during unwinding.
    #[error("task '{name}' panicked")]
    TaskPanicked { name: String },

    /// Tasks were still running when the shutdown grace period ran out.
    #[error("{still_running} task(s) still running {grace:?} after shutdown")]
    ShutdownTimeout { grace: Duration, still_running: usize },

    /// The consumer saw at least `threshold` item errors and shut the pipeline down.
    #[error("too many item errors ({count} >= {threshold})")]
    TooManyErrors { count: usize, threshold: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// True for failures that mean the pipeline can no longer make progress (as opposed to
    /// failures reported after an otherwise orderly shutdown).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::Stalled { .. } | PipelineError::TaskPanicked { .. }
        )
    }
}
