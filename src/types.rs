//! Public and internal types for the sluice API and the demo CLI.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;
use crate::utils::config::{
    DEFAULT_CHANNEL_CAP, DEFAULT_MAX_ERRORS, HeartbeatConsts, SHUTDOWN_GRACE, WorkerThreadLimits,
};

/// Lib options for building pipelines.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Capacity of every channel a stage creates. 0 = rendezvous.
    pub channel_cap: usize,
    /// Fan-out width used by [`Flow::fan_out_default`](crate::pipeline::Flow::fan_out_default).
    pub workers: usize,
    /// Heartbeat pulse interval.
    pub pulse_interval: Duration,
    /// Heartbeat consumer timeout: no pulse and no result within this window = stalled producer.
    pub stall_timeout: Duration,
    /// Item errors tolerated by [`consume_results`](crate::pipeline::consume_results) before shutdown.
    pub max_errors: usize,
    /// How long [`ShutdownHandle::shutdown_and_wait`](crate::pipeline::ShutdownHandle::shutdown_and_wait) waits for tasks.
    pub shutdown_grace: Duration,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            channel_cap: DEFAULT_CHANNEL_CAP,
            workers: WorkerThreadLimits::current().default_workers(),
            pulse_interval: HeartbeatConsts::PULSE_INTERVAL,
            stall_timeout: HeartbeatConsts::STALL_TIMEOUT,
            max_errors: DEFAULT_MAX_ERRORS,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

impl PipelineOpts {
    /// Reject settings that would make liveness detection meaningless. Zero workers is not an
    /// error (fan-out clamps it to one).
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.pulse_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "pulse interval must be > 0".to_string(),
            ));
        }
        if self.stall_timeout <= self.pulse_interval {
            return Err(PipelineError::InvalidConfig(format!(
                "stall timeout ({:?}) must exceed pulse interval ({:?})",
                self.stall_timeout, self.pulse_interval
            )));
        }
        if self.max_errors == 0 {
            return Err(PipelineError::InvalidConfig(
                "max errors must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which composed pipeline the CLI runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Demo {
    /// generate -> *multiplier -> +addend, in order.
    #[default]
    Pipeline,
    /// generate -> fallible stage fanned out over workers -> error-threshold sink.
    Fanout,
    /// heartbeat-wrapped slow producer watched by a stall-detecting consumer.
    Heartbeat,
    /// or-combinator over timer signals.
    Or,
}

/// Full options (CLI). Use [`PipelineOpts`] for lib.
#[derive(Clone, Debug)]
pub struct Opts {
    pub pipeline: PipelineOpts,
    pub demo: Demo,
    /// Number of values the demo generator produces.
    pub count: u64,
    pub multiplier: i64,
    pub addend: i64,
    /// Every n-th value fails in the fanout demo (0 = never).
    pub fail_every: u64,
    /// Simulated work per heartbeat result.
    pub work: Duration,
    /// Fire the pipeline token after this long.
    pub timeout: Option<Duration>,
    /// Show progress counter and debug logs.
    pub verbose: bool,
    /// Print the run summary as JSON.
    pub json: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            pipeline: PipelineOpts::default(),
            demo: Demo::default(),
            count: 20,
            multiplier: 2,
            addend: 1,
            fail_every: 0,
            work: Duration::from_millis(200),
            timeout: None,
            verbose: false,
            json: false,
        }
    }
}

/// Value tagged with its position in the source. Lets a consumer restore source order after a
/// fan-out (see [`resequence`](crate::pipeline::resequence)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub value: T,
}

impl<T> Sequenced<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Sequenced<U> {
        Sequenced {
            seq: self.seq,
            value: f(self.value),
        }
    }
}

/// How a pipeline ended, read from the token after its output channel closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    /// Source exhausted and every stage drained.
    Completed,
    /// Token fired (shutdown, timeout, error threshold, or stalled producer).
    Cancelled,
}

/// Summary returned by [`consume_results`](crate::pipeline::consume_results).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsumeReport {
    /// Ok items handed to the consumer callback.
    pub ok: usize,
    /// Err items seen (logged, not handed on).
    pub errors: usize,
    /// True if the error threshold was reached and shutdown was requested.
    pub tripped: bool,
}
