//! Pipeline components: context, generators, stages, fan-out/fan-in, heartbeat, composer.

pub mod context;
pub mod error_handler;
pub mod fan;
pub mod generator;
pub mod heartbeat;
pub mod orchestrator;
pub mod sequence;
pub mod stage;
pub mod tasks;

pub use context::PipelineContext;
pub use error_handler::{check_error_threshold, consume_results};
pub use fan::{fan_in, fan_out};
pub use generator::{generate, generate_sequenced, repeat, repeat_fn};
pub use heartbeat::{
    HeartbeatEvent, HeartbeatHandles, HeartbeatMonitor, HeartbeatState, MonitorReport, heartbeat,
};
pub use orchestrator::{Flow, Pipeline, RunningPipeline, ShutdownHandle};
pub use sequence::resequence;
pub use stage::{or_done, run_fallible_stage, run_stage, take};
pub use tasks::TaskGroup;
