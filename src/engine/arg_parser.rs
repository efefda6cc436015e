use clap::Parser;
use std::path::PathBuf;

use crate::Demo;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Cancellable concurrent pipelines over bounded channels.
#[derive(Clone, Parser)]
#[command(name = "sluice")]
#[command(about = "Run a composed pipeline demo; Ctrl-C or --timeout-ms cancels every stage.")]
pub struct Cli {
    /// Directory holding `.sluice.toml` and `.env`. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Which pipeline to run.
    #[arg(long, short = 'd', value_enum)]
    pub demo: Option<Demo>,

    /// Number of values the generator produces.
    #[arg(long, short = 'n')]
    pub count: Option<u64>,

    /// Multiplier stage factor.
    #[arg(long, short = 'm', allow_negative_numbers = true)]
    pub multiplier: Option<i64>,

    /// Adder stage term.
    #[arg(long, short = 'a', allow_negative_numbers = true)]
    pub addend: Option<i64>,

    /// Fan-out width. 0 is treated as 1.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Stage channel capacity. 0 = rendezvous.
    #[arg(long)]
    pub channel_cap: Option<usize>,

    /// Every n-th value fails in the fanout demo (0 = never).
    #[arg(long)]
    pub fail_every: Option<u64>,

    /// Item errors tolerated before the fanout demo shuts down.
    #[arg(long)]
    pub max_errors: Option<usize>,

    /// Simulated work per heartbeat result, in milliseconds.
    #[arg(long)]
    pub work_ms: Option<u64>,

    /// Heartbeat pulse interval, in milliseconds.
    #[arg(long)]
    pub pulse_ms: Option<u64>,

    /// Heartbeat stall timeout, in milliseconds.
    #[arg(long)]
    pub stall_ms: Option<u64>,

    /// Cancel the pipeline after this many milliseconds.
    #[arg(long, short = 't')]
    pub timeout_ms: Option<u64>,

    /// Verbose output (debug logs and a progress counter).
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Print the run summary as JSON on stdout.
    #[arg(long, short = 'j', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,
}
