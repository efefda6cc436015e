//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
    env_prefix: String,
    thread_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
                env_prefix: format!("{}_", pkg.to_uppercase()),
                thread_prefix: format!("{pkg}-"),
            }
        })
    }

    /// Per-directory config file read by the CLI (e.g. `.sluice.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable name for `key`, e.g. `WORKERS` -> `SLUICE_WORKERS`.
    pub fn env_var(&self, key: &str) -> String {
        format!("{}{}", self.env_prefix, key)
    }

    /// Thread name for a pipeline task, e.g. `stage` -> `sluice-stage`.
    pub fn thread_name(&self, task: &str) -> String {
        format!("{}{}", self.thread_prefix, task)
    }
}

// ---- Worker threads ----

/// Worker-count limits for fan-out pools.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor for the default worker count.
    pub floor: usize,
    /// Ceiling for the default worker count (fan-out workers are threads, not tasks).
    pub max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            max: Self::MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    pub const MAX_THREADS: usize = 16;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Default fan-out width: available threads clamped to `[floor, max]`.
    pub fn default_workers(&self) -> usize {
        self.all_threads.clamp(self.floor, self.max)
    }
}

// ---- Channels ----

/// Default capacity for stage output channels. 0 = rendezvous: a send completes only when a
/// receiver takes the value, so no stage runs ahead of its consumer.
pub const DEFAULT_CHANNEL_CAP: usize = 0;

// ---- Or-combinator ----

/// Max inputs a single or-combinator thread waits on (plus the combined output).
pub const OR_FAN_IN: usize = 4;

// ---- Heartbeat / liveness ----

/// Heartbeat timing defaults.
pub struct HeartbeatConsts;

impl HeartbeatConsts {
    /// Interval between pulse attempts.
    pub const PULSE_INTERVAL: Duration = Duration::from_millis(500);
    /// Consumer gives up when neither a pulse nor a result arrives within this window.
    /// Twice the pulse interval, so one dropped pulse is tolerated.
    pub const STALL_TIMEOUT: Duration = Duration::from_secs(1);
}

// ---- Shutdown ----

/// How long `shutdown_and_wait` waits for tasks to exit before reporting them as stuck.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the active task count to reach zero.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);

// ---- Error handling ----

/// Default number of item errors after which a consumer shuts the pipeline down.
pub const DEFAULT_MAX_ERRORS: usize = 3;

// ---- CLI demo ----

/// Progress counter refresh batch (reduce lock contention on the bar).
pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;
