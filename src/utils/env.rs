//! Environment overrides for the CLI: `SLUICE_*` variables, optionally from a `.env` file.

use log::{debug, warn};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::Opts;
use crate::utils::config::PackagePaths;

/// Read `SLUICE_<key>` and parse it. Unparseable values are logged and ignored.
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let name = PackagePaths::get().env_var(key);
    let raw = std::env::var(&name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

/// Load `.env` in `dir` (if present) into the process environment. Existing variables win.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file() {
        match dotenvy::from_path(&env_path) {
            Ok(()) => debug!("loaded {}", env_path.display()),
            Err(e) => warn!("{}: {}", env_path.display(), e),
        }
    }
}

/// Apply `SLUICE_WORKERS`, `SLUICE_CHANNEL_CAP` and `SLUICE_TIMEOUT_MS`. Call after the config
/// file and before CLI flags.
pub fn apply_env_to_opts(opts: &mut Opts) {
    if let Some(n) = env_value::<usize>("WORKERS") {
        opts.pipeline.workers = n;
    }
    if let Some(cap) = env_value::<usize>("CHANNEL_CAP") {
        opts.pipeline.channel_cap = cap;
    }
    if let Some(ms) = env_value::<u64>("TIMEOUT_MS") {
        opts.timeout = Some(Duration::from_millis(ms));
    }
}
