//! Load `.sluice.toml` from a directory (CLI only). Lib does not use this; the consuming program
//! injects config via PipelineOpts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::utils::config::PackagePaths;
use crate::{Demo, Opts};

#[derive(Debug, Deserialize)]
pub(crate) struct SluiceToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    demo: Option<Demo>,
    count: Option<u64>,
    multiplier: Option<i64>,
    addend: Option<i64>,
    fail_every: Option<u64>,
    workers: Option<usize>,
    channel_cap: Option<usize>,
    pulse_interval_ms: Option<u64>,
    stall_timeout_ms: Option<u64>,
    max_errors: Option<usize>,
    work_ms: Option<u64>,
    timeout_ms: Option<u64>,
    verbose: Option<bool>,
    json: Option<bool>,
}

/// Load the config file from `dir`. Ok(None) when there is no file; a file that does not parse is
/// an error. Runs before the logger is installed, so nothing here logs.
pub(crate) fn load_sluice_toml(dir: &Path) -> Result<Option<SluiceToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let file = parse_sluice_toml(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(file))
}

/// Verbosity from the file, needed before the logger is installed.
pub(crate) fn file_verbose(file: &SluiceToml) -> Option<bool> {
    file.settings.verbose
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $idx.$idx_field {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Overwrite a Duration opts field from a millisecond value in the file.
macro_rules! apply_file_ms {
    ($idx:expr, $opts:expr, $idx_field:ident => $($opts_field:ident).+) => {
        if let Some(ms) = $idx.$idx_field {
            $opts.$($opts_field).+ = Duration::from_millis(ms);
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub(crate) fn apply_file_to_opts(file: &SluiceToml, opts: &mut Opts) {
    let s = &file.settings;
    apply_file_opt!(s, opts, demo => demo);
    apply_file_opt!(s, opts, count => count);
    apply_file_opt!(s, opts, multiplier => multiplier);
    apply_file_opt!(s, opts, addend => addend);
    apply_file_opt!(s, opts, fail_every => fail_every);
    apply_file_opt!(s, opts, workers => pipeline.workers);
    apply_file_opt!(s, opts, channel_cap => pipeline.channel_cap);
    apply_file_ms!(s, opts, pulse_interval_ms => pipeline.pulse_interval);
    apply_file_ms!(s, opts, stall_timeout_ms => pipeline.stall_timeout);
    apply_file_opt!(s, opts, max_errors => pipeline.max_errors);
    apply_file_ms!(s, opts, work_ms => work);
    if let Some(ms) = s.timeout_ms {
        opts.timeout = Some(Duration::from_millis(ms));
    }
    apply_file_opt!(s, opts, verbose => verbose);
    apply_file_opt!(s, opts, json => json);
}

/// Parse a config file body (used by tests and by callers embedding the CLI config).
pub(crate) fn parse_sluice_toml(s: &str) -> Result<SluiceToml, toml::de::Error> {
    toml::from_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let file = parse_sluice_toml(
            r#"
            [settings]
            demo = "fanout"
            workers = 7
            pulse_interval_ms = 50
            timeout_ms = 1500
            "#,
        )
        .unwrap();
        let mut opts = Opts::default();
        let count_before = opts.count;
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.demo, Demo::Fanout);
        assert_eq!(opts.pipeline.workers, 7);
        assert_eq!(opts.pipeline.pulse_interval, Duration::from_millis(50));
        assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(opts.count, count_before);
    }

    #[test]
    fn unknown_demo_is_a_parse_error() {
        assert!(parse_sluice_toml("[settings]\ndemo = \"nope\"\n").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = std::env::temp_dir().join("sluice-no-config-here");
        assert!(load_sluice_toml(&dir).unwrap().is_none());
    }

    #[test]
    fn missing_settings_table_is_empty() {
        let file = parse_sluice_toml("").unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.demo, Demo::Pipeline);
    }
}
