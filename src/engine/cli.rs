//! CLI command handler: build options, wire Ctrl-C and the deadline to the pipeline token, run
//! the selected demo and report how it ended.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::AtomicUsize;
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::arg_parser::Cli;
use crate::engine::progress::{counter_if, finish_progress, report_progress_batched};
use crate::pipeline::{Pipeline, check_error_threshold, consume_results, heartbeat};
use crate::utils::config::{PROGRESS_UPDATE_BATCH_SIZE, PackagePaths};
use crate::utils::sluice_toml::{apply_file_to_opts, file_verbose, load_sluice_toml};
use crate::utils::{apply_env_to_opts, load_dotenv, setup_logging};
use crate::{Demo, Opts, PipelineError, Signal, Termination, new_pipeline, or};

/// Values kept from the output for the summary.
const SAMPLE_LEN: usize = 10;

/// Overwrite opts field from a CLI flag when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $cli.$cli_field {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Overwrite a Duration opts field from a millisecond CLI flag when given.
macro_rules! apply_cli_ms {
    ($cli:expr, $opts:expr, $cli_field:ident => $($opts_field:ident).+) => {
        if let Some(ms) = $cli.$cli_field {
            $opts.$($opts_field).+ = Duration::from_millis(ms);
        }
    };
}

fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    apply_cli_opt!(cli, opts, demo => demo);
    apply_cli_opt!(cli, opts, count => count);
    apply_cli_opt!(cli, opts, multiplier => multiplier);
    apply_cli_opt!(cli, opts, addend => addend);
    apply_cli_opt!(cli, opts, workers => pipeline.workers);
    apply_cli_opt!(cli, opts, channel_cap => pipeline.channel_cap);
    apply_cli_opt!(cli, opts, fail_every => fail_every);
    apply_cli_opt!(cli, opts, max_errors => pipeline.max_errors);
    apply_cli_ms!(cli, opts, work_ms => work);
    apply_cli_ms!(cli, opts, pulse_ms => pipeline.pulse_interval);
    apply_cli_ms!(cli, opts, stall_ms => pipeline.stall_timeout);
    if let Some(ms) = cli.timeout_ms {
        opts.timeout = Some(Duration::from_millis(ms));
    }
    apply_cli_opt!(cli, opts, verbose => verbose);
    apply_cli_opt!(cli, opts, json => json);
}

/// Defaults, then `.sluice.toml`, then `SLUICE_*` env (and `.env`), then CLI flags.
fn setup_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    let file = load_sluice_toml(&cli.dir)?;
    let verbose = cli
        .verbose
        .or_else(|| file.as_ref().and_then(file_verbose))
        .unwrap_or(false);
    setup_logging(verbose);

    if let Some(file) = &file {
        debug!(
            "applying {} from {}",
            PackagePaths::get().config_filename(),
            cli.dir.display()
        );
        apply_file_to_opts(file, &mut opts);
    }
    load_dotenv(&cli.dir);
    apply_env_to_opts(&mut opts);
    apply_cli_to_opts(cli, &mut opts);
    Ok(opts)
}

/// Summary of one demo run, printed as JSON with `--json`.
#[derive(Debug, Default, Serialize)]
struct RunReport {
    demo: Demo,
    termination: Option<Termination>,
    elapsed_ms: u128,
    items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pulses: Option<usize>,
    sample: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// What a demo produced, before timing and termination are filled in.
#[derive(Default)]
struct DemoOutcome {
    items: usize,
    errors: Option<usize>,
    pulses: Option<usize>,
    sample: Vec<i64>,
    failure: Option<PipelineError>,
}

impl DemoOutcome {
    fn record(&mut self, value: i64) {
        self.items += 1;
        if self.sample.len() < SAMPLE_LEN {
            self.sample.push(value);
        }
    }
}

fn source_len(opts: &Opts) -> Result<i64> {
    i64::try_from(opts.count).context("count does not fit in i64")
}

/// generate -> *multiplier -> +addend, order preserved.
fn run_pipeline_demo(pipeline: &Pipeline, opts: &Opts) -> Result<DemoOutcome> {
    let (multiplier, addend) = (opts.multiplier, opts.addend);
    let running = pipeline
        .source(1..=source_len(opts)?)
        .stage(move |v: i64| v.wrapping_mul(multiplier))
        .stage(move |v: i64| v.wrapping_add(addend))
        .finish();

    let pb = counter_if(opts.verbose, "values");
    let counter = AtomicUsize::new(0);
    let mut outcome = DemoOutcome::default();
    for value in running.output.iter() {
        report_progress_batched(pb.as_ref(), &counter, PROGRESS_UPDATE_BATCH_SIZE);
        outcome.record(value);
    }
    finish_progress(pb.as_ref(), outcome.items, PROGRESS_UPDATE_BATCH_SIZE);
    running.shutdown.wait()?;
    Ok(outcome)
}

/// Sequenced source -> fallible stage over a worker pool -> resequence -> error-threshold sink.
fn run_fanout_demo(pipeline: &Pipeline, opts: &Opts) -> Result<DemoOutcome> {
    let (multiplier, addend, fail_every) = (opts.multiplier, opts.addend, opts.fail_every);
    let max_errors = opts.pipeline.max_errors;
    let running = pipeline
        .source_sequenced(1..=source_len(opts)?)
        .fan_out_default(move |item| {
            item.map(|v: i64| {
                if fail_every > 0 && v.unsigned_abs().is_multiple_of(fail_every) {
                    Err(format!("value {} rejected", v))
                } else {
                    Ok(v.wrapping_mul(multiplier).wrapping_add(addend))
                }
            })
        })
        .resequence()
        .finish();

    let pb = counter_if(opts.verbose, "values");
    let counter = AtomicUsize::new(0);
    let mut outcome = DemoOutcome::default();
    let report = consume_results(&running.shutdown, running.output, max_errors, |value| {
        report_progress_batched(pb.as_ref(), &counter, PROGRESS_UPDATE_BATCH_SIZE);
        outcome.record(value);
    });
    finish_progress(pb.as_ref(), report.ok, PROGRESS_UPDATE_BATCH_SIZE);
    if report.tripped {
        running.shutdown.shutdown_and_wait()?;
    } else {
        running.shutdown.wait()?;
    }
    outcome.errors = Some(report.errors);
    outcome.failure = check_error_threshold(&report, max_errors).err();
    Ok(outcome)
}

/// Slow producer wrapped in a heartbeat; stops after `count` results.
fn run_heartbeat_demo(pipeline: &Pipeline, opts: &Opts) -> Result<DemoOutcome> {
    let work = opts.work;
    let mut next = 0_i64;
    let handles = heartbeat(pipeline.context(), opts.pipeline.pulse_interval, move || {
        thread::sleep(work);
        next += 1;
        next
    });

    let shutdown = pipeline.shutdown_handle();
    let wanted = usize::try_from(opts.count.max(1)).unwrap_or(usize::MAX);
    let mut outcome = DemoOutcome::default();
    let monitored = handles.monitor(opts.pipeline.stall_timeout).run(|value| {
        outcome.record(value);
        if outcome.items >= wanted {
            debug!("heartbeat demo: {} result(s) received, stopping", wanted);
            shutdown.shutdown();
        }
    });
    match monitored {
        Ok(report) => {
            outcome.pulses = Some(report.pulses);
            shutdown.shutdown_and_wait()?;
        }
        Err(e) => {
            shutdown.shutdown_and_wait()?;
            outcome.failure = Some(e);
        }
    }
    Ok(outcome)
}

/// Or-combinator over `count` timers staggered by the work duration; measures how close the
/// combined signal fires to the earliest one.
fn run_or_demo(pipeline: &Pipeline, opts: &Opts) -> Result<DemoOutcome> {
    let count = opts.count.max(1);
    let delays: Vec<Duration> = (1..=count)
        .rev()
        .map(|i| opts.work.saturating_mul(u32::try_from(i).unwrap_or(u32::MAX)))
        .collect();
    let earliest = delays.iter().min().copied().unwrap_or_default();

    let start = Instant::now();
    let (release, timers_done) = Signal::pair();
    let mut signals: Vec<Signal> = delays
        .into_iter()
        .map(|d| Signal::after_until(d, timers_done.clone()))
        .collect();
    signals.push(pipeline.token().observe());
    let any = or(signals);
    any.wait();
    let latency = start.elapsed();
    // Later timers are abandoned; stop their threads now.
    release.fire();
    info!(
        "or over {} signal(s) fired after {:?} (earliest timer {:?})",
        count, latency, earliest
    );

    let mut outcome = DemoOutcome::default();
    outcome.record(i64::try_from(latency.as_millis()).unwrap_or(i64::MAX));
    Ok(outcome)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("serialize run report")?
        );
        return Ok(());
    }
    let ended = match report.termination {
        Some(Termination::Completed) => "completed",
        Some(Termination::Cancelled) => "cancelled",
        None => "unknown",
    };
    info!(
        "{:?} demo {} in {} ms: {} item(s)",
        report.demo, ended, report.elapsed_ms, report.items
    );
    if let Some(errors) = report.errors {
        info!("  item errors: {}", errors);
    }
    if let Some(pulses) = report.pulses {
        info!("  pulses: {}", pulses);
    }
    if !report.sample.is_empty() {
        info!("  first values: {:?}", report.sample);
    }
    Ok(())
}

/// Run the selected demo under one token. Ctrl-C and `--timeout-ms` both fire that token.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli)?;
    let pipeline = new_pipeline(&opts.pipeline)?;

    let on_interrupt = pipeline.shutdown_handle();
    ctrlc::set_handler(move || {
        warn!("Interrupted, shutting pipeline down");
        on_interrupt.shutdown();
    })
    .context("set Ctrl+C handler")?;
    if let Some(timeout) = opts.timeout {
        debug!("pipeline deadline in {:?}", timeout);
        pipeline.token().fire_after(timeout);
    }

    let start = Instant::now();
    let outcome = match opts.demo {
        Demo::Pipeline => run_pipeline_demo(&pipeline, &opts)?,
        Demo::Fanout => run_fanout_demo(&pipeline, &opts)?,
        Demo::Heartbeat => run_heartbeat_demo(&pipeline, &opts)?,
        Demo::Or => run_or_demo(&pipeline, &opts)?,
    };
    let shutdown = pipeline.shutdown_handle();

    let report = RunReport {
        demo: opts.demo,
        termination: Some(shutdown.termination()),
        elapsed_ms: start.elapsed().as_millis(),
        items: outcome.items,
        errors: outcome.errors,
        pulses: outcome.pulses,
        sample: outcome.sample,
        error: outcome.failure.as_ref().map(ToString::to_string),
    };
    print_report(&report, opts.json)?;

    match outcome.failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
