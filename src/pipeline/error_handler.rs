use crossbeam_channel::Receiver;
use log::warn;
use std::fmt::Display;

use crate::ConsumeReport;
use crate::error::PipelineError;

use super::orchestrator::ShutdownHandle;

/// Sink for fallible items: hand `Ok` values to `on_ok`, log each `Err`, and shut the pipeline
/// down once `max_errors` errors have been seen. Returns when the channel closes or the
/// threshold trips.
pub fn consume_results<T, E, F>(
    shutdown: &ShutdownHandle,
    results: Receiver<Result<T, E>>,
    max_errors: usize,
    mut on_ok: F,
) -> ConsumeReport
where
    E: Display,
    F: FnMut(T),
{
    let mut report = ConsumeReport::default();
    for item in results.iter() {
        match item {
            Ok(value) => {
                report.ok += 1;
                on_ok(value);
            }
            Err(e) => {
                report.errors += 1;
                warn!("item error ({}/{}): {}", report.errors, max_errors, e);
                if report.errors >= max_errors {
                    warn!("Too many errors, shutting pipeline down");
                    report.tripped = true;
                    shutdown.shutdown();
                    break;
                }
            }
        }
    }
    report
}

/// Check a consume report: if the error threshold tripped, return it as an error; otherwise
/// log how many item errors were tolerated.
pub fn check_error_threshold(
    report: &ConsumeReport,
    max_errors: usize,
) -> Result<(), PipelineError> {
    if report.tripped {
        return Err(PipelineError::TooManyErrors {
            count: report.errors,
            threshold: max_errors,
        });
    }
    if report.errors > 0 {
        warn!(
            "Tolerated {} item error(s) ({} ok)",
            report.errors, report.ok
        );
    }
    Ok(())
}
