//! Progress counter for demo runs (verbose only)

use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " items"
    )))
}

/// Counter only when verbose; quiet runs skip the bar entirely.
pub fn counter_if(verbose: bool, desc: &'static str) -> Option<ProgressBar> {
    verbose.then(|| create_counter(desc))
}

/// Update progress bar if available
/// Uses try_lock to avoid blocking if mutex is contended (non-blocking)
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    // If lock is contended, skip update (progress bar will catch up on next update)
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Increment a shared counter and update the progress bar every `chunk_size` items.
pub fn report_progress_batched(pb: Option<&ProgressBar>, counter: &AtomicUsize, chunk_size: usize) {
    let count = counter.fetch_add(1, Ordering::Relaxed);
    if let Some(pb) = pb {
        // count is 0-based before this item
        if (count + 1).is_multiple_of(chunk_size) {
            update_progress_bar(pb, chunk_size);
        }
    }
}

/// Final progress update for the remainder after batched updates, then close the line.
pub fn finish_progress(pb: Option<&ProgressBar>, total: usize, chunk_size: usize) {
    if let Some(pb) = pb {
        let remaining = total % chunk_size;
        if remaining > 0 {
            update_progress_bar(pb, remaining);
        }
        if let Ok(mut bar) = pb.lock() {
            let _ = bar.refresh();
        }
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_reports_count_every_item() {
        let counter = AtomicUsize::new(0);
        for _ in 0..250 {
            report_progress_batched(None, &counter, 100);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 250);
    }

    #[test]
    fn quiet_runs_have_no_counter() {
        assert!(counter_if(false, "x").is_none());
    }
}
