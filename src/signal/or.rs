//! Or-combinator: one signal that fires when the first of many inputs fires.
//!
//! Inputs are reduced level by level in groups of at most [`OR_FAN_IN`]. Each group gets one
//! combiner thread that waits on its members plus the final output, so no thread ever selects over
//! more than `OR_FAN_IN + 1` channels regardless of how many signals are combined. When the output
//! fires, every combiner still waiting sees it and exits.

use crossbeam_channel::Select;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::{Signal, Trigger};
use crate::utils::config::OR_FAN_IN;

/// Combiner threads that have not returned yet, across every `or` in the process.
static LIVE_COMBINERS: AtomicUsize = AtomicUsize::new(0);

/// Decrements [`LIVE_COMBINERS`] when a combiner returns or unwinds.
struct CombinerGuard;

impl Drop for CombinerGuard {
    fn drop(&mut self) {
        LIVE_COMBINERS.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Or-combinator threads currently running. Drops back once every combined output has fired.
pub fn live_combiners() -> usize {
    LIVE_COMBINERS.load(Ordering::Acquire)
}

/// Combine `signals` into one signal that fires as soon as any of them fires.
///
/// - no inputs: a signal that never fires
/// - one input: that input, unchanged
pub fn or<I>(signals: I) -> Signal
where
    I: IntoIterator<Item = Signal>,
{
    let mut level: Vec<Signal> = signals.into_iter().collect();
    if level.len() <= 1 {
        return level.pop().unwrap_or_else(Signal::never);
    }

    let (out_trigger, out) = Signal::pair();
    let inputs = level.len();
    let mut depth = 0_usize;
    while level.len() > OR_FAN_IN {
        level = level
            .chunks(OR_FAN_IN)
            .map(|group| match group {
                [single] => single.clone(),
                _ => spawn_inner_combiner(group.to_vec(), out.clone()),
            })
            .collect();
        depth += 1;
    }
    debug!(
        "or: {} inputs reduced through {} inner level(s) to {} root branches",
        inputs,
        depth,
        level.len()
    );
    spawn_root_combiner(level, out_trigger);
    out
}

/// Block until one of `signals` fires. Returns its index.
fn wait_any(signals: &[Signal]) -> usize {
    let mut sel = Select::new();
    for s in signals {
        sel.recv(s.receiver());
    }
    let op = sel.select();
    let index = op.index();
    let _ = op.recv(signals[index].receiver());
    index
}

/// Inner node: fires its own signal when a member fires, and exits quietly once the root output
/// has fired (its own trigger drops then too, which nothing is waiting on any more).
fn spawn_inner_combiner(group: Vec<Signal>, out: Signal) -> Signal {
    let (trigger, node) = Signal::pair();
    spawn_combiner("sluice-or", move || {
        let mut watched = group;
        watched.push(out);
        let idx = wait_any(&watched);
        trace!("or: inner combiner woke on branch {}", idx);
        trigger.fire();
    });
    node
}

fn spawn_root_combiner(level: Vec<Signal>, out_trigger: Trigger) {
    spawn_combiner("sluice-or-root", move || {
        let idx = wait_any(&level);
        debug!("or: fired via root branch {}", idx);
        out_trigger.fire();
    });
}

/// If the thread cannot be started the closure (and the trigger it owns) is dropped, which fires
/// the node. A combined signal therefore errs towards firing, never towards hanging.
fn spawn_combiner<F>(name: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    LIVE_COMBINERS.fetch_add(1, Ordering::AcqRel);
    let guard = CombinerGuard;
    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        let _guard = guard;
        f();
    });
    if let Err(e) = spawned {
        warn!("or: could not start combiner thread: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    /// Poll until no combiner is running. Other tests in this module release theirs too.
    fn wait_no_combiners(within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if live_combiners() == 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        live_combiners() == 0
    }

    #[test]
    fn wait_any_reports_fired_index() {
        let (_t0, s0) = Signal::pair();
        let s1 = Signal::fired();
        let (_t2, s2) = Signal::pair();
        assert_eq!(wait_any(&[s0, s1, s2]), 1);
    }

    #[test]
    fn deep_tree_fires_from_last_input() {
        let mut triggers = Vec::new();
        let mut signals = Vec::new();
        for _ in 0..(OR_FAN_IN * OR_FAN_IN * 3 + 1) {
            let (t, s) = Signal::pair();
            triggers.push(t);
            signals.push(s);
        }
        let combined = or(signals);
        assert!(!combined.wait_timeout(Duration::from_millis(20)));
        if let Some(last) = triggers.pop() {
            last.fire();
        }
        assert!(combined.wait_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn single_input_is_passed_through() {
        let (trigger, s) = Signal::pair();
        let combined = or(vec![s]);
        assert!(!combined.is_fired());
        trigger.fire();
        assert!(combined.is_fired());
    }

    #[test]
    fn combiner_threads_exit_once_output_fires() {
        let (mut triggers, signals): (Vec<Trigger>, Vec<Signal>) =
            (0..200).map(|_| Signal::pair()).unzip();
        let combined = or(signals);
        // 200 inputs: 50 + 13 + 3 inner combiners plus the root.
        assert!(live_combiners() >= 67, "only {} running", live_combiners());
        assert!(!combined.wait_timeout(Duration::from_millis(20)));

        if let Some(last) = triggers.pop() {
            last.fire();
        }
        assert!(combined.wait_timeout(Duration::from_secs(2)));
        // The other 199 inputs are still pending; the combiners must not wait for them.
        assert!(wait_no_combiners(Duration::from_secs(2)));
        drop(triggers);
    }
}
