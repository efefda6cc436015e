//! Fan-out / fan-in: a pool of workers sharing one input channel and one merged output.

use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::context::PipelineContext;
use super::stage::stage_loop;

/// Tracks the workers of one pool that are still running. Dropped by each worker on exit,
/// including on unwind.
struct PoolSlot {
    active: Arc<AtomicUsize>,
    size: usize,
    label: &'static str,
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        let left = self.active.fetch_sub(1, Ordering::AcqRel) - 1;
        if left == 0 {
            debug!("{}: all {} worker(s) exited", self.label, self.size);
        }
    }
}

/// Run `f` on `workers` threads that all read from `input` and write to one merged channel.
///
/// Whichever worker is idle when a value arrives takes it, so output order across workers is not
/// preserved (each worker's own output stays in order). The merged channel is held only by the
/// workers, so it closes exactly when the last one exits. `workers == 0` is treated as 1.
pub fn fan_out<T, U, F>(
    ctx: &PipelineContext,
    input: Receiver<T>,
    workers: usize,
    f: F,
) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let workers = if workers == 0 {
        warn!("fan-out: worker count 0, using 1");
        1
    } else {
        workers
    };
    let (tx, rx) = ctx.channel();
    let f = Arc::new(f);
    let active = Arc::new(AtomicUsize::new(workers));
    for id in 0..workers {
        let input = input.clone();
        let tx = tx.clone();
        let f = Arc::clone(&f);
        let done = ctx.done();
        let slot = PoolSlot {
            active: Arc::clone(&active),
            size: workers,
            label: "fan-out",
        };
        ctx.spawn("fan-out", move || {
            let _slot = slot;
            let (forwarded, exit) = stage_loop(&done, &input, &tx, |item| f(item));
            debug!(
                "fan-out: worker {} exit {:?} after {} item(s)",
                id, exit, forwarded
            );
        });
    }
    // Dropping the last sender outside the pool closes the merged channel once the workers finish.
    drop(tx);
    rx
}

/// Merge `inputs` into one channel. Closes after every input has closed (or on cancellation).
/// Items from one input keep their order; items from different inputs interleave arbitrarily.
pub fn fan_in<T>(ctx: &PipelineContext, inputs: Vec<Receiver<T>>) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = ctx.channel();
    let active = Arc::new(AtomicUsize::new(inputs.len()));
    let size = inputs.len();
    for input in inputs {
        let tx = tx.clone();
        let done = ctx.done();
        let slot = PoolSlot {
            active: Arc::clone(&active),
            size,
            label: "fan-in",
        };
        ctx.spawn("fan-in", move || {
            let _slot = slot;
            stage_loop(&done, &input, &tx, |item| item);
        });
    }
    drop(tx);
    rx
}
