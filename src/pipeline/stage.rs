//! Stages: consume one channel, transform each item, produce a fresh output channel.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};

use crate::signal::Signal;

use super::context::{PipelineContext, Recv, recv_or_cancel, send_or_cancel};

/// Why a stage loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StageExit {
    /// Input closed and fully drained.
    Drained,
    /// Token fired.
    Cancelled,
    /// Every receiver of the output is gone.
    Abandoned,
}

/// Shared loop for single stages and fan-out workers. Every receive and every send races the
/// token. Returns how many items were forwarded and why the loop ended.
pub(crate) fn stage_loop<T, U, F>(
    done: &Signal,
    input: &Receiver<T>,
    out: &Sender<U>,
    mut f: F,
) -> (usize, StageExit)
where
    F: FnMut(T) -> U,
{
    let mut forwarded = 0_usize;
    loop {
        let item = match recv_or_cancel(done, input) {
            Recv::Item(item) => item,
            Recv::Closed => return (forwarded, StageExit::Drained),
            Recv::Cancelled => return (forwarded, StageExit::Cancelled),
        };
        if !send_or_cancel(done, out, f(item)) {
            let exit = if done.is_fired() {
                StageExit::Cancelled
            } else {
                StageExit::Abandoned
            };
            return (forwarded, exit);
        }
        forwarded += 1;
        trace!("stage: forwarded item {}", forwarded);
    }
}

fn spawn_stage<T, U, F>(
    ctx: &PipelineContext,
    task: &'static str,
    input: Receiver<T>,
    f: F,
) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    let (tx, rx) = ctx.channel();
    let done = ctx.done();
    ctx.spawn(task, move || {
        let (forwarded, exit) = stage_loop(&done, &input, &tx, f);
        debug!("{}: exit {:?} after {} item(s)", task, exit, forwarded);
    });
    rx
}

/// Apply `f` to every item of `input`, in order, on a fresh output channel.
///
/// The output closes when the input closes, when the token fires, or when `f` panics. The stage
/// never blocks on a read or a write without also watching the token.
pub fn run_stage<T, U, F>(ctx: &PipelineContext, input: Receiver<T>, f: F) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    spawn_stage(ctx, "stage", input, f)
}

/// Stage over fallible items: `f` runs on `Ok` values, `Err` values pass through untouched so
/// the consumer can count or log them.
pub fn run_fallible_stage<T, U, E, F>(
    ctx: &PipelineContext,
    input: Receiver<Result<T, E>>,
    mut f: F,
) -> Receiver<Result<U, E>>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: FnMut(T) -> Result<U, E> + Send + 'static,
{
    spawn_stage(ctx, "fallible-stage", input, move |item: Result<T, E>| {
        item.and_then(&mut f)
    })
}

/// Forward `input` unchanged until it closes or the token fires. Lets a plain `for` loop over the
/// result stop on cancellation without its own `select!`.
pub fn or_done<T>(ctx: &PipelineContext, input: Receiver<T>) -> Receiver<T>
where
    T: Send + 'static,
{
    spawn_stage(ctx, "or-done", input, |item| item)
}

/// Forward the first `n` items of `input`, then close. Upstream is left to the token.
pub fn take<T>(ctx: &PipelineContext, input: Receiver<T>, n: usize) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = ctx.channel();
    let done = ctx.done();
    ctx.spawn("take", move || {
        let mut taken = 0_usize;
        while taken < n {
            let item = match recv_or_cancel(&done, &input) {
                Recv::Item(item) => item,
                Recv::Closed | Recv::Cancelled => break,
            };
            if !send_or_cancel(&done, &tx, item) {
                break;
            }
            taken += 1;
        }
        debug!("take: forwarded {} of {}", taken, n);
    });
    rx
}
