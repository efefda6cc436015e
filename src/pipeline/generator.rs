//! Generators: turn a source into a channel, one value at a time, until exhausted or cancelled.

use crossbeam_channel::Receiver;
use log::debug;

use crate::Sequenced;

use super::context::{PipelineContext, send_or_cancel};

/// Emit `source` in order on a fresh channel.
///
/// Each delivery races the pipeline token; once cancellation wins nothing more is sent. The
/// channel closes when the source is exhausted, on cancellation, when every receiver is gone, or
/// when the source panics. Failures the source wants a consumer to see belong in `T` (e.g. a
/// `Result`).
pub fn generate<I, T>(ctx: &PipelineContext, source: I) -> Receiver<T>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = ctx.channel();
    let done = ctx.done();
    let iter = source.into_iter();
    ctx.spawn("generate", move || {
        let mut sent = 0_usize;
        for value in iter {
            if !send_or_cancel(&done, &tx, value) {
                debug!("generate: stopped after {} value(s)", sent);
                return;
            }
            sent += 1;
        }
        debug!("generate: source exhausted after {} value(s)", sent);
    });
    rx
}

/// Like [`generate`], tagging each value with its source position.
pub fn generate_sequenced<I, T>(ctx: &PipelineContext, source: I) -> Receiver<Sequenced<T>>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
{
    generate(
        ctx,
        source
            .into_iter()
            .zip(0_u64..)
            .map(|(value, seq)| Sequenced { seq, value }),
    )
}

/// Cycle through `values` forever (until cancelled). Empty `values` closes immediately.
pub fn repeat<T>(ctx: &PipelineContext, values: Vec<T>) -> Receiver<T>
where
    T: Clone + Send + 'static,
{
    generate(ctx, values.into_iter().cycle())
}

/// Call `f` for every value, forever (until cancelled).
pub fn repeat_fn<T, F>(ctx: &PipelineContext, f: F) -> Receiver<T>
where
    F: FnMut() -> T + Send + 'static,
    T: Send + 'static,
{
    generate(ctx, std::iter::repeat_with(f))
}
