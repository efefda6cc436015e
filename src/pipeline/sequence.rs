//! Restore source order after a fan-out, using the sequence numbers attached by
//! [`generate_sequenced`](super::generate_sequenced).

use crossbeam_channel::Receiver;
use log::debug;
use std::collections::BTreeMap;

use crate::Sequenced;

use super::context::{PipelineContext, Recv, recv_or_cancel, send_or_cancel};

/// Reorder buffer: holds out-of-order values until the next expected sequence number arrives.
pub(crate) struct Resequencer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Resequencer<T> {
    pub(crate) fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept one value; returns every value that is now ready, in order.
    pub(crate) fn push(&mut self, item: Sequenced<T>) -> Vec<T> {
        self.pending.insert(item.seq, item.value);
        let mut ready = Vec::new();
        while let Some(value) = self.pending.remove(&self.next) {
            ready.push(value);
            self.next += 1;
        }
        ready
    }

    /// Remaining values in sequence order, skipping gaps. Used once the input has closed.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    pub(crate) fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// Emit values strictly in sequence order.
///
/// Values that arrive early are buffered until the gap before them fills. If the input closes
/// with gaps still open (an upstream stage dropped items), the buffered values are flushed in
/// order. On cancellation buffered values are discarded.
pub fn resequence<T>(ctx: &PipelineContext, input: Receiver<Sequenced<T>>) -> Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = ctx.channel();
    let done = ctx.done();
    ctx.spawn("resequence", move || {
        let mut buf = Resequencer::new();
        loop {
            let item = match recv_or_cancel(&done, &input) {
                Recv::Item(item) => item,
                Recv::Cancelled => {
                    debug!("resequence: cancelled with {} buffered", buf.buffered());
                    return;
                }
                Recv::Closed => break,
            };
            for value in buf.push(item) {
                if !send_or_cancel(&done, &tx, value) {
                    return;
                }
            }
        }
        let leftover = buf.drain();
        if !leftover.is_empty() {
            debug!(
                "resequence: input closed with gaps, flushing {}",
                leftover.len()
            );
        }
        for value in leftover {
            if !send_or_cancel(&done, &tx, value) {
                return;
            }
        }
    });
    rx
}
