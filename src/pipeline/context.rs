//! Pipeline context: the token, task group and channel sizing shared by every component.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::error;

use crate::PipelineOpts;
use crate::signal::{CancellationToken, Signal};

use super::tasks::TaskGroup;

/// Shared context threaded into every generator, stage and pool of one pipeline.
///
/// Cloning is cheap and shares the token and task group. Components only ever observe the token;
/// firing it is left to whoever owns the pipeline (usually through a
/// [`ShutdownHandle`](super::ShutdownHandle)).
#[derive(Clone, Debug)]
pub struct PipelineContext {
    token: CancellationToken,
    tasks: TaskGroup,
    channel_cap: usize,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), crate::utils::config::DEFAULT_CHANNEL_CAP)
    }
}

impl PipelineContext {
    pub fn new(token: CancellationToken, channel_cap: usize) -> Self {
        Self {
            token,
            tasks: TaskGroup::new(),
            channel_cap,
        }
    }

    pub fn from_opts(opts: &PipelineOpts) -> Self {
        Self::new(CancellationToken::new(), opts.channel_cap)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancellation signal to race against in `select!`.
    pub fn done(&self) -> Signal {
        self.token.observe()
    }

    pub fn tasks(&self) -> &TaskGroup {
        &self.tasks
    }

    pub fn channel_cap(&self) -> usize {
        self.channel_cap
    }

    /// Fresh output channel for a stage, sized by the context.
    pub fn channel<T>(&self) -> (Sender<T>, Receiver<T>) {
        bounded(self.channel_cap)
    }

    /// Spawn a pipeline task. A pipeline that cannot start one of its tasks is broken, so a
    /// spawn failure fires the token; the task's output channel closes because its sender was
    /// dropped with the unrun closure.
    pub fn spawn<F>(&self, task: &str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.tasks.spawn(task, f) {
            error!("could not start {} task: {}; shutting pipeline down", task, e);
            self.token.fire();
        }
    }
}

/// Outcome of a cancellable receive.
pub(crate) enum Recv<T> {
    Item(T),
    Closed,
    Cancelled,
}

/// Receive from `input`, racing the cancellation signal. An already-fired token always wins.
pub(crate) fn recv_or_cancel<T>(done: &Signal, input: &Receiver<T>) -> Recv<T> {
    if done.is_fired() {
        return Recv::Cancelled;
    }
    select! {
        recv(done.receiver()) -> _ => Recv::Cancelled,
        recv(input) -> msg => match msg {
            Ok(v) => Recv::Item(v),
            Err(_) => Recv::Closed,
        },
    }
}

/// Send `value` on `out`, racing the cancellation signal. Returns false if cancelled or if every
/// receiver is gone; either way the caller should stop producing.
pub(crate) fn send_or_cancel<T>(done: &Signal, out: &Sender<T>, value: T) -> bool {
    if done.is_fired() {
        return false;
    }
    select! {
        recv(done.receiver()) -> _ => false,
        send(out, value) -> res => res.is_ok(),
    }
}
