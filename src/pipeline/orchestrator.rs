//! Pipeline composer: wires a generator through stages under one token and one shutdown handle.

use crossbeam_channel::Receiver;
use log::debug;
use std::time::Duration;

use crate::error::PipelineError;
use crate::pipeline;
use crate::signal::CancellationToken;
use crate::{PipelineOpts, Result, Sequenced, Termination};

use super::context::PipelineContext;

/// Owner of one pipeline: creates the token and task group every component shares.
///
/// ```ignore
/// let p = Pipeline::new(PipelineOpts::default());
/// let (out, _) = p.source(vec![1, 2, 3, 4]).stage(|v| v * 2).stage(|v| v + 1).collect()?;
/// assert_eq!(out, vec![3, 5, 7, 9]);
/// ```
pub struct Pipeline {
    ctx: PipelineContext,
    opts: PipelineOpts,
}

impl Pipeline {
    pub fn new(opts: PipelineOpts) -> Self {
        Self {
            ctx: PipelineContext::from_opts(&opts),
            opts,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn token(&self) -> &CancellationToken {
        self.ctx.token()
    }

    /// Start a generator over `source`.
    pub fn source<I, T>(&self, source: I) -> Flow<T>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
    {
        self.flow(pipeline::generate(&self.ctx, source))
    }

    /// Start a generator that tags values with their source position (see [`Flow::resequence`]).
    pub fn source_sequenced<I, T>(&self, source: I) -> Flow<Sequenced<T>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Send + 'static,
    {
        self.flow(pipeline::generate_sequenced(&self.ctx, source))
    }

    /// Continue from a channel built elsewhere (e.g. a heartbeat's results). The channel should
    /// be owned by a task that observes this pipeline's token.
    pub fn from_receiver<T>(&self, rx: Receiver<T>) -> Flow<T> {
        self.flow(rx)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            ctx: self.ctx.clone(),
            grace: self.opts.shutdown_grace,
        }
    }

    fn flow<T>(&self, rx: Receiver<T>) -> Flow<T> {
        Flow {
            ctx: self.ctx.clone(),
            workers: self.opts.workers,
            grace: self.opts.shutdown_grace,
            rx,
        }
    }
}

/// The tail of a pipeline under construction. Each step spawns its task immediately and returns
/// the next tail; nothing is buffered beyond the channels themselves.
pub struct Flow<T> {
    ctx: PipelineContext,
    workers: usize,
    grace: Duration,
    rx: Receiver<T>,
}

impl<T> Flow<T> {
    /// Build the next step from this tail's context and channel.
    fn then<U, B>(self, build: B) -> Flow<U>
    where
        B: FnOnce(&PipelineContext, Receiver<T>) -> Receiver<U>,
    {
        let rx = build(&self.ctx, self.rx);
        Flow {
            ctx: self.ctx,
            workers: self.workers,
            grace: self.grace,
            rx,
        }
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Order-preserving single-threaded stage.
    pub fn stage<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.then(|ctx, rx| pipeline::run_stage(ctx, rx, f))
    }

    /// Stage fanned out over `workers` threads. Output order is not preserved.
    pub fn fan_out<U, F>(self, workers: usize, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.then(|ctx, rx| pipeline::fan_out(ctx, rx, workers, f))
    }

    /// [`fan_out`](Self::fan_out) with the pipeline's configured worker count.
    pub fn fan_out_default<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let workers = self.workers;
        self.fan_out(workers, f)
    }

    /// Keep only the first `n` values.
    pub fn take(self, n: usize) -> Flow<T> {
        self.then(|ctx, rx| pipeline::take(ctx, rx, n))
    }

    /// Hand out the final output channel and the pipeline's shutdown handle.
    pub fn finish(self) -> RunningPipeline<T> {
        RunningPipeline {
            output: self.rx,
            shutdown: ShutdownHandle {
                ctx: self.ctx,
                grace: self.grace,
            },
        }
    }

    /// Drain the output, wait for every task, and report how the pipeline ended.
    /// Generator → stages → output channel → Vec. Only returns for a finite source or once
    /// something fires the token.
    pub fn collect(self) -> Result<(Vec<T>, Termination)> {
        let RunningPipeline { output, shutdown } = self.finish();
        let items: Vec<T> = output.iter().collect();
        debug!(
            "pipeline: output closed, total {} item(s) collected",
            items.len()
        );
        shutdown.wait()?;
        Ok((items, shutdown.termination()))
    }
}

impl<T: Send + 'static> Flow<Sequenced<T>> {
    /// Restore source order (after a fan-out) using the sequence numbers from
    /// [`Pipeline::source_sequenced`].
    pub fn resequence(self) -> Flow<T> {
        self.then(pipeline::resequence)
    }
}

impl<T, E> Flow<std::result::Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Stage over fallible items; `Err` values pass through to the consumer.
    pub fn try_stage<U, F>(self, f: F) -> Flow<std::result::Result<U, E>>
    where
        U: Send + 'static,
        F: FnMut(T) -> std::result::Result<U, E> + Send + 'static,
    {
        self.then(|ctx, rx| pipeline::run_fallible_stage(ctx, rx, f))
    }
}

/// Output of a composed pipeline plus the one handle needed to stop it.
pub struct RunningPipeline<T> {
    pub output: Receiver<T>,
    pub shutdown: ShutdownHandle,
}

/// Stops a pipeline. Firing it is enough on its own for every task in the graph to exit.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    ctx: PipelineContext,
    grace: Duration,
}

impl ShutdownHandle {
    /// Fire the pipeline token. Idempotent, never blocks.
    pub fn shutdown(&self) {
        self.ctx.token().fire();
    }

    /// Fire the token, then wait up to the grace period for every task to exit and join them.
    pub fn shutdown_and_wait(&self) -> std::result::Result<(), PipelineError> {
        self.shutdown();
        self.ctx.tasks().wait_idle(self.grace)?;
        self.ctx.tasks().join_all()
    }

    /// Join every task without firing the token. Use after the output has been drained.
    pub fn wait(&self) -> std::result::Result<(), PipelineError> {
        self.ctx.tasks().join_all()
    }

    pub fn token(&self) -> &CancellationToken {
        self.ctx.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.token().is_fired()
    }

    /// How the pipeline ended. Only meaningful once its output channel has closed.
    pub fn termination(&self) -> Termination {
        if self.is_cancelled() {
            Termination::Cancelled
        } else {
            Termination::Completed
        }
    }

    /// Pipeline tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.ctx.tasks().active()
    }
}
