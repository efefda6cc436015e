//! Heartbeat: wrap a producer with a periodic liveness pulse so a consumer can tell a slow
//! producer from a dead one.
//!
//! Producer side ([`heartbeat`]): a work thread calls the user's closure repeatedly and hands each
//! result to the heartbeat loop, which multiplexes a ticker (pulses), the token and result delivery.
//! Pulses are attempted with `try_send` on a rendezvous channel, so a pulse nobody is waiting for
//! is dropped rather than queued.
//!
//! Consumer side ([`HeartbeatMonitor`]): selects over pulse, result, token and a timer. Silence for
//! a whole timeout window means the producer is stalled, which is terminal: the monitor fires the
//! token and reports [`PipelineError::Stalled`].

use crossbeam_channel::{Receiver, Sender, TrySendError, after, bounded, never, select, tick};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::PipelineError;
use crate::signal::{CancellationToken, Signal};

use super::context::{PipelineContext, send_or_cancel};

/// Producer state. Idle -> Working -> (PulseSent | ResultReady | Cancelled) -> Working | Terminated.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatState {
    Idle = 0,
    Working = 1,
    PulseSent = 2,
    ResultReady = 3,
    Cancelled = 4,
    Terminated = 5,
}

impl HeartbeatState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Working,
            2 => Self::PulseSent,
            3 => Self::ResultReady,
            4 => Self::Cancelled,
            _ => Self::Terminated,
        }
    }
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(HeartbeatState::Idle as u8)))
    }

    fn get(&self) -> HeartbeatState {
        HeartbeatState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, to: HeartbeatState) {
        let from = HeartbeatState::from_u8(self.0.swap(to as u8, Ordering::AcqRel));
        trace!("heartbeat: {:?} -> {:?}", from, to);
    }
}

/// Receiving side of a heartbeat-wrapped producer.
pub struct HeartbeatHandles<R> {
    /// One `()` per pulse a listener was waiting for. Closes when the producer exits.
    pub pulse: Receiver<()>,
    /// Work results in production order. Closes when the producer exits.
    pub results: Receiver<R>,
    token: CancellationToken,
    state: StateCell,
}

impl<R> HeartbeatHandles<R> {
    /// Current producer state.
    pub fn state(&self) -> HeartbeatState {
        self.state.get()
    }

    /// Consumer loop over these handles that treats `timeout` of silence as a dead producer.
    pub fn monitor(self, timeout: Duration) -> HeartbeatMonitor<R> {
        HeartbeatMonitor {
            pulse: self.pulse,
            results: self.results,
            token: self.token,
            timeout,
            pulses: 0,
            results_seen: 0,
        }
    }
}

/// Attempt a pulse without blocking. A pulse nobody is waiting for is dropped.
fn send_pulse(pulse_tx: &Sender<()>, state: &StateCell) {
    match pulse_tx.try_send(()) {
        Ok(()) => {
            state.set(HeartbeatState::PulseSent);
            state.set(HeartbeatState::Working);
        }
        Err(TrySendError::Full(())) => trace!("heartbeat: no listener, pulse dropped"),
        Err(TrySendError::Disconnected(())) => {}
    }
}

/// Deliver one result, pulsing while the consumer is busy. Returns false on cancellation or when
/// the consumer is gone.
fn send_result<R>(
    done: &Signal,
    ticker: &Receiver<std::time::Instant>,
    pulse_tx: &Sender<()>,
    results_tx: &Sender<R>,
    state: &StateCell,
    result: R,
) -> bool {
    loop {
        if done.is_fired() {
            return false;
        }
        select! {
            recv(done.receiver()) -> _ => return false,
            recv(ticker) -> _ => send_pulse(pulse_tx, state),
            send(results_tx, result) -> res => return res.is_ok(),
        }
    }
}

/// What woke the heartbeat loop.
enum Wake<R> {
    Cancelled,
    Tick,
    /// A result from the work thread, or `None` if that thread has exited.
    Work(Option<R>),
}

/// Run `work` repeatedly, delivering each result on `results` and pulsing every `interval`.
///
/// `work` runs on its own thread so pulses keep flowing while it computes. Both output channels
/// close when the token fires, when the consumer drops `results`, or when `work` panics.
pub fn heartbeat<R, F>(
    ctx: &PipelineContext,
    interval: Duration,
    mut work: F,
) -> HeartbeatHandles<R>
where
    R: Send + 'static,
    F: FnMut() -> R + Send + 'static,
{
    let (pulse_tx, pulse_rx) = bounded::<()>(0);
    let (results_tx, results_rx) = ctx.channel::<R>();
    let (work_tx, work_rx) = bounded::<R>(0);
    let state = StateCell::new();

    let done = ctx.done();
    ctx.spawn("heartbeat-work", move || {
        loop {
            let r = work();
            if !send_or_cancel(&done, &work_tx, r) {
                return;
            }
        }
    });

    let done = ctx.done();
    let loop_state = state.clone();
    ctx.spawn("heartbeat", move || {
        let state = loop_state;
        let ticker = tick(interval);
        let mut delivered = 0_usize;
        state.set(HeartbeatState::Working);
        loop {
            if done.is_fired() {
                state.set(HeartbeatState::Cancelled);
                break;
            }
            let wake = select! {
                recv(done.receiver()) -> _ => Wake::Cancelled,
                recv(ticker) -> _ => Wake::Tick,
                recv(work_rx) -> msg => Wake::Work(msg.ok()),
            };
            match wake {
                Wake::Cancelled => {
                    state.set(HeartbeatState::Cancelled);
                    break;
                }
                Wake::Tick => send_pulse(&pulse_tx, &state),
                Wake::Work(None) => {
                    debug!("heartbeat: work thread ended");
                    break;
                }
                Wake::Work(Some(result)) => {
                    state.set(HeartbeatState::ResultReady);
                    if !send_result(&done, &ticker, &pulse_tx, &results_tx, &state, result) {
                        if done.is_fired() {
                            state.set(HeartbeatState::Cancelled);
                        }
                        break;
                    }
                    delivered += 1;
                    state.set(HeartbeatState::Working);
                }
            }
        }
        state.set(HeartbeatState::Terminated);
        debug!("heartbeat: terminated after {} result(s)", delivered);
    });

    HeartbeatHandles {
        pulse: pulse_rx,
        results: results_rx,
        token: ctx.token().clone(),
        state,
    }
}

/// One observation from [`HeartbeatMonitor::next_event`].
#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatEvent<R> {
    Pulse,
    Result(R),
    /// Producer exited (or the token fired); no further events.
    Closed,
}

/// Totals from [`HeartbeatMonitor::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MonitorReport {
    pub pulses: usize,
    pub results: usize,
}

/// What the monitor's selection loop observed.
enum Seen<R> {
    Pulse,
    PulseClosed,
    Result(R),
    Closed,
    Silence,
}

/// Consumer side of a heartbeat: one selection loop over pulse, result, token and timeout.
pub struct HeartbeatMonitor<R> {
    pulse: Receiver<()>,
    results: Receiver<R>,
    token: CancellationToken,
    timeout: Duration,
    pulses: usize,
    results_seen: usize,
}

impl<R> HeartbeatMonitor<R> {
    /// Wait for the next pulse or result.
    ///
    /// Returns `Err(Stalled)` if nothing arrives within the timeout. That is terminal: the token
    /// has been fired before this returns, so the whole pipeline shuts down.
    pub fn next_event(&mut self) -> Result<HeartbeatEvent<R>, PipelineError> {
        let done = self.token.observe();
        loop {
            if done.is_fired() {
                return Ok(HeartbeatEvent::Closed);
            }
            let seen = select! {
                recv(self.pulse) -> msg => match msg {
                    Ok(()) => Seen::Pulse,
                    Err(_) => Seen::PulseClosed,
                },
                recv(self.results) -> msg => match msg {
                    Ok(r) => Seen::Result(r),
                    Err(_) => Seen::Closed,
                },
                recv(done.receiver()) -> _ => Seen::Closed,
                recv(after(self.timeout)) -> _ => Seen::Silence,
            };
            match seen {
                Seen::Pulse => {
                    self.pulses += 1;
                    return Ok(HeartbeatEvent::Pulse);
                }
                // Both channels close together; keep reading results until they run out.
                Seen::PulseClosed => self.pulse = never(),
                Seen::Result(r) => {
                    self.results_seen += 1;
                    return Ok(HeartbeatEvent::Result(r));
                }
                Seen::Closed => return Ok(HeartbeatEvent::Closed),
                Seen::Silence => {
                    warn!(
                        "heartbeat: no pulse or result within {:?}; presuming producer dead",
                        self.timeout
                    );
                    self.token.fire();
                    return Err(PipelineError::Stalled {
                        timeout: self.timeout,
                    });
                }
            }
        }
    }

    /// Drive the monitor until the producer closes, handing each result to `on_result`.
    pub fn run<F>(mut self, mut on_result: F) -> Result<MonitorReport, PipelineError>
    where
        F: FnMut(R),
    {
        loop {
            match self.next_event()? {
                HeartbeatEvent::Pulse => trace!("heartbeat: pulse"),
                HeartbeatEvent::Result(r) => on_result(r),
                HeartbeatEvent::Closed => break,
            }
        }
        Ok(self.report())
    }

    pub fn report(&self) -> MonitorReport {
        MonitorReport {
            pulses: self.pulses,
            results: self.results_seen,
        }
    }
}
