//! One-shot broadcast signals: the cancellation token, timer signals and the or-combinator.

pub mod or;
pub mod token;

pub use or::{live_combiners, or};
pub use token::CancellationToken;

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, after as timer, bounded, never, select,
};
use std::thread;
use std::time::Duration;

/// Read-only view of a one-shot event.
///
/// A signal is backed by a channel that never carries a message: it fires when its only sender
/// is dropped. Disconnection is observed by every clone of the receiver, immediately and forever,
/// so any number of observers can wait on the same signal and none of them can consume it.
///
/// Use [`Signal::receiver`] inside `crossbeam_channel::select!`: a `recv` arm on it becomes ready
/// exactly when the signal has fired.
#[derive(Clone, Debug)]
pub struct Signal {
    rx: Receiver<()>,
}

/// Write side of a [`Signal`]. Firing consumes the trigger, so a signal can fire at most once.
#[derive(Debug)]
pub struct Trigger {
    tx: Sender<()>,
}

impl Trigger {
    /// Fire the paired signal.
    pub fn fire(self) {
        drop(self.tx);
    }
}

impl Signal {
    /// Create an unset signal and the trigger that fires it. Dropping the trigger also fires it.
    pub fn pair() -> (Trigger, Signal) {
        let (tx, rx) = bounded(0);
        (Trigger { tx }, Signal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Signal {
        Signal { rx: never() }
    }

    /// A signal that is already set.
    pub fn fired() -> Signal {
        let (trigger, signal) = Signal::pair();
        trigger.fire();
        signal
    }

    /// A signal that fires once `after` has elapsed. The timer runs on its own detached thread
    /// for the full delay; use [`Signal::after_until`] when the timer may become irrelevant early.
    pub fn after(after: Duration) -> Signal {
        Signal::after_until(after, Signal::never())
    }

    /// A signal that fires once `after` has elapsed or `release` fires, whichever comes first.
    /// The timer thread exits at that moment, so firing `release` reclaims abandoned timers.
    pub fn after_until(after: Duration, release: Signal) -> Signal {
        let (trigger, signal) = Signal::pair();
        let spawned = thread::Builder::new()
            .name("sluice-timer".to_string())
            .spawn(move || {
                select! {
                    recv(release.receiver()) -> _ => {}
                    recv(timer(after)) -> _ => {}
                }
                trigger.fire();
            });
        if let Err(e) = spawned {
            log::warn!("could not start timer thread ({e}); signal fires immediately");
        }
        signal
    }

    /// Channel to select on. Ready (disconnected) once the signal has fired.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Non-blocking check.
    pub fn is_fired(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected) | Ok(()))
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Block until the signal fires or `timeout` elapses. Returns true if it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}
