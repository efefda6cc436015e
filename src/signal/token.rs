//! Cancellation token: a write-once stop flag shared by every task in a pipeline.

use crossbeam_channel::{after, select};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{Signal, Trigger};

struct Inner {
    fired: AtomicBool,
    trigger: Mutex<Option<Trigger>>,
    signal: Signal,
}

/// Broadcast stop signal. Cloning shares the same underlying flag.
///
/// `fire` is idempotent and never blocks; once fired, every observer (past and future) sees the
/// token as set, permanently.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("fired", &self.is_fired())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = Signal::pair();
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Fire the token. Later calls are no-ops.
    pub fn fire(&self) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(trigger) = self.inner.trigger.lock().unwrap().take() {
            trigger.fire();
        }
        debug!("cancellation token fired");
    }

    /// Signal that is set once the token has fired.
    pub fn observe(&self) -> Signal {
        self.inner.signal.clone()
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Fire the token once `timeout` elapses, unless it has already fired by then.
    /// The timer thread exits as soon as either happens.
    pub fn fire_after(&self, timeout: Duration) {
        let token = self.clone();
        let done = self.observe();
        let spawned = thread::Builder::new()
            .name("sluice-deadline".to_string())
            .spawn(move || {
                select! {
                    recv(done.receiver()) -> _ => {}
                    recv(after(timeout)) -> _ => {
                        debug!("deadline of {:?} reached", timeout);
                        token.fire();
                    }
                }
            });
        if let Err(e) = spawned {
            log::warn!("could not start deadline thread ({e}); firing now");
            self.fire();
        }
    }
}
