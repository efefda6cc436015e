//! Task spawning for pipeline stages: named threads plus an active-task count.

use log::{debug, error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::utils::config::{IDLE_POLL_INTERVAL, PackagePaths};

#[derive(Default)]
struct Inner {
    active: AtomicUsize,
    spawned: AtomicUsize,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    panicked: Mutex<Vec<String>>,
}

/// Decrements the active count when the task body returns or unwinds.
struct ActiveGuard(Arc<Inner>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Every task started for one pipeline. Cloning shares the group.
#[derive(Clone, Default)]
pub struct TaskGroup {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("active", &self.active())
            .field("spawned", &self.spawned())
            .finish()
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `f` on a named thread. If the OS refuses the thread, `f` is dropped unrun (so any
    /// channel sender it owns closes) and the error is returned.
    pub fn spawn<F>(&self, task: &str, f: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.reap_finished();
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        let guard = ActiveGuard(Arc::clone(&self.inner));
        let name = PackagePaths::get().thread_name(task);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _guard = guard;
            f();
        })?;
        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        self.inner.handles.lock().unwrap().push((name, handle));
        Ok(())
    }

    /// Tasks whose body has not returned yet.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Tasks started over the group's lifetime.
    pub fn spawned(&self) -> usize {
        self.inner.spawned.load(Ordering::Relaxed)
    }

    /// Wait until no task is running, or `grace` elapses.
    pub fn wait_idle(&self, grace: Duration) -> Result<(), PipelineError> {
        let deadline = Instant::now() + grace;
        loop {
            let active = self.active();
            if active == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::ShutdownTimeout {
                    grace,
                    still_running: active,
                });
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Join every task started so far. Returns the first panic seen, if any.
    /// Blocks until the tasks exit, so fire the pipeline token first unless the source is finite.
    pub fn join_all(&self) -> Result<(), PipelineError> {
        let handles: Vec<_> = std::mem::take(&mut *self.inner.handles.lock().unwrap());
        for (name, h) in handles {
            Self::join_one(&self.inner, name, h);
        }
        debug!("task group joined ({} spawned)", self.spawned());
        match self.inner.panicked.lock().unwrap().first() {
            Some(name) => Err(PipelineError::TaskPanicked { name: name.clone() }),
            None => Ok(()),
        }
    }

    /// Join handles of tasks that already finished so the handle list stays bounded for
    /// long-lived groups. Panics are recorded for [`join_all`](Self::join_all).
    fn reap_finished(&self) {
        let finished: Vec<_> = {
            let mut handles = self.inner.handles.lock().unwrap();
            let (done, running): (Vec<_>, Vec<_>) =
                handles.drain(..).partition(|(_, h)| h.is_finished());
            *handles = running;
            done
        };
        for (name, h) in finished {
            Self::join_one(&self.inner, name, h);
        }
    }

    fn join_one(inner: &Inner, name: String, h: JoinHandle<()>) {
        if h.join().is_err() {
            error!("task '{}' panicked", name);
            inner.panicked.lock().unwrap().push(name);
        }
    }
}
