//! Cooperative workers.
//!
//! A worker is a unit of recurring work driven by the dispatcher pool
//! through four hooks. The pool serialises `on_start`, `on_update` and
//! `on_end` for a given worker but does not pin them to one OS thread, and
//! `on_stop` can arrive from any thread while an update is in flight, so
//! implementations keep their mutable state behind interior mutability.

pub mod pool;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::wait;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Everything waited on finished in time.
    Complete,
    /// The timeout elapsed first.
    Timeout,
}

/// The hooks a unit of work exposes to the pool.
pub trait Work: Send + Sync {
    /// Called once before any update. Returning false marks the worker
    /// complete without it ever receiving an update (or an end).
    fn on_start(&self) -> bool {
        true
    }

    /// Called at the pool cadence with the wall-clock milliseconds since
    /// this worker's previous update. Returning false requests the end.
    fn on_update(&self, elapsed_ms: f32) -> bool;

    /// Called exactly once after the final update, whether the worker
    /// finished cooperatively or the pool was stopped.
    fn on_end(&self) {}

    /// External stop signal. May run concurrently with an update.
    fn on_stop(&self) {}
}

/// Shareable handle around a unit of work.
///
/// Clones share lifecycle state, so a caller can keep one handle for
/// stop/wait control while the pool drives another.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

struct Inner {
    work: Box<dyn Work>,
    started: AtomicBool,
    completed: AtomicBool,
    must_stop: AtomicBool,
    ended: AtomicBool,
}

impl Worker {
    pub fn new(work: impl Work + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                work: Box::new(work),
                started: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                must_stop: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the pool has run `on_start` for this worker.
    pub fn started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Whether the worker's lifecycle has fully finished.
    pub fn completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Whether an external stop was requested.
    pub fn must_stop(&self) -> bool {
        self.inner.must_stop.load(Ordering::SeqCst)
    }

    /// Non-blocking stop request. The first call also delivers `on_stop`.
    pub fn stop(&self) {
        if !self.inner.must_stop.swap(true, Ordering::SeqCst) {
            self.inner.work.on_stop();
        }
    }

    /// Wait for the worker to complete.
    pub fn wait_for(&self, timeout_ms: i64) -> WaitResult {
        if wait::spin_until(|| self.completed(), timeout_ms) {
            WaitResult::Complete
        } else {
            WaitResult::Timeout
        }
    }

    /// Request a stop, then wait. A worker that never started or already
    /// completed reports [`WaitResult::Complete`] immediately; the stop
    /// signal is still raised so a queued worker is settled by its pool
    /// instead of starting later.
    pub fn stop_and_wait(&self, timeout_ms: i64) -> WaitResult {
        self.stop();
        if !self.started() || self.completed() {
            return WaitResult::Complete;
        }
        self.wait_for(timeout_ms)
    }

    pub(crate) fn same_worker(&self, other: &Worker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Pool side: run `on_start` once. Returns false when the work
    /// declined to start, in which case the worker is already complete and
    /// must receive no updates and no end.
    pub(crate) fn run_start(&self) -> bool {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return true;
        }
        if self.inner.work.on_start() {
            true
        } else {
            self.inner.completed.store(true, Ordering::SeqCst);
            false
        }
    }

    /// Pool side: one update with this worker's elapsed time.
    pub(crate) fn run_update(&self, elapsed_ms: f32) -> bool {
        self.inner.work.on_update(elapsed_ms)
    }

    /// Pool side: deliver `on_end` at most once and mark completion.
    pub(crate) fn run_end(&self) {
        if !self.inner.ended.swap(true, Ordering::SeqCst) {
            self.inner.work.on_end();
        }
        self.inner.completed.store(true, Ordering::SeqCst);
    }

    /// Pool side: settle a worker that was stopped before it ever started.
    pub(crate) fn mark_complete(&self) {
        self.inner.completed.store(true, Ordering::SeqCst);
    }
}
