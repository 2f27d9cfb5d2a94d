//! The dispatcher pool: one control thread driving a dynamic set of
//! workers under a minimum-tick throttle.
//!
//! Additions are queued through a channel and absorbed at the top of each
//! tick, so `add` is safe from any thread whether or not the pool is
//! already running. The control thread exits once every worker has
//! completed and nothing is pending; a later `add` revives it
//! transparently. No lock is held across a call into a worker hook.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{WaitResult, Worker};
use crate::wait;

/// Default minimum wall-clock between dispatcher ticks, in milliseconds.
pub const DISPATCH_THROTTLE_MS: u64 = 10;

/// One control thread, N cooperative workers.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    throttle: Duration,
    pending_tx: Sender<Worker>,
    pending_rx: Receiver<Worker>,
    /// Workers currently driven by the control thread. Shared so stop
    /// requests can reach live workers from any thread.
    active: Mutex<Vec<ActiveEntry>>,
    must_stop: AtomicBool,
    running: AtomicBool,
}

struct ActiveEntry {
    worker: Worker,
    last_update: Instant,
}

impl WorkerPool {
    /// A pool whose ticks are at least `throttle_ms` apart.
    pub fn new(throttle_ms: u64) -> Self {
        let (pending_tx, pending_rx) = unbounded();
        Self {
            inner: Arc::new(PoolInner {
                throttle: Duration::from_millis(throttle_ms),
                pending_tx,
                pending_rx,
                active: Mutex::new(Vec::new()),
                must_stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a worker. It becomes visible on the next tick; adding a
    /// worker that is already in the pool is a no-op.
    pub fn add(&self, worker: Worker) {
        let _ = self.inner.pending_tx.send(worker);
        self.ensure_dispatcher();
    }

    /// Advisory stop: the control thread winds everything down on its next
    /// tick. Use [`WorkerPool::stop_and_wait`] for the authoritative join.
    pub fn stop(&self) {
        self.inner.must_stop.store(true, Ordering::SeqCst);
    }

    /// Stop every live worker and the control thread, then wait for the
    /// wind-down to finish.
    pub fn stop_and_wait(&self, timeout_ms: i64) -> WaitResult {
        // Signal the workers first so cooperative ends begin immediately.
        for worker in self.snapshot() {
            worker.stop();
        }
        self.inner.must_stop.store(true, Ordering::SeqCst);

        if wait::spin_until(|| !self.inner.running.load(Ordering::SeqCst), timeout_ms) {
            WaitResult::Complete
        } else {
            WaitResult::Timeout
        }
    }

    /// Wait for every current worker to complete on its own.
    pub fn wait_for(&self, timeout_ms: i64) -> WaitResult {
        if wait::spin_until(|| !self.inner.running.load(Ordering::SeqCst), timeout_ms) {
            WaitResult::Complete
        } else {
            WaitResult::Timeout
        }
    }

    fn snapshot(&self) -> Vec<Worker> {
        self.inner
            .active
            .lock()
            .iter()
            .map(|entry| entry.worker.clone())
            .collect()
    }

    /// Spawn the control thread if it is not already alive. A fresh thread
    /// clears any stale stop request from a previous generation.
    fn ensure_dispatcher(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.inner.must_stop.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("dirsentry-dispatch".to_owned())
            .spawn(move || run(&inner))
            .expect("failed to spawn dispatcher thread");
    }
}

/// The control loop. Runs until stopped or until it goes idle.
fn run(inner: &PoolInner) {
    debug!("dispatcher started");

    loop {
        let tick_started = Instant::now();

        absorb_pending(inner);

        // Per-worker elapsed time is tracked separately so one worker's
        // slow update does not inflate its neighbours' readings.
        let now = Instant::now();
        let batch: Vec<(Worker, f32)> = {
            let mut active = inner.active.lock();
            active
                .iter_mut()
                .filter(|entry| !entry.worker.completed())
                .map(|entry| {
                    let elapsed = now.duration_since(entry.last_update).as_secs_f32() * 1_000.0;
                    entry.last_update = now;
                    (entry.worker.clone(), elapsed)
                })
                .collect()
        };

        for (worker, elapsed_ms) in batch {
            if worker.must_stop() && !worker.started() {
                worker.mark_complete();
                continue;
            }
            if !worker.started() && !worker.run_start() {
                // Declined to start; already settled as complete.
                continue;
            }
            if worker.must_stop() || !worker.run_update(elapsed_ms) {
                worker.run_end();
            }
        }

        inner
            .active
            .lock()
            .retain(|entry| !entry.worker.completed());

        if inner.must_stop.load(Ordering::SeqCst) {
            shutdown(inner);
            return;
        }

        if inner.active.lock().is_empty() && inner.pending_rx.is_empty() {
            // Idle: let the thread die. An `add` racing this decision
            // reclaims the dispatcher slot before we commit to leaving.
            inner.running.store(false, Ordering::SeqCst);
            if !inner.pending_rx.is_empty()
                && inner
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                continue;
            }
            debug!("dispatcher idle, exiting");
            return;
        }

        let spent = tick_started.elapsed();
        if spent < inner.throttle {
            thread::sleep(inner.throttle - spent);
        }
    }
}

fn absorb_pending(inner: &PoolInner) {
    let mut active = inner.active.lock();
    while let Ok(worker) = inner.pending_rx.try_recv() {
        let known = active
            .iter()
            .any(|entry| entry.worker.same_worker(&worker));
        if known {
            continue;
        }
        active.push(ActiveEntry {
            worker,
            last_update: Instant::now(),
        });
    }
}

/// End-of-life: every live worker gets its stop signal and, if it ever
/// started, exactly one `on_end`.
fn shutdown(inner: &PoolInner) {
    absorb_pending(inner);
    let entries: Vec<ActiveEntry> = inner.active.lock().drain(..).collect();

    for entry in entries {
        let worker = entry.worker;
        worker.stop();
        if !worker.started() {
            worker.mark_complete();
        } else if !worker.completed() {
            worker.run_end();
        }
    }

    debug!("dispatcher stopped");
    inner.running.store(false, Ordering::SeqCst);
}
