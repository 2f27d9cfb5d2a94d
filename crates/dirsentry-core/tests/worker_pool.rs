//! Worker and pool lifecycle invariants.
//!
//! These run real dispatcher threads at the real tick cadence, so every
//! wait uses a deadline far beyond what any CI machine needs while staying
//! short enough that a genuinely stuck pool fails the suite instead of
//! hanging it.

use dirsentry_core::wait;
use dirsentry_core::workers::pool::WorkerPool;
use dirsentry_core::workers::{WaitResult, Work, Worker};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const GENEROUS_TIMEOUT_MS: i64 = 10_000;

/// Observable lifecycle counters shared with the test body.
#[derive(Default)]
struct Probe {
    start_calls: AtomicU32,
    update_calls: AtomicU32,
    end_calls: AtomicU32,
    stop_calls: AtomicU32,
}

impl Probe {
    fn starts(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }
    fn updates(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
    fn ends(&self) -> u32 {
        self.end_calls.load(Ordering::SeqCst)
    }
    fn stops(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

struct CountedWork {
    probe: Arc<Probe>,
    /// Updates before requesting the end; 0 runs until stopped.
    max_updates: u32,
    decline_start: bool,
}

impl Work for CountedWork {
    fn on_start(&self) -> bool {
        self.probe.start_calls.fetch_add(1, Ordering::SeqCst);
        !self.decline_start
    }

    fn on_update(&self, _elapsed_ms: f32) -> bool {
        let done = self.probe.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_updates == 0 || done < self.max_updates
    }

    fn on_end(&self) {
        self.probe.end_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stop(&self) {
        self.probe.stop_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(max_updates: u32) -> (Worker, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let worker = Worker::new(CountedWork {
        probe: Arc::clone(&probe),
        max_updates,
        decline_start: false,
    });
    (worker, probe)
}

#[test]
fn start_runs_exactly_once_before_any_update() {
    let pool = WorkerPool::new(10);
    let (worker_a, probe_a) = counted(1);
    let (worker_b, probe_b) = counted(1);
    pool.add(worker_a);
    pool.add(worker_b);

    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe_a.starts(), 1);
    assert_eq!(probe_b.starts(), 1);
    assert!(probe_a.updates() >= 1);
    assert!(probe_b.updates() >= 1);
}

#[test]
fn end_runs_exactly_once() {
    let pool = WorkerPool::new(10);
    let (worker_a, probe_a) = counted(1);
    let (worker_b, probe_b) = counted(1);
    pool.add(worker_a.clone());
    pool.add(worker_b.clone());

    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe_a.ends(), 1);
    assert_eq!(probe_b.ends(), 1);
    assert!(worker_a.completed());
    assert!(worker_b.completed());
}

#[test]
fn finite_workers_get_their_exact_update_count() {
    let pool = WorkerPool::new(10);
    let (worker_a, probe_a) = counted(5);
    let (worker_b, probe_b) = counted(6);
    pool.add(worker_a);
    pool.add(worker_b);

    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe_a.updates(), 5);
    assert_eq!(probe_b.updates(), 6);
}

#[test]
fn declined_start_means_no_updates_and_no_end() {
    let pool = WorkerPool::new(10);
    let probe = Arc::new(Probe::default());
    let worker = Worker::new(CountedWork {
        probe: Arc::clone(&probe),
        max_updates: 0,
        decline_start: true,
    });
    pool.add(worker.clone());

    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe.starts(), 1);
    assert_eq!(probe.updates(), 0);
    assert_eq!(probe.ends(), 0);
    assert!(worker.completed());
}

#[test]
fn stopping_a_worker_ends_it() {
    let pool = WorkerPool::new(10);
    let (worker, probe) = counted(0);
    pool.add(worker.clone());

    assert!(wait::spin_until(|| worker.started(), GENEROUS_TIMEOUT_MS));
    worker.stop();

    assert_eq!(worker.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
    assert_eq!(probe.ends(), 1);
    assert_eq!(probe.stops(), 1);
}

#[test]
fn stop_and_wait_ends_every_live_worker() {
    let pool = WorkerPool::new(10);
    let (worker_a, probe_a) = counted(0);
    let (worker_b, probe_b) = counted(0);
    pool.add(worker_a.clone());
    pool.add(worker_b.clone());

    assert!(wait::spin_until(
        || worker_a.started() && worker_b.started(),
        GENEROUS_TIMEOUT_MS
    ));

    assert_eq!(pool.stop_and_wait(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe_a.ends(), 1);
    assert_eq!(probe_b.ends(), 1);
    assert!(worker_a.completed());
    assert!(worker_b.completed());
}

#[test]
fn re_adding_a_live_worker_does_not_duplicate_its_lifecycle() {
    let pool = WorkerPool::new(10);
    let (worker, probe) = counted(3);
    pool.add(worker.clone());
    pool.add(worker.clone());

    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);

    assert_eq!(probe.starts(), 1);
    assert_eq!(probe.updates(), 3);
    assert_eq!(probe.ends(), 1);
}

#[test]
fn workers_added_while_running_are_picked_up() {
    let pool = WorkerPool::new(10);
    let (long_lived, _long_probe) = counted(0);
    pool.add(long_lived.clone());

    assert!(wait::spin_until(|| long_lived.started(), GENEROUS_TIMEOUT_MS));

    let (late, late_probe) = counted(2);
    pool.add(late.clone());

    assert_eq!(late.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
    assert_eq!(late_probe.updates(), 2);
    assert_eq!(late_probe.ends(), 1);

    assert_eq!(pool.stop_and_wait(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
}

#[test]
fn waiting_on_an_empty_pool_is_complete() {
    let pool = WorkerPool::new(10);
    assert_eq!(pool.wait_for(1_000), WaitResult::Complete);
}

#[test]
fn pool_restarts_after_going_idle() {
    let pool = WorkerPool::new(10);

    let (first, first_probe) = counted(1);
    pool.add(first);
    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
    assert_eq!(first_probe.ends(), 1);

    // The dispatcher thread died with the work; a new worker revives it.
    let (second, second_probe) = counted(1);
    pool.add(second);
    assert_eq!(pool.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
    assert_eq!(second_probe.ends(), 1);
}

#[test]
fn worker_stopped_before_it_ever_started_settles_quietly() {
    let pool = WorkerPool::new(10);
    let (worker, probe) = counted(0);

    worker.stop();
    pool.add(worker.clone());

    assert!(wait::spin_until(|| worker.completed(), GENEROUS_TIMEOUT_MS));
    assert_eq!(probe.starts(), 0);
    assert_eq!(probe.updates(), 0);
    assert_eq!(probe.ends(), 0);
}

#[test]
fn stop_and_wait_on_a_worker_that_never_ran_is_complete() {
    let (worker, _probe) = counted(0);
    assert_eq!(worker.stop_and_wait(1_000), WaitResult::Complete);
}

#[test]
fn updates_report_elapsed_time() {
    struct ElapsedWork {
        total_ms: Arc<parking_lot::Mutex<f32>>,
    }

    impl Work for ElapsedWork {
        fn on_update(&self, elapsed_ms: f32) -> bool {
            let mut total = self.total_ms.lock();
            *total += elapsed_ms;
            *total < 100.0
        }
    }

    let total_ms = Arc::new(parking_lot::Mutex::new(0.0f32));
    let pool = WorkerPool::new(10);
    let worker = Worker::new(ElapsedWork {
        total_ms: Arc::clone(&total_ms),
    });
    pool.add(worker.clone());

    // At a 10 ms tick the accumulated elapsed time crosses 100 ms within a
    // couple of dozen ticks.
    assert_eq!(worker.wait_for(GENEROUS_TIMEOUT_MS), WaitResult::Complete);
    assert!(*total_ms.lock() >= 100.0);
}
