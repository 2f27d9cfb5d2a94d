//! The process-wide watch table behind `start`, `stop` and `get_events`.
//!
//! Watches are keyed by random 63-bit ids so embedders cannot guess or
//! collide them across components. The table lock is held only for map
//! surgery, never across a monitor start or stop, which keeps it out of
//! any ordering relationship with the dispatcher and collector locks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;
#[cfg(windows)]
use tracing::info;

use crate::error::WatchError;
use crate::event::Event;
use crate::monitor::Monitor;
use crate::request::WatchRequest;
#[cfg(windows)]
use crate::workers::pool::{WorkerPool, DISPATCH_THROTTLE_MS};
use crate::workers::Worker;

/// How long `stop` waits for a watch's delivery workers to wind down.
const STOP_TIMEOUT_MS: i64 = 5_000;

struct WatchEntry {
    monitor: Arc<dyn Monitor>,
    /// Publisher and statistics workers serving this watch.
    workers: Vec<Worker>,
}

fn watches() -> &'static Mutex<HashMap<i64, WatchEntry>> {
    static WATCHES: OnceLock<Mutex<HashMap<i64, WatchEntry>>> = OnceLock::new();
    WATCHES.get_or_init(|| Mutex::new(HashMap::new()))
}

#[cfg(windows)]
fn dispatcher() -> &'static WorkerPool {
    static POOL: OnceLock<WorkerPool> = OnceLock::new();
    POOL.get_or_init(|| WorkerPool::new(DISPATCH_THROTTLE_MS))
}

/// Register a watch and start monitoring.
///
/// Returns the watch id. Only two failures are reported here: a path that
/// is not an existing directory, and a platform without the kernel
/// primitive. Anything that goes wrong later surfaces as error events in
/// the watch's own stream.
#[cfg(windows)]
pub fn start(request: WatchRequest) -> Result<i64, WatchError> {
    use rand::Rng;

    if !std::path::Path::new(&request.path).is_dir() {
        return Err(WatchError::FolderNotFound(request.path));
    }

    // Reserve an id and build the monitor under the lock; the kernel-side
    // start happens after it is released.
    let (id, monitor) = {
        let mut watches = watches().lock();
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate: i64 = rng.gen_range(1..i64::MAX);
            if !watches.contains_key(&candidate) {
                break candidate;
            }
        };
        let monitor = crate::monitor::create(id, &request);
        watches.insert(
            id,
            WatchEntry {
                monitor: Arc::clone(&monitor),
                workers: Vec::new(),
            },
        );
        (id, monitor)
    };

    let pool = dispatcher();
    monitor.start(pool);

    let mut workers = Vec::new();
    if let Some(callback) = request.event_callback.clone() {
        if request.event_interval_ms > 0 {
            let worker = Worker::new(crate::monitor::publisher::PublishWork::new(
                id,
                Arc::clone(&monitor),
                callback,
                request.event_interval_ms,
            ));
            pool.add(worker.clone());
            workers.push(worker);
        }
    }
    if let Some(callback) = request.stats_callback.clone() {
        if request.stats_interval_ms > 0 {
            let worker = Worker::new(crate::monitor::publisher::StatsWork::new(
                id,
                Arc::clone(&monitor),
                callback,
                request.stats_interval_ms,
            ));
            pool.add(worker.clone());
            workers.push(worker);
        }
    }

    if !workers.is_empty() {
        let mut watches = watches().lock();
        match watches.get_mut(&id) {
            Some(entry) => entry.workers = workers,
            None => {
                // A concurrent stop already removed the watch; settle the
                // delivery workers it never saw.
                drop(watches);
                for worker in &workers {
                    worker.stop();
                }
            }
        }
    }

    info!(id, path = %request.path, recursive = request.recursive, "watch started");
    Ok(id)
}

/// On platforms without an asynchronous directory-change primitive the
/// engine cannot run; every registration is refused.
#[cfg(not(windows))]
pub fn start(_request: WatchRequest) -> Result<i64, WatchError> {
    Err(WatchError::Unsupported)
}

/// Stop a watch. Returns false for unknown ids; a second stop of the same
/// id is therefore false too.
pub fn stop(id: i64) -> bool {
    let Some(entry) = watches().lock().remove(&id) else {
        return false;
    };

    // Everything heavier than map removal happens outside the lock.
    for worker in &entry.workers {
        worker.stop();
    }
    entry.monitor.stop();
    for worker in &entry.workers {
        worker.stop_and_wait(STOP_TIMEOUT_MS);
    }

    debug!(id, "watch stopped");
    true
}

/// Drain a watch's collected events into `out`. Returns the number of
/// events appended, or -1 for an unknown id.
pub fn get_events(id: i64, out: &mut Vec<Event>) -> i64 {
    let monitor = watches()
        .lock()
        .get(&id)
        .map(|entry| Arc::clone(&entry.monitor));

    match monitor {
        Some(monitor) => monitor.get_events(out),
        None => -1,
    }
}
