//! Monitors: one registered watch each.
//!
//! A monitor owns the collector its kernel streams feed and knows how to
//! start, stop and drain itself. Recursive watches over roots that already
//! have subfolders are decomposed into several narrower monitors.

pub mod publisher;

#[cfg(windows)]
pub mod directory;
#[cfg(windows)]
pub mod multi;

use crate::event::Event;
use crate::workers::pool::WorkerPool;

/// Lifecycle of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Started,
    Stopping,
    Stopped,
}

/// One registered watch.
pub trait Monitor: Send + Sync {
    /// The registry id this watch was created under.
    fn id(&self) -> i64;

    /// Open the kernel streams and submit their workers to `pool`.
    /// Failures are recorded as error events; the return value reports
    /// whether monitoring is live.
    fn start(&self, pool: &WorkerPool) -> bool;

    /// Stop the streams and release kernel resources. Idempotent.
    fn stop(&self);

    /// Drain collected events into `out`; returns the count.
    fn get_events(&self, out: &mut Vec<Event>) -> i64;

    /// Total events collected since start, for the statistics feed.
    fn added_count(&self) -> u64;
}

/// Build the right monitor shape for a request.
///
/// A recursive watch whose root already has subfolders is split into a
/// non-recursive root monitor plus recursive children, bounded by
/// [`multi::MAX_DECOMPOSE_DEPTH`]; everything else is a single monitor.
#[cfg(windows)]
pub(crate) fn create(
    id: i64,
    request: &crate::request::WatchRequest,
) -> std::sync::Arc<dyn Monitor> {
    use std::sync::Arc;

    if request.recursive && !crate::paths::sub_folders(&request.path).is_empty() {
        Arc::new(multi::MultiMonitor::new(id, request.clone()))
    } else {
        Arc::new(directory::DirectoryMonitor::new(id, request.clone()))
    }
}
