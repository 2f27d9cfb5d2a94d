//! Recursive watches decomposed into several narrower monitors.
//!
//! One deep recursive stream over a huge tree funnels every change through
//! a single 64 KiB buffer; splitting the root across children spreads that
//! load. The root itself is watched without recursion, which also surfaces
//! new top-level subtrees as directory-creation events.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::directory::DirectoryMonitor;
use super::{Monitor, MonitorState};
use crate::collector::Collector;
use crate::event::{Event, EventError};
use crate::paths;
use crate::request::WatchRequest;
use crate::workers::pool::WorkerPool;

/// How many levels the decomposition descends before falling back to one
/// recursive monitor per remaining subtree. Bounds the worker count on
/// pathologically wide trees; treat as a tuning knob.
pub const MAX_DECOMPOSE_DEPTH: u32 = 2;

/// A recursive watch served by a flat set of child monitors.
pub struct MultiMonitor {
    id: i64,
    request: WatchRequest,
    /// Carries this monitor's own error events; children collect their own.
    collector: Arc<Collector>,
    children: Vec<Arc<dyn Monitor>>,
    state: Mutex<MonitorState>,
}

impl MultiMonitor {
    /// Decompose `request` into child monitors. Only meaningful for
    /// recursive requests; a non-recursive one yields a single child.
    pub fn new(id: i64, request: WatchRequest) -> Self {
        let mut children = Vec::new();
        build_children(&request, 0, MAX_DECOMPOSE_DEPTH, &mut children);
        Self {
            id,
            request,
            collector: Arc::new(Collector::new()),
            children,
            state: Mutex::new(MonitorState::Stopped),
        }
    }

    /// Number of child monitors the decomposition produced.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    fn is(&self, state: MonitorState) -> bool {
        *self.state.lock() == state
    }
}

/// Depth-first decomposition. Child ids are local ordinals; only the
/// parent's id is registry-visible.
fn build_children(
    request: &WatchRequest,
    depth: u32,
    max_depth: u32,
    out: &mut Vec<Arc<dyn Monitor>>,
) {
    let child_id = out.len() as i64;

    if !request.recursive {
        out.push(Arc::new(DirectoryMonitor::new(child_id, request.clone())));
        return;
    }

    let sub_folders = paths::sub_folders(&request.path);
    if depth >= max_depth || sub_folders.is_empty() {
        // Deep enough (or nothing below): one recursive monitor covers the
        // remaining subtree.
        out.push(Arc::new(DirectoryMonitor::new(child_id, request.clone())));
        return;
    }

    // The root is watched flat; each subtree gets its own recursive watch.
    let mut root_request = request.clone();
    root_request.recursive = false;
    out.push(Arc::new(DirectoryMonitor::new(child_id, root_request)));

    for folder in sub_folders {
        let mut child_request = request.clone();
        child_request.path = folder;
        build_children(&child_request, depth + 1, max_depth, out);
    }
}

impl Monitor for MultiMonitor {
    fn id(&self) -> i64 {
        self.id
    }

    fn start(&self, pool: &WorkerPool) -> bool {
        self.stop();
        *self.state.lock() = MonitorState::Starting;

        for (index, child) in self.children.iter().enumerate() {
            if !child.start(pool) {
                self.collector.add_error(EventError::CannotStart);
                for started in &self.children[..index] {
                    started.stop();
                }
                *self.state.lock() = MonitorState::Stopped;
                return false;
            }
        }

        debug!(
            id = self.id,
            path = %self.request.path,
            children = self.children.len(),
            "multi monitor started"
        );
        *self.state.lock() = MonitorState::Started;
        true
    }

    fn stop(&self) {
        *self.state.lock() = MonitorState::Stopping;
        for child in &self.children {
            child.stop();
        }
        *self.state.lock() = MonitorState::Stopped;
    }

    fn get_events(&self, out: &mut Vec<Event>) -> i64 {
        // A watch that is gone (or going) has nothing to say.
        if self.is(MonitorState::Stopped) || self.is(MonitorState::Stopping) {
            return 0;
        }

        let mut count = self.collector.drain(out) as i64;
        for child in &self.children {
            count += child.get_events(out);
        }
        count
    }

    fn added_count(&self) -> u64 {
        let mut total = self.collector.added_count();
        for child in &self.children {
            total += child.added_count();
        }
        total
    }
}

impl Drop for MultiMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request_for(tmp: &TempDir) -> WatchRequest {
        WatchRequest::new(tmp.path().to_string_lossy().into_owned(), true)
    }

    #[test]
    fn flat_root_decomposes_to_a_single_child() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let monitor = MultiMonitor::new(1, request_for(&tmp));
        assert_eq!(monitor.child_count(), 1);
    }

    #[test]
    fn each_subfolder_gets_its_own_child() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir(tmp.path().join("alpha")).unwrap();
        std::fs::create_dir(tmp.path().join("beta")).unwrap();

        let monitor = MultiMonitor::new(1, request_for(&tmp));
        // Flat root watch plus one recursive child per subfolder.
        assert_eq!(monitor.child_count(), 3);
    }

    #[test]
    fn nested_subfolders_split_until_the_depth_bound() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir_all(tmp.path().join("a").join("inner")).unwrap();
        std::fs::create_dir_all(tmp.path().join("a").join("deeper").join("leaf")).unwrap();

        let monitor = MultiMonitor::new(1, request_for(&tmp));
        // Root flat + a flat + (inner recursive, deeper recursive): the
        // depth bound stops the split below level two.
        assert_eq!(monitor.child_count(), 4);
    }

    #[test]
    fn stopped_multi_monitor_reports_no_events() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let monitor = MultiMonitor::new(1, request_for(&tmp));

        let mut out = Vec::new();
        assert_eq!(monitor.get_events(&mut out), 0);
        assert!(out.is_empty());
    }
}
