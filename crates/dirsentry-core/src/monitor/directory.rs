//! A single watch: two kernel streams over one root, one collector.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::{Monitor, MonitorState};
use crate::collector::Collector;
use crate::event::{Event, EventError};
use crate::request::WatchRequest;
use crate::stream::{EventSink, StreamKind, StreamWork, MAX_BUFFER_BYTES};
use crate::workers::pool::WorkerPool;
use crate::workers::Worker;

/// How long `stop` waits for the stream workers to wind down.
const STOP_TIMEOUT_MS: i64 = 5_000;

/// Monitors one directory through a Files stream and a Directories stream
/// that share this monitor's collector.
pub struct DirectoryMonitor {
    id: i64,
    request: WatchRequest,
    buffer_bytes: usize,
    collector: Arc<Collector>,
    state: Mutex<MonitorState>,
    streams: Mutex<Vec<Worker>>,
}

impl DirectoryMonitor {
    pub fn new(id: i64, request: WatchRequest) -> Self {
        Self::with_buffer(id, request, MAX_BUFFER_BYTES)
    }

    /// A monitor whose streams use `buffer_bytes` receive buffers, clamped
    /// to the kernel maximum.
    pub fn with_buffer(id: i64, request: WatchRequest, buffer_bytes: usize) -> Self {
        Self {
            id,
            request,
            buffer_bytes: buffer_bytes.min(MAX_BUFFER_BYTES),
            collector: Arc::new(Collector::new()),
            state: Mutex::new(MonitorState::Stopped),
            streams: Mutex::new(Vec::new()),
        }
    }

    fn sink(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.collector), self.request.path.clone())
    }
}

impl Monitor for DirectoryMonitor {
    fn id(&self) -> i64 {
        self.id
    }

    fn start(&self, pool: &WorkerPool) -> bool {
        // Restarting an already-running monitor tears the old streams down
        // first.
        self.stop();
        *self.state.lock() = MonitorState::Starting;

        let files = StreamWork::open(
            StreamKind::Files,
            self.sink(),
            self.request.recursive,
            self.buffer_bytes,
        );
        let directories = StreamWork::open(
            StreamKind::Directories,
            self.sink(),
            self.request.recursive,
            self.buffer_bytes,
        );

        let (files, directories) = match (files, directories) {
            (Ok(files), Ok(directories)) => (files, directories),
            _ => {
                self.collector.add_error(EventError::Access);
                self.collector.add_error(EventError::CannotStart);
                *self.state.lock() = MonitorState::Stopped;
                return false;
            }
        };

        {
            let mut streams = self.streams.lock();
            for worker in [Worker::new(files), Worker::new(directories)] {
                pool.add(worker.clone());
                streams.push(worker);
            }
        }

        debug!(id = self.id, path = %self.request.path, "monitor started");
        *self.state.lock() = MonitorState::Started;
        true
    }

    fn stop(&self) {
        *self.state.lock() = MonitorState::Stopping;

        let streams: Vec<Worker> = self.streams.lock().drain(..).collect();
        for worker in streams {
            worker.stop_and_wait(STOP_TIMEOUT_MS);
        }

        *self.state.lock() = MonitorState::Stopped;
    }

    fn get_events(&self, out: &mut Vec<Event>) -> i64 {
        self.collector.drain(out) as i64
    }

    fn added_count(&self) -> u64 {
        self.collector.added_count()
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
