//! Change streams: the cooperative workers that pump kernel notifications
//! into a monitor's collector.
//!
//! Each monitor runs two streams over the same root with different notify
//! filters. On every dispatcher tick a stream consumes whatever
//! completions are queued, re-arms the read before parsing (so the window
//! in which the kernel can overflow stays small), and converts the decoded
//! records into collector events. A stream that loses its handle keeps
//! retrying the open until the monitor stops.

pub(crate) mod buffer;

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use windows::Win32::Storage::FileSystem::{
    FILE_NOTIFY_CHANGE_ATTRIBUTES, FILE_NOTIFY_CHANGE_CREATION, FILE_NOTIFY_CHANGE_DIR_NAME,
    FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_FLAGS, FILE_NOTIFY_CHANGE_LAST_ACCESS,
    FILE_NOTIFY_CHANGE_LAST_WRITE, FILE_NOTIFY_CHANGE_SECURITY, FILE_NOTIFY_CHANGE_SIZE,
};

use crate::collector::Collector;
use crate::event::{EventAction, EventError};
use crate::records::{self, RawAction};
use crate::workers::Work;
use crate::paths;
use buffer::{ChangeBuffer, Completion};

pub(crate) use buffer::MAX_BUFFER_BYTES;

/// How long a broken stream waits before trying to reopen its root.
const REOPEN_DELAY_MS: f32 = 5_000.0;

/// Where parsed records land: the owning monitor's collector, plus the
/// watch root used to absolutise relative names.
#[derive(Clone)]
pub(crate) struct EventSink {
    collector: Arc<Collector>,
    root: String,
}

impl EventSink {
    pub fn new(collector: Arc<Collector>, root: String) -> Self {
        Self { collector, root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn add(&self, action: EventAction, name: &str, is_file: bool) {
        self.collector
            .add(action, &self.root, name, is_file, EventError::None);
    }

    pub fn add_rename(&self, new_name: &str, old_name: &str, is_file: bool) {
        self.collector
            .add_rename(&self.root, new_name, old_name, is_file, EventError::None);
    }

    pub fn add_error(&self, error: EventError) {
        self.collector.add_error(error);
    }
}

/// Which class of change a stream subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    /// File-name, attribute, size, write, access, creation and security
    /// changes.
    Files,
    /// Directory-name changes only (create or delete of a child
    /// directory).
    Directories,
}

impl StreamKind {
    fn filter(self) -> FILE_NOTIFY_CHANGE_FLAGS {
        match self {
            StreamKind::Files => {
                FILE_NOTIFY_CHANGE_FILE_NAME
                    | FILE_NOTIFY_CHANGE_ATTRIBUTES
                    | FILE_NOTIFY_CHANGE_SIZE
                    | FILE_NOTIFY_CHANGE_LAST_WRITE
                    | FILE_NOTIFY_CHANGE_LAST_ACCESS
                    | FILE_NOTIFY_CHANGE_CREATION
                    | FILE_NOTIFY_CHANGE_SECURITY
            }
            StreamKind::Directories => FILE_NOTIFY_CHANGE_DIR_NAME,
        }
    }

    /// The Files filter cannot see its own root being deleted, so that
    /// stream carries a secondary directory-name watch as a tripwire.
    fn wants_parent_guard(self) -> bool {
        matches!(self, StreamKind::Files)
    }

    /// Decide whether a record names a file or a directory.
    fn classify(self, action: EventAction, root: &str, name: &str) -> bool {
        match self {
            // This stream only ever sees directories.
            StreamKind::Directories => false,
            StreamKind::Files => match action {
                // The filter excludes directory names, so name changes on
                // this stream are always files.
                EventAction::Added | EventAction::Removed | EventAction::Renamed => true,
                // Touches can be either; ask the filesystem.
                _ => paths::is_file(&paths::join(root, name)),
            },
        }
    }
}

/// Cooperative worker pumping one stream.
pub(crate) struct StreamWork {
    kind: StreamKind,
    sink: EventSink,
    recursive: bool,
    buffer_bytes: usize,
    state: Mutex<StreamState>,
}

struct StreamState {
    primary: Option<ChangeBuffer>,
    parent_guard: Option<ChangeBuffer>,
    reopen_elapsed_ms: f32,
}

impl StreamWork {
    /// Open the kernel buffers for a stream over the sink's root. The
    /// first read is posted later, from `on_start` on the dispatcher.
    pub fn open(
        kind: StreamKind,
        sink: EventSink,
        recursive: bool,
        buffer_bytes: usize,
    ) -> io::Result<Self> {
        let primary = ChangeBuffer::open(sink.root(), buffer_bytes)?;
        let parent_guard = if kind.wants_parent_guard() {
            Some(ChangeBuffer::open(sink.root(), buffer_bytes)?)
        } else {
            None
        };

        Ok(Self {
            kind,
            sink,
            recursive,
            buffer_bytes,
            state: Mutex::new(StreamState {
                primary: Some(primary),
                parent_guard,
                reopen_elapsed_ms: 0.0,
            }),
        })
    }

    /// Post reads on the primary and, when present, the guard.
    fn arm(&self, state: &mut StreamState) -> bool {
        let Some(primary) = state.primary.as_mut() else {
            return false;
        };
        if primary.issue(self.recursive, self.kind.filter()).is_err() {
            return false;
        }
        if let Some(guard) = state.parent_guard.as_mut() {
            // Non-recursive directory-name watch on the same root; its
            // only job is to notice the root itself going away.
            if guard
                .issue(false, StreamKind::Directories.filter())
                .is_err()
            {
                return false;
            }
        }
        true
    }

    /// Consume queued completions, re-arming after each one.
    fn pump(&self, state: &mut StreamState) {
        let mut broken = false;

        while !broken {
            let Some(primary) = state.primary.as_mut() else {
                return;
            };
            match primary.poll(0) {
                Completion::Pending => break,
                Completion::Overflow => {
                    // The kernel discarded its backlog; tell the consumer
                    // and restart the read straight away.
                    self.sink.add_error(EventError::Overflow);
                    broken = primary.issue(self.recursive, self.kind.filter()).is_err();
                }
                Completion::Data(batch) => {
                    // Re-arm before parsing so the kernel keeps delivering
                    // into the buffer while we work on the clone.
                    let rearmed = primary.issue(self.recursive, self.kind.filter()).is_ok();
                    self.parse_batch(&batch);
                    broken = !rearmed;
                }
                Completion::Broken => broken = true,
            }
        }

        if !broken {
            if let Some(guard) = state.parent_guard.as_mut() {
                loop {
                    match guard.poll(0) {
                        Completion::Pending => break,
                        Completion::Data(_) | Completion::Overflow => {
                            // Guard content is noise; it only matters that
                            // the watch stays armed.
                            if guard
                                .issue(false, StreamKind::Directories.filter())
                                .is_err()
                            {
                                broken = true;
                                break;
                            }
                        }
                        Completion::Broken => {
                            broken = true;
                            break;
                        }
                    }
                }
            }
        }

        if broken {
            self.recycle(state);
        }
    }

    /// Tear down the kernel objects and schedule a reopen.
    fn recycle(&self, state: &mut StreamState) {
        warn!(root = %self.sink.root(), "change stream lost its handle, will retry");
        self.sink.add_error(EventError::Aborted);
        state.primary = None;
        state.parent_guard = None;
        state.reopen_elapsed_ms = 0.0;
    }

    /// Periodic attempt to bring a broken stream back. Stays silent on
    /// failure; the next period tries again.
    fn reopen(&self, state: &mut StreamState) {
        let Ok(primary) = ChangeBuffer::open(self.sink.root(), self.buffer_bytes) else {
            return;
        };
        let parent_guard = if self.kind.wants_parent_guard() {
            match ChangeBuffer::open(self.sink.root(), self.buffer_bytes) {
                Ok(guard) => Some(guard),
                Err(_) => return,
            }
        } else {
            None
        };

        state.primary = Some(primary);
        state.parent_guard = parent_guard;
        if self.arm(state) {
            debug!(root = %self.sink.root(), "change stream reopened");
        } else {
            state.primary = None;
            state.parent_guard = None;
        }
    }

    fn parse_batch(&self, batch: &[u8]) {
        let mut old_name: Option<String> = None;
        let mut new_name: Option<String> = None;

        for record in records::decode(batch) {
            match record.action {
                RawAction::Added => self.push(EventAction::Added, &record.name),
                RawAction::Removed => self.push(EventAction::Removed, &record.name),
                RawAction::Modified => self.push(EventAction::Touched, &record.name),
                RawAction::RenamedOld => {
                    old_name = Some(record.name);
                    self.emit_rename_if_paired(&mut new_name, &mut old_name);
                }
                RawAction::RenamedNew => {
                    new_name = Some(record.name);
                    self.emit_rename_if_paired(&mut new_name, &mut old_name);
                }
                RawAction::Other(code) => {
                    debug!(code, "unrecognised change record action");
                    self.push(EventAction::Unknown, &record.name);
                }
            }
        }

        // Halves whose partner fell outside this batch; the collector's
        // drain reconciles pairs that were split further apart.
        if let Some(old) = old_name.take() {
            self.push(EventAction::Removed, &old);
        }
        if let Some(new) = new_name.take() {
            self.push(EventAction::Added, &new);
        }
    }

    fn emit_rename_if_paired(
        &self,
        new_name: &mut Option<String>,
        old_name: &mut Option<String>,
    ) {
        if new_name.is_none() || old_name.is_none() {
            return;
        }
        if let (Some(new), Some(old)) = (new_name.take(), old_name.take()) {
            let is_file = self
                .kind
                .classify(EventAction::Renamed, self.sink.root(), &new);
            self.sink.add_rename(&new, &old, is_file);
        }
    }

    fn push(&self, action: EventAction, name: &str) {
        let is_file = self.kind.classify(action, self.sink.root(), name);
        self.sink.add(action, name, is_file);
    }
}

impl Work for StreamWork {
    fn on_start(&self) -> bool {
        let mut state = self.state.lock();
        if self.arm(&mut state) {
            true
        } else {
            self.sink.add_error(EventError::Access);
            false
        }
    }

    fn on_update(&self, elapsed_ms: f32) -> bool {
        let mut state = self.state.lock();

        if state.primary.is_some() {
            self.pump(&mut state);
        } else {
            state.reopen_elapsed_ms += elapsed_ms;
            if state.reopen_elapsed_ms >= REOPEN_DELAY_MS {
                state.reopen_elapsed_ms = 0.0;
                self.reopen(&mut state);
            }
        }
        true
    }

    fn on_end(&self) {
        // Dropping the buffers cancels in-flight reads and closes the
        // handles.
        let mut state = self.state.lock();
        state.primary = None;
        state.parent_guard = None;
    }
}
