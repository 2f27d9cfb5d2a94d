//! Watch requests: everything captured at registration time.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;

/// Called once per delivered event, on the dispatcher thread.
///
/// The first argument is the watch id returned by [`crate::start`]. Panics
/// are caught and logged; they never unwind into the dispatcher.
pub type EventCallback = Arc<dyn Fn(i64, &Event) + Send + Sync>;

/// Called at the statistics interval with `(id, elapsed_ms, events)`:
/// wall-clock milliseconds since the previous statistics dispatch and the
/// number of events collected in that window.
pub type StatsCallback = Arc<dyn Fn(i64, f64, u64) + Send + Sync>;

/// Immutable description of one watch.
#[derive(Clone)]
pub struct WatchRequest {
    /// Directory to watch.
    pub path: String,
    /// Watch the whole subtree instead of just the top level.
    pub recursive: bool,
    /// Event delivery callback; `None` means the caller polls
    /// [`crate::get_events`] instead.
    pub event_callback: Option<EventCallback>,
    /// Dispatch interval for the event callback in milliseconds. Zero
    /// disables delivery; events still accumulate up to the age bound.
    pub event_interval_ms: u64,
    /// Statistics callback, dispatched at its own interval.
    pub stats_callback: Option<StatsCallback>,
    /// Dispatch interval for the statistics callback in milliseconds.
    /// Zero disables it.
    pub stats_interval_ms: u64,
}

impl WatchRequest {
    /// A request with no callbacks; pair with [`crate::get_events`] polling.
    pub fn new(path: impl Into<String>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
            event_callback: None,
            event_interval_ms: 0,
            stats_callback: None,
            stats_interval_ms: 0,
        }
    }

    /// Deliver events through `callback` every `interval_ms` milliseconds.
    pub fn with_events(mut self, callback: EventCallback, interval_ms: u64) -> Self {
        self.event_callback = Some(callback);
        self.event_interval_ms = interval_ms;
        self
    }

    /// Report collection statistics through `callback` every `interval_ms`
    /// milliseconds.
    pub fn with_statistics(mut self, callback: StatsCallback, interval_ms: u64) -> Self {
        self.stats_callback = Some(callback);
        self.stats_interval_ms = interval_ms;
        self
    }
}

impl fmt::Debug for WatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRequest")
            .field("path", &self.path)
            .field("recursive", &self.recursive)
            .field("event_callback", &self.event_callback.is_some())
            .field("event_interval_ms", &self.event_interval_ms)
            .field("stats_callback", &self.stats_callback.is_some())
            .field("stats_interval_ms", &self.stats_interval_ms)
            .finish()
    }
}
