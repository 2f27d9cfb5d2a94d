//! Per-watch event buffer.
//!
//! Streams push raw events in kernel-callback order; a drain hands them
//! back time-ordered, with older duplicates collapsed and half renames
//! reconciled. Events that nobody drains are aged out lazily so an
//! unattended watch cannot grow without bound.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{Event, EventAction, EventError};
use crate::{paths, wait};

/// Default maximum age of a buffered event in milliseconds. Anything older
/// is dropped the next time the cleanup deadline fires.
pub const MAX_EVENT_AGE_MS: i64 = 5_000;

/// Thread-safe buffer of events for one watch.
///
/// The lock is held only for the append and snapshot steps; de-duplication
/// and rename reconciliation happen on the drained copy so stream callbacks
/// are never blocked behind a slow consumer.
pub struct Collector {
    max_age_ms: i64,
    inner: Mutex<Inner>,
    /// Monotonic count of inserted events; the statistics worker reads it.
    added: AtomicU64,
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    /// When to next sweep for stale events, as ms since the epoch. Zero
    /// means unarmed; the first insert into an empty interval arms it.
    next_cleanup_ms: i64,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::with_max_age(MAX_EVENT_AGE_MS)
    }

    /// A collector that drops events older than `max_age_ms`.
    pub fn with_max_age(max_age_ms: i64) -> Self {
        Self {
            max_age_ms,
            inner: Mutex::new(Inner::default()),
            added: AtomicU64::new(0),
        }
    }

    /// Record a non-rename event. The stored name is `join(root, name)`;
    /// an empty `name` stays empty so pure error events carry no path.
    pub fn add(&self, action: EventAction, root: &str, name: &str, is_file: bool, error: EventError) {
        let name = if name.is_empty() {
            String::new()
        } else {
            paths::join(root, name)
        };
        self.insert(Event {
            time_ms_utc: wait::now_ms_utc(),
            action,
            error,
            name,
            old_name: String::new(),
            is_file,
        });
    }

    /// Record a rename. Either side may be empty when the kernel split the
    /// pair across batches; the drain reconciles those.
    pub fn add_rename(
        &self,
        root: &str,
        new_name: &str,
        old_name: &str,
        is_file: bool,
        error: EventError,
    ) {
        let name = if new_name.is_empty() {
            String::new()
        } else {
            paths::join(root, new_name)
        };
        let old_name = if old_name.is_empty() {
            String::new()
        } else {
            paths::join(root, old_name)
        };
        self.insert(Event {
            time_ms_utc: wait::now_ms_utc(),
            action: EventAction::Renamed,
            error,
            name,
            old_name,
            is_file,
        });
    }

    /// Record a pure error event with no path attached.
    pub fn add_error(&self, error: EventError) {
        self.insert(Event {
            time_ms_utc: wait::now_ms_utc(),
            action: EventAction::Unknown,
            error,
            name: String::new(),
            old_name: String::new(),
            is_file: false,
        });
    }

    /// Total events inserted since construction.
    pub fn added_count(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    /// Copy out everything buffered, in insertion order, and clear the
    /// buffer. Older duplicates of the same (action, is_file, name) triple
    /// are collapsed onto the newest occurrence, and renames that lost half
    /// of their pair are downgraded. Appends to `out`, returns the count.
    pub fn drain(&self, out: &mut Vec<Event>) -> usize {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.next_cleanup_ms = 0;
            std::mem::take(&mut inner.events)
        };

        // Walk newest to oldest so the most recent of each triple wins,
        // then restore chronological order in one pass.
        let mut drained: Vec<Event> = Vec::with_capacity(snapshot.len());
        for event in snapshot.into_iter().rev() {
            let duplicate = drained.iter().any(|kept| {
                kept.action == event.action
                    && kept.is_file == event.is_file
                    && kept.name == event.name
            });
            if !duplicate {
                drained.push(event);
            }
        }
        drained.reverse();

        reconcile_renames(&mut drained);

        let count = drained.len();
        out.extend(drained);
        count
    }

    fn insert(&self, event: Event) {
        {
            let mut inner = self.inner.lock();
            if inner.next_cleanup_ms == 0 {
                inner.next_cleanup_ms = event.time_ms_utc + self.max_age_ms;
            }
            inner.events.push(event);
        }
        self.added.fetch_add(1, Ordering::Relaxed);
        self.cleanup();
    }

    /// Drop events past the age bound once the armed deadline has passed.
    fn cleanup(&self) {
        let now = wait::now_ms_utc();
        let mut inner = self.inner.lock();
        if inner.next_cleanup_ms == 0 || inner.next_cleanup_ms > now {
            return;
        }
        inner.next_cleanup_ms = 0;

        let oldest = now - self.max_age_ms;
        inner.events.retain(|event| event.time_ms_utc >= oldest);
    }
}

/// Fix up renames whose pair never completed.
///
/// A new name without an old one becomes an addition, an old name without
/// a new one becomes a removal, and a rename with neither is turned into a
/// no-file-data error.
fn reconcile_renames(events: &mut [Event]) {
    for event in events.iter_mut() {
        if event.action != EventAction::Renamed {
            continue;
        }
        match (event.name.is_empty(), event.old_name.is_empty()) {
            (false, false) => {}
            (false, true) => event.action = EventAction::Added,
            (true, false) => {
                event.name = std::mem::take(&mut event.old_name);
                event.action = EventAction::Removed;
            }
            (true, true) => {
                event.action = EventAction::Unknown;
                event.error = EventError::NoFileData;
            }
        }
    }
}
