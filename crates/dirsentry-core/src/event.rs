//! The change-event model delivered to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a file or directory.
///
/// The discriminants are part of the wire contract with embedders and must
/// stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventAction {
    /// The change class could not be determined (also used for pure error
    /// events).
    Unknown = 1000,
    /// A file or directory appeared.
    Added = 1001,
    /// A file or directory disappeared.
    Removed = 1002,
    /// Attributes, size, timestamps or security changed.
    Touched = 1003,
    /// A file or directory was renamed; both names are carried.
    Renamed = 1004,
}

/// Error attached to an event. Errors travel in the event stream rather
/// than as return values so a live watch never has to be torn down to
/// report one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum EventError {
    /// Success marker; data events carry this.
    None = 0,
    /// Unspecified runtime failure.
    General = 1,
    /// Allocation failure while cloning a kernel batch or building an event.
    Memory = 2,
    /// The kernel notification queue overflowed and discarded its backlog.
    Overflow = 3,
    /// Monitoring was torn down underneath us, typically a handle
    /// invalidated by deletion of the watched root.
    Aborted = 4,
    /// Initial setup failed (bad path, permissions, handle exhaustion).
    CannotStart = 5,
    /// The directory could not be opened for monitoring.
    Access = 6,
    /// A rename arrived with neither an old nor a new name.
    NoFileData = 7,
}

/// A single observed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the UNIX epoch, UTC.
    pub time_ms_utc: i64,
    /// The change class.
    pub action: EventAction,
    /// Error marker; [`EventError::None`] for data events.
    pub error: EventError,
    /// Absolute path of the affected entry. Empty on pure error events.
    pub name: String,
    /// Previous absolute path; non-empty only for [`EventAction::Renamed`].
    pub old_name: String,
    /// Whether the entry is a file (as opposed to a directory).
    pub is_file: bool,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventAction::Unknown => "unknown",
            EventAction::Added => "added",
            EventAction::Removed => "removed",
            EventAction::Touched => "touched",
            EventAction::Renamed => "renamed",
        };
        f.write_str(label)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error != EventError::None {
            return write!(f, "error {:?} ({})", self.error, self.action);
        }
        if self.action == EventAction::Renamed {
            return write!(f, "renamed {} -> {}", self.old_name, self.name);
        }
        write!(f, "{} {}", self.action, self.name)
    }
}
