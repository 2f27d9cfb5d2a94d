//! Library error type for the fallible edges of the public API.
//!
//! Almost everything that can go wrong after a watch is running travels in
//! the event stream (see [`crate::event::EventError`]); this type only
//! covers refusals at registration time.

use thiserror::Error;

/// Why a watch could not be registered.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The requested path does not exist or is not a directory.
    #[error("watch folder does not exist: {0}")]
    FolderNotFound(String),

    /// This platform has no asynchronous directory-change primitive.
    #[error("directory watching is not supported on this platform")]
    Unsupported,
}
