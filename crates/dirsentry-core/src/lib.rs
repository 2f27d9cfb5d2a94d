//! dirsentry core: multiplexed directory-change watching.
//!
//! Callers register a directory with [`start`] and either poll
//! [`get_events`] or receive events through the request's callback at a
//! fixed cadence. Many independent watches share one process and one
//! dispatcher thread.
//!
//! # Modules
//!
//! - [`event`]: the change-event model delivered to callers.
//! - [`collector`]: per-watch event buffer with de-duplication, rename
//!   stitching and lazy aging.
//! - [`records`]: decoding of the packed change-record wire format.
//! - [`workers`]: cooperative workers and the dispatcher pool.
//! - [`monitor`]: a single watch (two kernel streams feeding a collector)
//!   and its recursive decomposition.
//! - [`registry`]: the process-wide id-to-watch table behind [`start`],
//!   [`stop`] and [`get_events`].
//! - [`paths`], [`wait`]: path composition and spin-wait helpers the
//!   layers above depend on.
//!
//! The kernel stream layer requires an asynchronous directory-change
//! primitive and is only built on Windows; on other platforms [`start`]
//! refuses with [`WatchError::Unsupported`] while the rest of the crate
//! (collector, workers, paths) remains fully usable.

pub mod collector;
pub mod error;
pub mod event;
pub mod monitor;
pub mod paths;
pub mod records;
pub mod registry;
pub mod request;
pub mod wait;
pub mod workers;

#[cfg(windows)]
pub(crate) mod stream;

pub use error::WatchError;
pub use event::{Event, EventAction, EventError};
pub use registry::{get_events, start, stop};
pub use request::{EventCallback, StatsCallback, WatchRequest};
