//! Delivery workers: push collected events and statistics out to the
//! caller at the request's cadence, on the dispatcher thread.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use super::Monitor;
use crate::event::Event;
use crate::request::{EventCallback, StatsCallback};
use crate::workers::Work;

/// Drains a monitor and invokes the event callback once per event.
pub(crate) struct PublishWork {
    id: i64,
    monitor: Arc<dyn Monitor>,
    callback: EventCallback,
    interval_ms: f32,
    elapsed_ms: Mutex<f32>,
}

impl PublishWork {
    pub fn new(
        id: i64,
        monitor: Arc<dyn Monitor>,
        callback: EventCallback,
        interval_ms: u64,
    ) -> Self {
        Self {
            id,
            monitor,
            callback,
            interval_ms: interval_ms as f32,
            elapsed_ms: Mutex::new(0.0),
        }
    }

    fn publish(&self) {
        let mut events: Vec<Event> = Vec::new();
        if self.monitor.get_events(&mut events) <= 0 {
            return;
        }
        for event in &events {
            // A panicking callback must never unwind into the dispatcher.
            let delivered = catch_unwind(AssertUnwindSafe(|| (self.callback)(self.id, event)));
            if delivered.is_err() {
                warn!(id = self.id, "event callback panicked");
            }
        }
    }
}

impl Work for PublishWork {
    fn on_update(&self, elapsed_ms: f32) -> bool {
        let mut elapsed = self.elapsed_ms.lock();
        *elapsed += elapsed_ms;
        if *elapsed < self.interval_ms {
            return true;
        }
        *elapsed -= self.interval_ms;
        drop(elapsed);

        self.publish();
        true
    }
}

/// Reports how many events a watch collected per interval.
pub(crate) struct StatsWork {
    id: i64,
    monitor: Arc<dyn Monitor>,
    callback: StatsCallback,
    interval_ms: f32,
    state: Mutex<StatsState>,
}

struct StatsState {
    elapsed_ms: f32,
    last_count: u64,
}

impl StatsWork {
    pub fn new(
        id: i64,
        monitor: Arc<dyn Monitor>,
        callback: StatsCallback,
        interval_ms: u64,
    ) -> Self {
        Self {
            id,
            monitor,
            callback,
            interval_ms: interval_ms as f32,
            state: Mutex::new(StatsState {
                elapsed_ms: 0.0,
                last_count: 0,
            }),
        }
    }
}

impl Work for StatsWork {
    fn on_update(&self, elapsed_ms: f32) -> bool {
        let mut state = self.state.lock();
        state.elapsed_ms += elapsed_ms;
        if state.elapsed_ms < self.interval_ms {
            return true;
        }
        let window_ms = f64::from(state.elapsed_ms);
        state.elapsed_ms = 0.0;

        let total = self.monitor.added_count();
        let delta = total.saturating_sub(state.last_count);
        state.last_count = total;
        drop(state);

        let delivered = catch_unwind(AssertUnwindSafe(|| {
            (self.callback)(self.id, window_ms, delta)
        }));
        if delivered.is_err() {
            warn!(id = self.id, "statistics callback panicked");
        }
        true
    }
}
