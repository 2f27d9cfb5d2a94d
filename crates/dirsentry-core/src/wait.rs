//! Spin-wait helpers with millisecond timeouts, plus the UTC clock the
//! event model stamps with.

use std::time::{Duration, Instant};

/// Hard cap on spin iterations so a `-1` (unbounded) wait can never loop
/// forever if its condition is broken.
const MAX_SPIN_ITERATIONS: u64 = u32::MAX as u64;

/// Milliseconds since the UNIX epoch, UTC.
pub fn now_ms_utc() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Block the calling thread for `milliseconds`.
pub fn delay(milliseconds: u64) {
    std::thread::sleep(Duration::from_millis(milliseconds));
}

/// Poll `condition` until it returns true or `timeout_ms` elapses.
///
/// A negative timeout means "no time bound"; the iteration cap still
/// applies. Returns true if the condition fired, false on timeout.
pub fn spin_until(mut condition: impl FnMut() -> bool, timeout_ms: i64) -> bool {
    let deadline = if timeout_ms >= 0 {
        Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    } else {
        None
    };

    for _ in 0..MAX_SPIN_ITERATIONS {
        if condition() {
            return true;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}
