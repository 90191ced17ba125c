//! Unix-timestamp helpers. Timestamps at API boundaries are `f64` unix
//! seconds, matching the wire format's `timestamp` fields.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Seconds elapsed between `past` and `now` (0.0 if `past` is in the future).
#[must_use]
pub fn age_seconds(past: f64, now: f64) -> f64 {
    (now - past).max(0.0)
}
