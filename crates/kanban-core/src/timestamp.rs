//! Microsecond timestamps as stored in the `*_us` columns.

use chrono::{DateTime, Utc};

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

#[must_use]
pub fn to_us(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}
