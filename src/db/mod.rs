//! Queries shared between several handlers and the export worker.
//!
//! One-off queries stay next to the handler that runs them.

pub mod api_keys;
pub mod todos;
pub mod users;

use chrono::{DateTime, Duration, Timelike, Utc};

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(i64::from(now.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(now.nanosecond()))
}
