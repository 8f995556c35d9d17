use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Time spent on a todo. A running entry has no `ended_at`.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: i32,
    pub todo_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub note: Option<String>,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed seconds, counting up to `now` for a running entry.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (self.duration_seconds, self.ended_at) {
            (Some(seconds), _) => i64::from(seconds),
            (None, Some(end)) => (end - self.started_at).num_seconds().max(0),
            (None, None) => (now - self.started_at).num_seconds().max(0),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Validate)]
#[serde(default)]
pub struct StartTimerInput {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimeSummaryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Tracked time per todo over a period.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct TimeSummary {
    pub todo_id: Uuid,
    pub title: String,
    pub entries: i64,
    pub total_seconds: i64,
}
