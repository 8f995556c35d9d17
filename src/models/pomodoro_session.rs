use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::productivity::pomodoro::PomodoroPhase;

/// A finished (or abandoned) pomodoro phase.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct PomodoroSessionRecord {
    pub id: Uuid,
    pub user_id: i32,
    pub todo_id: Option<Uuid>,
    pub phase: PomodoroPhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i32,
    /// `false` when the phase was skipped before running out.
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPomodoroInput {
    pub phase: PomodoroPhase,
    pub todo_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default = "default_completed")]
    pub completed: bool,
}

impl RecordPomodoroInput {
    pub fn duration_seconds(&self) -> Option<i32> {
        let seconds = (self.ended_at - self.started_at).num_seconds();
        if seconds <= 0 {
            return None;
        }
        i32::try_from(seconds).ok()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PomodoroStatsQuery {
    pub days: Option<i64>,
}

impl PomodoroStatsQuery {
    pub fn days(&self) -> i64 {
        self.days.unwrap_or(7).clamp(1, 365)
    }
}

/// Totals over the requested window.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PomodoroStats {
    pub days: i64,
    pub work_sessions: i64,
    pub skipped_sessions: i64,
    pub break_sessions: i64,
    pub focus_seconds: i64,
    pub break_seconds: i64,
}

/// What the client should run next.
#[derive(Debug, Serialize, Deserialize)]
pub struct NextPhase {
    pub phase: PomodoroPhase,
    pub duration_seconds: u64,
    pub completed_work_sessions_today: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_record_input_defaults_to_completed() {
        let input: RecordPomodoroInput = serde_json::from_value(json!({
            "phase": "work",
            "started_at": "2024-05-01T09:00:00Z",
            "ended_at": "2024-05-01T09:25:00Z"
        }))
        .unwrap();
        assert!(input.completed);
        assert_eq!(input.duration_seconds(), Some(25 * 60));
    }

    #[test]
    fn test_record_input_rejects_reversed_interval() {
        let started_at = Utc::now();
        let input = RecordPomodoroInput {
            phase: PomodoroPhase::ShortBreak,
            todo_id: None,
            started_at,
            ended_at: started_at - Duration::minutes(5),
            completed: true,
        };
        assert_eq!(input.duration_seconds(), None);
    }

    #[test]
    fn test_stats_window_is_clamped() {
        assert_eq!(PomodoroStatsQuery::default().days(), 7);
        assert_eq!(PomodoroStatsQuery { days: Some(0) }.days(), 1);
        assert_eq!(PomodoroStatsQuery { days: Some(10_000) }.days(), 365);
    }
}
