pub mod api_key;
pub mod audit_log;
pub mod category;
pub mod export_job;
pub mod pomodoro_session;
pub mod preferences;
pub mod tag;
pub mod template;
pub mod time_entry;
pub mod todo;
pub mod user;

use serde::{Deserialize, Serialize};

pub use api_key::{ApiKey, CreateApiKeyInput, CreatedApiKey};
pub use audit_log::{AuditLog, AuditQuery};
pub use category::{Category, CategoryInput};
pub use export_job::{CreateExportInput, ExportFilters, ExportFormat, ExportJob, ExportStatus};
pub use pomodoro_session::{
    NextPhase, PomodoroSessionRecord, PomodoroStats, PomodoroStatsQuery, RecordPomodoroInput,
};
pub use preferences::{FocusSettings, Preferences, Theme};
pub use tag::{Tag, TagInput, TagSummary};
pub use template::{InstantiateTemplateInput, TemplateInput, TodoTemplate};
pub use time_entry::{StartTimerInput, TimeEntry, TimeSummary, TimeSummaryQuery};
pub use todo::{
    BulkAction, BulkRequest, BulkResult, SortOrder, StatusUpdate, Todo, TodoInput, TodoPriority,
    TodoQuery, TodoSort, TodoStats, TodoStatus,
};
pub use user::{ChangePasswordInput, DeleteAccountInput, UpdateProfileInput, User, UserProfile};

lazy_static::lazy_static! {
    /// `#rrggbb` colours.
    pub static ref HEX_COLOR_REGEX: regex::Regex =
        regex::Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

/// One page of a listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// `limit`/`offset` query parameters shared by simple listings.
#[derive(Debug, Deserialize, Default)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    pub fn limit(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
