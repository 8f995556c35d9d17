use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::tag::TagSummary;

/// The priority of a todo.
/// Corresponds to the `todo_priority` SQL enum; declaration order is severity order.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[sqlx(type_name = "todo_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TodoPriority {
    fn default() -> Self {
        TodoPriority::Medium
    }
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoPriority::Low => "low",
            TodoPriority::Medium => "medium",
            TodoPriority::High => "high",
            TodoPriority::Urgent => "urgent",
        }
    }
}

/// The status of a todo.
/// Corresponds to the `todo_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "todo_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started yet.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Done. `completed_at` is set while a todo is in this state.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl Default for TodoStatus {
    fn default() -> Self {
        TodoStatus::Pending
    }
}

impl TodoStatus {
    pub const ALL: [TodoStatus; 4] = [
        TodoStatus::Pending,
        TodoStatus::InProgress,
        TodoStatus::Completed,
        TodoStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "Pending",
            TodoStatus::InProgress => "In progress",
            TodoStatus::Completed => "Completed",
            TodoStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TodoStatus::Pending | TodoStatus::InProgress)
    }
}

/// Value of `completed_at` after a todo moves to `next` status.
pub fn completed_at_for(
    next: TodoStatus,
    current_completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match next {
        TodoStatus::Completed => Some(current_completed_at.unwrap_or(now)),
        _ => None,
    }
}

/// Input for creating a todo or replacing one with `PUT`.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TodoInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[serde(default)]
    pub status: TodoStatus,

    #[serde(default)]
    pub priority: TodoPriority,

    pub due_date: Option<DateTime<Utc>>,

    pub category_id: Option<Uuid>,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub tag_ids: Vec<Uuid>,

    /// Capped at one week.
    #[validate(range(min = 1, max = 10080))]
    pub estimated_minutes: Option<i32>,

    pub position: Option<i32>,
}

/// A todo as stored and returned by the API, with its tags.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: i32,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub position: i32,
    pub estimated_minutes: Option<i32>,
    pub tags: Json<Vec<TagSummary>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.0.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: TodoStatus,
}

/// Sortable columns.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
    Title,
    Position,
}

impl TodoSort {
    /// SQL expression to order by. Only ever one of these constants reaches a query.
    pub fn column(&self) -> &'static str {
        match self {
            TodoSort::CreatedAt => "todos.created_at",
            TodoSort::UpdatedAt => "todos.updated_at",
            TodoSort::DueDate => "todos.due_date",
            TodoSort::Priority => "todos.priority",
            TodoSort::Title => "lower(todos.title)",
            TodoSort::Position => "todos.position",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Filters, sorting and pagination for listing todos.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct TodoQuery {
    pub status: Option<TodoStatus>,
    pub priority: Option<TodoPriority>,
    pub category_id: Option<Uuid>,
    /// Tag name, case-insensitive.
    pub tag: Option<String>,
    /// Matched against title and description, case-insensitive.
    pub search: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    /// Only open todos whose due date has passed.
    pub overdue: Option<bool>,
    pub include_deleted: Option<bool>,
    pub sort_by: Option<TodoSort>,
    pub order: Option<SortOrder>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl TodoQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Saturates instead of overflowing; Postgres returns an empty page for a huge OFFSET.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    /// Escapes LIKE wildcards in the search term.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let escaped = s
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{}%", escaped)
            })
    }
}

pub const MAX_BULK_IDS: usize = 500;

/// A bulk change applied to several todos at once.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    Complete,
    Reopen,
    Delete,
    Restore,
    SetStatus { status: TodoStatus },
    SetPriority { priority: TodoPriority },
    SetCategory { category_id: Option<Uuid> },
    AddTag { tag_id: Uuid },
    RemoveTag { tag_id: Uuid },
}

impl BulkAction {
    pub fn name(&self) -> &'static str {
        match self {
            BulkAction::Complete => "complete",
            BulkAction::Reopen => "reopen",
            BulkAction::Delete => "delete",
            BulkAction::Restore => "restore",
            BulkAction::SetStatus { .. } => "set_status",
            BulkAction::SetPriority { .. } => "set_priority",
            BulkAction::SetCategory { .. } => "set_category",
            BulkAction::AddTag { .. } => "add_tag",
            BulkAction::RemoveTag { .. } => "remove_tag",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BulkRequest {
    pub ids: Vec<Uuid>,
    #[serde(flatten)]
    pub action: BulkAction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResult {
    pub action: String,
    pub affected: u64,
}

/// Counters for the dashboard.
#[derive(Debug, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct TodoStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub overdue: i64,
    pub due_today: i64,
    pub completed_today: i64,
    pub completed_last_7_days: i64,
}
