pub const DEFAULT_FOCUS_LIMIT: i64 = 3;
pub const MAX_FOCUS_LIMIT: i64 = 10;

/// Focus mode ordering: higher priority first, then earlier due date (undated
/// last), then oldest. `todo_priority` is declared low..urgent, so DESC puts
/// urgent first.
pub const FOCUS_ORDER: &str =
    "todos.priority DESC, todos.due_date ASC NULLS LAST, todos.created_at ASC";

/// Number of todos to show: the explicit `limit`, else the user's preference,
/// clamped to 1..=MAX_FOCUS_LIMIT.
pub fn focus_limit(requested: Option<i64>, preferred: Option<i64>) -> i64 {
    requested
        .or(preferred)
        .unwrap_or(DEFAULT_FOCUS_LIMIT)
        .clamp(1, MAX_FOCUS_LIMIT)
}
