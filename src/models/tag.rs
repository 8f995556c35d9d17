use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A user-defined label that can be attached to many todos.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Number of non-deleted todos carrying this tag.
    pub usage_count: i64,
}

/// The part of a tag embedded in todo responses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub id: Uuid,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TagInput {
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    #[validate(regex(path = "crate::models::HEX_COLOR_REGEX", message = "Color must be #rrggbb"))]
    pub color: Option<String>,
}
