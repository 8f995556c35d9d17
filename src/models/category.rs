use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A user-owned grouping of todos. Each todo belongs to at most one category.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Category {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of non-deleted todos in the category.
    pub todo_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(regex(path = "crate::models::HEX_COLOR_REGEX", message = "Color must be #rrggbb"))]
    pub color: Option<String>,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_input_validation() {
        let valid = CategoryInput {
            name: "Work".into(),
            color: Some("#00AA00".into()),
            icon: Some("briefcase".into()),
        };
        assert!(valid.validate().is_ok());

        let too_long = CategoryInput {
            name: "x".repeat(51),
            color: None,
            icon: None,
        };
        assert!(too_long.validate().is_err());

        let bad_color = CategoryInput {
            name: "Home".into(),
            color: Some("#GGGGGG".into()),
            icon: None,
        };
        assert!(bad_color.validate().is_err());
    }
}
