use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::todo::TodoPriority;

/// A reusable blueprint for todos that recur in shape, e.g. "Weekly report".
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct TodoTemplate {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: TodoPriority,
    pub category_id: Option<Uuid>,
    pub tag_names: Vec<String>,
    pub estimated_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_tag_names(names: &[String]) -> Result<(), ValidationError> {
    if names.len() > 20 {
        return Err(ValidationError::new("too_many_tags"));
    }
    if names
        .iter()
        .any(|n| n.trim().is_empty() || n.chars().count() > 30)
    {
        return Err(ValidationError::new("tag_name_length"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TemplateInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TodoPriority,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "validate_tag_names")]
    pub tag_names: Vec<String>,
    #[validate(range(min = 1, max = 10080))]
    pub estimated_minutes: Option<i32>,
}

/// Overrides applied when creating a todo from a template.
#[derive(Debug, Serialize, Deserialize, Default, Validate)]
#[serde(default)]
pub struct InstantiateTemplateInput {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}
