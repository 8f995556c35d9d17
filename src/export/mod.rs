//! Rendering todos into downloadable files, and the background worker that
//! turns export requests into those files.

pub mod csv;
pub mod json;
pub mod markdown;
pub mod pdf;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{ExportFormat, Todo};

pub use worker::ExportWorker;

/// A todo together with the name of its category, as exported.
#[derive(Debug, Serialize, FromRow, Clone)]
pub struct ExportRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub todo: Todo,
    pub category_name: Option<String>,
}

/// Timestamps in exports use RFC 3339 with second precision.
pub(crate) fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|v| v.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

pub fn render(
    format: ExportFormat,
    rows: &[ExportRow],
    exported_at: DateTime<Utc>,
) -> Result<Vec<u8>, AppError> {
    match format {
        ExportFormat::Csv => Ok(csv::render(rows).into_bytes()),
        ExportFormat::Json => json::render(rows, exported_at),
        ExportFormat::Markdown => Ok(markdown::render(rows, exported_at).into_bytes()),
        ExportFormat::Pdf => Ok(pdf::render(rows, exported_at)),
    }
}

/// `todos-20240131-153000.csv`
pub fn file_name(format: ExportFormat, exported_at: DateTime<Utc>) -> String {
    format!(
        "todos-{}.{}",
        exported_at.format("%Y%m%d-%H%M%S"),
        format.extension()
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ExportRow;
    use crate::models::{TagSummary, Todo, TodoPriority, TodoStatus};
    use chrono::{TimeZone, Utc};
    use sqlx::types::Json;
    use uuid::Uuid;

    pub fn row(title: &str, status: TodoStatus, tags: &[&str]) -> ExportRow {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        ExportRow {
            todo: Todo {
                id: Uuid::nil(),
                user_id: 1,
                category_id: None,
                title: title.to_string(),
                description: Some("Line one\nline \"two\"".to_string()),
                status,
                priority: TodoPriority::High,
                due_date: Some(Utc.with_ymd_and_hms(2024, 3, 5, 17, 0, 0).unwrap()),
                completed_at: None,
                position: 0,
                estimated_minutes: None,
                tags: Json(
                    tags.iter()
                        .map(|name| TagSummary {
                            id: Uuid::nil(),
                            name: name.to_string(),
                            color: None,
                        })
                        .collect(),
                ),
                created_at: created,
                updated_at: created,
                deleted_at: None,
            },
            category_name: Some("Work".to_string()),
        }
    }
}
