use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::todo::TodoStatus;

/// Corresponds to the `export_format` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "export_format", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

/// Corresponds to the `export_status` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "export_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Which todos go into an export.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ExportFilters {
    pub status: Option<TodoStatus>,
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub include_deleted: bool,
}

/// An export request and its outcome. The rendered file is fetched separately.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct ExportJob {
    pub id: Uuid,
    pub user_id: i32,
    pub format: ExportFormat,
    pub status: ExportStatus,
    pub filters: Json<ExportFilters>,
    pub file_name: Option<String>,
    pub row_count: Option<i32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExportInput {
    pub format: ExportFormat,
    #[serde(default)]
    pub filters: ExportFilters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_export_input_defaults() {
        let input: CreateExportInput = serde_json::from_value(json!({"format": "markdown"})).unwrap();
        assert_eq!(input.format, ExportFormat::Markdown);
        assert_eq!(input.filters, ExportFilters::default());
        assert!(serde_json::from_value::<CreateExportInput>(json!({"format": "docx"})).is_err());
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ExportFormat::Markdown.extension(), "md");
        assert_eq!(ExportFormat::Pdf.content_type(), "application/pdf");
    }
}
