use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ExportRow;
use crate::error::AppError;

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    count: usize,
    todos: &'a [ExportRow],
}

pub fn render(rows: &[ExportRow], exported_at: DateTime<Utc>) -> Result<Vec<u8>, AppError> {
    let document = JsonExport {
        exported_at,
        count: rows.len(),
        todos: rows,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}
