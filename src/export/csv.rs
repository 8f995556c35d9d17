//! CSV output following RFC 4180: comma separated, CRLF line endings, fields
//! quoted when they contain a comma, quote or line break.

use super::{format_timestamp, ExportRow};

const HEADER: [&str; 10] = [
    "id",
    "title",
    "description",
    "status",
    "priority",
    "category",
    "tags",
    "due_date",
    "completed_at",
    "created_at",
];

pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_record(out: &mut String, fields: &[String]) {
    let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

pub fn render(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
    write_record(&mut out, &header);

    for row in rows {
        let todo = &row.todo;
        write_record(
            &mut out,
            &[
                todo.id.to_string(),
                todo.title.clone(),
                todo.description.clone().unwrap_or_default(),
                todo.status.as_str().to_string(),
                todo.priority.as_str().to_string(),
                row.category_name.clone().unwrap_or_default(),
                todo.tag_names().join(";"),
                format_timestamp(todo.due_date),
                format_timestamp(todo.completed_at),
                format_timestamp(Some(todo.created_at)),
            ],
        );
    }
    out
}
