use chrono::{DateTime, Utc};

use super::ExportRow;
use crate::models::TodoStatus;

/// Keeps user text from being interpreted as markdown structure.
fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '#' | '|' | '<' | '>') {
            out.push('\\');
        }
        out.push(if c == '\n' || c == '\r' { ' ' } else { c });
    }
    out
}

fn render_item(out: &mut String, row: &ExportRow, now: DateTime<Utc>) {
    let todo = &row.todo;
    let checkbox = if todo.status == TodoStatus::Completed {
        "[x]"
    } else {
        "[ ]"
    };
    out.push_str(&format!("- {} **{}**", checkbox, escape_inline(&todo.title)));

    let mut meta = vec![format!("priority: {}", todo.priority.as_str())];
    if let Some(due) = todo.due_date {
        meta.push(format!("due: {}", due.format("%Y-%m-%d %H:%M")));
        if todo.is_overdue(now) {
            meta.push("overdue".to_string());
        }
    }
    if let Some(category) = &row.category_name {
        meta.push(format!("category: {}", escape_inline(category)));
    }
    let tags = todo.tag_names();
    if !tags.is_empty() {
        let tags: Vec<String> = tags.iter().map(|t| format!("`{}`", t.replace('`', "'"))).collect();
        meta.push(format!("tags: {}", tags.join(" ")));
    }
    out.push_str(&format!(" ({})\n", meta.join(", ")));

    if let Some(description) = todo.description.as_deref().filter(|d| !d.trim().is_empty()) {
        for line in description.lines() {
            out.push_str(&format!("  > {}\n", escape_inline(line)));
        }
    }
}

pub fn render(rows: &[ExportRow], exported_at: DateTime<Utc>) -> String {
    let mut out = String::from("# Todo export\n\n");
    out.push_str(&format!(
        "_Exported {} · {} item(s)_\n",
        exported_at.format("%Y-%m-%d %H:%M UTC"),
        rows.len()
    ));

    for status in TodoStatus::ALL {
        let section: Vec<&ExportRow> = rows.iter().filter(|r| r.todo.status == status).collect();
        if section.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {} ({})\n\n", status.label(), section.len()));
        for row in section {
            render_item(&mut out, row, exported_at);
        }
    }
    out
}
