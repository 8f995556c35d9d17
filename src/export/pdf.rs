//! Minimal PDF 1.4 writer for todo exports.
//!
//! Output uses the standard Helvetica fonts (no embedding) with WinAnsi encoding,
//! A4 pages and one absolutely positioned text object per line. Characters outside
//! Latin-1 are replaced with `?`.

use chrono::{DateTime, Utc};

use super::ExportRow;
use crate::models::TodoStatus;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FOOTER_SIZE: f32 = 8.0;
/// Average Helvetica glyph width relative to the font size; used for wrapping.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Object numbers fixed by layout: catalog, page tree, then the two fonts.
const CATALOG: usize = 1;
const PAGES: usize = 2;
const FONT_REGULAR: usize = 3;
const FONT_BOLD: usize = 4;
const FIRST_PAGE_OBJECT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
struct Line {
    text: String,
    size: f32,
    bold: bool,
    indent: f32,
}

impl Line {
    fn new(text: impl Into<String>, size: f32, bold: bool, indent: f32) -> Self {
        Self {
            text: text.into(),
            size,
            bold,
            indent,
        }
    }

    fn blank() -> Self {
        Self::new("", 10.0, false, 0.0)
    }

    fn leading(&self) -> f32 {
        self.size * 1.4
    }
}

/// Greedy word wrap to `max_chars`; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(10);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn push_wrapped(lines: &mut Vec<Line>, text: &str, size: f32, bold: bool, indent: f32) {
    let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
    let max_chars = (usable / (size * AVG_GLYPH_WIDTH)) as usize;
    for part in wrap(text, max_chars) {
        lines.push(Line::new(part, size, bold, indent));
    }
}

fn layout(rows: &[ExportRow], exported_at: DateTime<Utc>) -> Vec<Line> {
    let mut lines = vec![
        Line::new("Todo export", 18.0, true, 0.0),
        Line::new(
            format!(
                "Exported {} - {} item(s)",
                exported_at.format("%Y-%m-%d %H:%M UTC"),
                rows.len()
            ),
            9.0,
            false,
            0.0,
        ),
        Line::blank(),
    ];

    for row in rows {
        let todo = &row.todo;
        let mark = if todo.status == TodoStatus::Completed {
            "[x]"
        } else {
            "[ ]"
        };
        push_wrapped(
            &mut lines,
            &format!("{} {}", mark, todo.title),
            11.0,
            true,
            0.0,
        );

        let mut meta = vec![
            format!("Status: {}", todo.status.label()),
            format!("Priority: {}", todo.priority.as_str()),
        ];
        if let Some(due) = todo.due_date {
            meta.push(format!("Due: {}", due.format("%Y-%m-%d %H:%M")));
        }
        if let Some(category) = &row.category_name {
            meta.push(format!("Category: {}", category));
        }
        let tags = todo.tag_names();
        if !tags.is_empty() {
            meta.push(format!("Tags: {}", tags.join(", ")));
        }
        push_wrapped(&mut lines, &meta.join(" | "), 9.0, false, 14.0);

        if let Some(description) = todo.description.as_deref() {
            for paragraph in description.lines().filter(|l| !l.trim().is_empty()) {
                push_wrapped(&mut lines, paragraph, 9.0, false, 14.0);
            }
        }
        lines.push(Line::blank());
    }
    lines
}

fn paginate(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let available = PAGE_HEIGHT - 2.0 * MARGIN - FOOTER_SIZE * 2.0;
    let mut pages = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    let mut used = 0.0;
    for line in lines {
        let height = line.leading();
        if used + height > available && !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += height;
        current.push(line);
    }
    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

/// Escapes text for a PDF literal string, emitting non-ASCII Latin-1 as octal escapes.
fn pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            // WinAnsi matches Latin-1 from 0xA0 upwards.
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => out.push('?'),
        }
    }
    out.push(')');
    out
}

fn content_stream(lines: &[Line], page_number: usize, page_count: usize) -> String {
    let mut stream = String::new();
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        y -= line.leading();
        if line.text.is_empty() {
            continue;
        }
        let font = if line.bold { "F2" } else { "F1" };
        stream.push_str(&format!(
            "BT /{} {:.1} Tf 1 0 0 1 {:.2} {:.2} Tm {} Tj ET\n",
            font,
            line.size,
            MARGIN + line.indent,
            y,
            pdf_string(&line.text)
        ));
    }
    stream.push_str(&format!(
        "BT /F1 {:.1} Tf 1 0 0 1 {:.2} {:.2} Tm {} Tj ET\n",
        FOOTER_SIZE,
        MARGIN,
        MARGIN / 2.0,
        pdf_string(&format!("Page {} of {}", page_number, page_count))
    ));
    stream
}

struct PdfWriter {
    buffer: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buffer = Vec::new();
        // Binary marker comment so transfer tools treat the file as binary.
        buffer.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buffer,
            offsets: Vec::new(),
        }
    }

    /// Objects must be written in ascending number order starting at 1.
    fn object(&mut self, number: usize, body: &str) {
        debug_assert_eq!(number, self.offsets.len() + 1);
        self.offsets.push(self.buffer.len());
        self.buffer
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }

    fn stream(&mut self, number: usize, data: &str) {
        let body = format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            data.len(),
            data
        );
        self.object(number, &body);
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let xref_offset = self.buffer.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len() + 1,
            root,
            xref_offset
        ));
        self.buffer.extend_from_slice(xref.as_bytes());
        self.buffer
    }
}

pub fn render(rows: &[ExportRow], exported_at: DateTime<Utc>) -> Vec<u8> {
    let pages = paginate(layout(rows, exported_at));
    let page_count = pages.len();
    // Page i uses objects FIRST_PAGE_OBJECT + 2i (page) and + 2i + 1 (content).
    let page_objects: Vec<usize> = (0..page_count)
        .map(|i| FIRST_PAGE_OBJECT + 2 * i)
        .collect();

    let mut writer = PdfWriter::new();
    writer.object(CATALOG, &format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES));
    let kids: Vec<String> = page_objects.iter().map(|n| format!("{} 0 R", n)).collect();
    writer.object(
        PAGES,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ),
    );
    writer.object(
        FONT_REGULAR,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    writer.object(
        FONT_BOLD,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (index, lines) in pages.iter().enumerate() {
        let page_object = page_objects[index];
        writer.object(
            page_object,
            &format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 {} 0 R /F2 {} 0 R >> >> /Contents {} 0 R >>",
                PAGES,
                PAGE_WIDTH,
                PAGE_HEIGHT,
                FONT_REGULAR,
                FONT_BOLD,
                page_object + 1
            ),
        );
        writer.stream(
            page_object + 1,
            &content_stream(lines, index + 1, page_count),
        );
    }

    writer.finish(CATALOG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::row;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn startxref(pdf: &[u8]) -> usize {
        let text = String::from_utf8_lossy(pdf);
        let tail = text.rsplit("startxref\n").next().unwrap();
        tail.lines().next().unwrap().trim().parse().unwrap()
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("one two three", 10), vec!["one two", "three"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(
            wrap("abcdefghijklmnopqrstuvwxyz", 10),
            vec!["abcdefghij", "klmnopqrst", "uvwxyz"]
        );
    }

    #[test]
    fn test_pdf_string_escaping() {
        assert_eq!(pdf_string("a(b)c\\"), "(a\\(b\\)c\\\\)");
        assert_eq!(pdf_string("café"), "(caf\\351)");
        assert_eq!(pdf_string("日本"), "(??)");
    }

    #[test]
    fn test_document_structure() {
        let pdf = render(&[row("Plan (draft)", TodoStatus::Pending, &["q1"])], Utc::now());
        assert!(pdf.starts_with(b"%PDF-1.4\n"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(find(&pdf, b"([ ] Plan \\(draft\\))").is_some());
        assert!(find(&pdf, b"/Count 1").is_some());

        let xref_at = startxref(&pdf);
        assert_eq!(&pdf[xref_at..xref_at + 4], b"xref");
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = render(&[row("One", TodoStatus::Pending, &[])], Utc::now());
        let xref_at = startxref(&pdf);
        let table = String::from_utf8_lossy(&pdf[xref_at..]).to_string();
        let entries: Vec<&str> = table.lines().skip(3).take_while(|l| l.ends_with(" n ")).collect();
        assert_eq!(entries.len(), 6);
        for (index, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", index + 1);
            assert!(pdf[offset..].starts_with(expected.as_bytes()));
        }
    }

    #[test]
    fn test_many_rows_paginate() {
        let rows: Vec<ExportRow> = (0..80)
            .map(|i| row(&format!("Todo {}", i), TodoStatus::Pending, &[]))
            .collect();
        let pdf = render(&rows, Utc::now());
        let text = String::from_utf8_lossy(&pdf);
        let count: usize = text
            .split("/Count ")
            .nth(1)
            .unwrap()
            .split(' ')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(count > 1);
        assert!(text.contains(&format!("(Page {} of {})", count, count)));
    }

    #[test]
    fn test_empty_export_still_has_a_page() {
        let pdf = render(&[], Utc::now());
        assert!(find(&pdf, b"/Count 1").is_some());
    }
}
