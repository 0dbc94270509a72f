//! Rendering of errors against the source text they point into.

use std::fmt::Write;
use std::ops::Range;

use text_lines::TextLines;
use unicode_width::UnicodeWidthStr;

/// 1-based line and display column of a byte offset.
pub fn line_and_column(src: &str, offset: usize) -> (usize, usize) {
    let offset = clamp_to_char_boundary(src, offset);
    let lines = TextLines::new(src);
    let line_index = lines.line_and_column_index(offset).line_index;
    let line_start = lines.line_start(line_index);
    (line_index + 1, src[line_start..offset].width() + 1)
}

fn clamp_to_char_boundary(src: &str, mut offset: usize) -> usize {
    offset = offset.min(src.len());
    while !src.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Render a message with a snippet of the offending line and a caret
/// underline, in the style of `rustc`:
///
/// ```text
/// error: cannot find `y` in this scope [unresolved-name]
///  --> <eval>:1:7
///   |
/// 1 | print(y);
///   |       ^
/// ```
pub fn render(src: &str, file: &str, level: &str, message: &str, span: Range<usize>) -> String {
    let start = clamp_to_char_boundary(src, span.start);
    let end = clamp_to_char_boundary(src, span.end.max(start));

    let (line, column) = line_and_column(src, start);
    let lines = TextLines::new(src);
    let line_start = lines.line_start(line - 1);
    let line_text = src[line_start..].lines().next().unwrap_or("");
    let line_end = line_start + line_text.len();

    let underline_end = end.min(line_end).max(start);
    let carets = src[start..underline_end].width().max(1);

    let line_no = line.to_string();
    let gutter = " ".repeat(line_no.len());

    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", level, message);
    let _ = writeln!(out, "{}--> {}:{}:{}", gutter, file, line, column);
    let _ = writeln!(out, "{} |", gutter);
    let _ = writeln!(out, "{} | {}", line_no, line_text);
    let _ = writeln!(
        out,
        "{} | {}{}",
        gutter,
        " ".repeat(column - 1),
        "^".repeat(carets)
    );
    out
}
