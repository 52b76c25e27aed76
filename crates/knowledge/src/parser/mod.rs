//! Filing parser: raw 10-K/10-Q content to ordered, labeled sections.
//!
//! The parser is generic over a [`HeadingTable`] and the raw text; form types
//! only differ in the table they supply. Text between two recognized item
//! headings belongs to the earlier one. Filings without recognizable headings
//! come back as one "Full Text" section.

pub mod headings;
pub mod html;

use finrag_core::{AppError, AppResult};

pub use headings::{classify_line, same_line_body, HeadingEntry, HeadingTable, StructuralLine};
pub use html::{html_to_text, looks_like_html, PAGE_BREAK};

use crate::types::{FormType, Section};

pub const COVER_PAGE_LABEL: &str = "Cover Page";
pub const FULL_TEXT_LABEL: &str = "Full Text";

/// Parse a raw filing into sections in reading order.
///
/// Empty, whitespace-only and binary input fail with [`AppError::Parse`];
/// callers skip that filing and continue.
pub fn parse_filing(raw: &str, form: &FormType) -> AppResult<Vec<Section>> {
    if raw.contains('\0') {
        return Err(AppError::Parse("Binary content is not a filing".to_string()));
    }
    if raw.trim().is_empty() {
        return Err(AppError::Parse("Filing is empty".to_string()));
    }

    let text = if looks_like_html(raw) {
        html_to_text(raw)
    } else {
        mark_plain_page_breaks(raw)
    };
    let text = normalize_whitespace(&text);
    let mut lines = paginate(&text);

    if !lines.iter().any(|l| !l.text.trim().is_empty()) {
        return Err(AppError::Parse("Filing has no text content".to_string()));
    }

    let table = HeadingTable::for_form(form);
    let headings = if table.is_empty() {
        Vec::new()
    } else {
        find_headings(&mut lines, &table)
    };

    let mut sections = Vec::new();
    if headings.is_empty() {
        push_section(&mut sections, FULL_TEXT_LABEL.to_string(), &lines);
        tracing::debug!(form = %form, "No item headings recognized, using full text");
        return Ok(sections);
    }

    push_section(
        &mut sections,
        COVER_PAGE_LABEL.to_string(),
        &lines[..headings[0].line],
    );
    for (i, heading) in headings.iter().enumerate() {
        let end = headings.get(i + 1).map(|h| h.line).unwrap_or(lines.len());
        push_section(&mut sections, heading.label.clone(), &lines[heading.line..end]);
    }

    tracing::debug!(form = %form, sections = sections.len(), "Parsed filing");
    Ok(sections)
}

#[derive(Debug)]
struct Line<'a> {
    text: &'a str,
    /// 1-based page the line sits on.
    page: u32,
    /// Page break lines carry no text.
    is_break: bool,
    /// `PART II` style lines; structure only, never section text.
    is_part: bool,
    /// A recognized item heading; only `inline_body` is section text.
    is_heading: bool,
    /// Text following the heading on the same line.
    inline_body: Option<&'a str>,
}

#[derive(Debug)]
struct Heading {
    line: usize,
    label: String,
}

/// Plain-text pagination hints: form feeds and `<PAGE>` lines.
fn mark_plain_page_breaks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim().eq_ignore_ascii_case("<page>") {
            out.push(PAGE_BREAK);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn is_page_break(line: &str) -> bool {
    line.strip_prefix(PAGE_BREAK) == Some("")
}

/// NBSP to space, runs of spaces and tabs collapsed, lines right-trimmed,
/// three or more newlines collapsed to one blank line. Page breaks are moved
/// onto lines of their own.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace('\u{a0}', " ").replace('\r', "");
    let text = text.replace(PAGE_BREAK, &format!("\n{}\n", PAGE_BREAK));

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if is_page_break(line) {
            blank_run = 0;
            out.push(PAGE_BREAK);
            out.push('\n');
            continue;
        }

        let mut collapsed = String::with_capacity(line.len());
        let mut last_space = false;
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' {
                if !last_space {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(ch);
                last_space = false;
            }
        }
        let collapsed = collapsed.trim_end();

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(collapsed);
        out.push('\n');
    }
    out
}

fn paginate(text: &str) -> Vec<Line<'_>> {
    let mut page = 1;
    text.lines()
        .map(|line| {
            let is_break = is_page_break(line);
            if is_break {
                page += 1;
            }
            Line {
                text: line,
                page,
                is_break,
                is_part: false,
                is_heading: false,
                inline_body: None,
            }
        })
        .collect()
}

/// Locate real item headings. A marker whose body (up to the next marker) has
/// no alphabetic text is a table-of-contents entry and is ignored.
fn find_headings(lines: &mut [Line<'_>], table: &HeadingTable) -> Vec<Heading> {
    let mut current_part: Option<u8> = None;
    let mut markers: Vec<(usize, Option<&'static HeadingEntry>)> = Vec::new();

    for (idx, line) in lines.iter_mut().enumerate() {
        if line.is_break {
            continue;
        }
        match classify_line(line.text) {
            Some(StructuralLine::Part(part)) => {
                current_part = Some(part);
                line.is_part = true;
                markers.push((idx, None));
            }
            Some(StructuralLine::Item { part, item }) => {
                if let Some(part) = part {
                    current_part = Some(part);
                }
                if let Some(entry) = table.lookup(current_part, &item) {
                    line.inline_body = same_line_body(line.text);
                    markers.push((idx, Some(entry)));
                }
            }
            None => {}
        }
    }

    let mut headings = Vec::new();
    for (i, (idx, entry)) in markers.iter().enumerate() {
        let Some(entry) = entry else { continue };
        let end = markers.get(i + 1).map(|(next, _)| *next).unwrap_or(lines.len());
        let substantive = lines[*idx].inline_body.is_some()
            || lines[idx + 1..end]
                .iter()
                .any(|l| !l.is_break && l.text.chars().any(char::is_alphabetic));
        if substantive {
            lines[*idx].is_heading = true;
            headings.push(Heading {
                line: *idx,
                label: entry.label(),
            });
        }
    }
    headings
}

/// Build a section from the non-blank `lines`, recording byte offsets where a
/// new page begins. Regions without text are not emitted.
fn push_section(sections: &mut Vec<Section>, label: String, lines: &[Line<'_>]) {
    let mut text = String::new();
    let mut page_start = 1;
    let mut page_breaks = Vec::new();

    for line in lines {
        if line.is_break {
            if !text.is_empty() {
                page_breaks.push(text.len());
            }
            continue;
        }
        let content = if line.is_heading {
            line.inline_body.unwrap_or("")
        } else {
            line.text
        };
        if line.is_part || content.trim().is_empty() {
            continue;
        }
        if text.is_empty() {
            page_start = line.page;
        } else {
            text.push('\n');
        }
        text.push_str(content);
    }

    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    if text.is_empty() {
        return;
    }
    page_breaks.retain(|b| *b < text.len());

    sections.push(Section {
        label,
        ordinal: sections.len(),
        page_start,
        page_end: page_start + page_breaks.len() as u32,
        page_breaks,
        text,
    });
}
