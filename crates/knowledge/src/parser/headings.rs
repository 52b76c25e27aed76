//! Item heading tables per form type.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::FormType;

/// One recognized item heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingEntry {
    /// Part number (1 = Part I), only for forms whose item numbers repeat.
    pub part: Option<u8>,
    pub item: &'static str,
    pub title: &'static str,
}

impl HeadingEntry {
    pub fn label(&self) -> String {
        match self.part {
            Some(part) => format!("Part {}, Item {}. {}", roman(part), self.item, self.title),
            None => format!("Item {}. {}", self.item, self.title),
        }
    }
}

const fn item(item: &'static str, title: &'static str) -> HeadingEntry {
    HeadingEntry {
        part: None,
        item,
        title,
    }
}

const fn part_item(part: u8, item: &'static str, title: &'static str) -> HeadingEntry {
    HeadingEntry {
        part: Some(part),
        item,
        title,
    }
}

const TEN_K: &[HeadingEntry] = &[
    item("1", "Business"),
    item("1A", "Risk Factors"),
    item("1B", "Unresolved Staff Comments"),
    item("1C", "Cybersecurity"),
    item("2", "Properties"),
    item("3", "Legal Proceedings"),
    item("4", "Mine Safety Disclosures"),
    item("5", "Market for Registrant's Common Equity, Related Stockholder Matters and Issuer Purchases of Equity Securities"),
    item("6", "[Reserved]"),
    item("7", "Management's Discussion and Analysis of Financial Condition and Results of Operations"),
    item("7A", "Quantitative and Qualitative Disclosures About Market Risk"),
    item("8", "Financial Statements and Supplementary Data"),
    item("9", "Changes in and Disagreements with Accountants on Accounting and Financial Disclosure"),
    item("9A", "Controls and Procedures"),
    item("9B", "Other Information"),
    item("9C", "Disclosure Regarding Foreign Jurisdictions that Prevent Inspections"),
    item("10", "Directors, Executive Officers and Corporate Governance"),
    item("11", "Executive Compensation"),
    item("12", "Security Ownership of Certain Beneficial Owners and Management and Related Stockholder Matters"),
    item("13", "Certain Relationships and Related Transactions, and Director Independence"),
    item("14", "Principal Accountant Fees and Services"),
    item("15", "Exhibits and Financial Statement Schedules"),
    item("16", "Form 10-K Summary"),
];

const TEN_Q: &[HeadingEntry] = &[
    part_item(1, "1", "Financial Statements"),
    part_item(1, "2", "Management's Discussion and Analysis of Financial Condition and Results of Operations"),
    part_item(1, "3", "Quantitative and Qualitative Disclosures About Market Risk"),
    part_item(1, "4", "Controls and Procedures"),
    part_item(2, "1", "Legal Proceedings"),
    part_item(2, "1A", "Risk Factors"),
    part_item(2, "2", "Unregistered Sales of Equity Securities and Use of Proceeds"),
    part_item(2, "3", "Defaults Upon Senior Securities"),
    part_item(2, "4", "Mine Safety Disclosures"),
    part_item(2, "5", "Other Information"),
    part_item(2, "6", "Exhibits"),
];

/// The structural markers a form type is known to use.
#[derive(Debug, Clone, Copy)]
pub struct HeadingTable {
    entries: &'static [HeadingEntry],
    qualified_by_part: bool,
}

impl HeadingTable {
    pub fn for_form(form: &FormType) -> Self {
        match form {
            FormType::TenK => Self {
                entries: TEN_K,
                qualified_by_part: false,
            },
            FormType::TenQ => Self {
                entries: TEN_Q,
                qualified_by_part: true,
            },
            FormType::Other(_) => Self {
                entries: &[],
                qualified_by_part: false,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry for `item` under the current part. Before any part
    /// marker has been seen, Part I is assumed.
    pub fn lookup(&self, part: Option<u8>, item: &str) -> Option<&'static HeadingEntry> {
        let wanted_part = if self.qualified_by_part {
            Some(part.unwrap_or(1))
        } else {
            None
        };
        self.entries
            .iter()
            .find(|e| e.item.eq_ignore_ascii_case(item) && e.part == wanted_part)
    }
}

/// A line that carries document structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralLine {
    /// `PART II` on its own.
    Part(u8),
    /// `Item 1A. Risk Factors`, optionally prefixed by its part.
    Item { part: Option<u8>, item: String },
}

const MAX_HEADING_LEN: usize = 200;

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:part\s+(i{1,3}|iv)\s*[,.:\-–—]?\s*)?item\s+(\d{1,2}[a-c]?)\b\s*[.:\-–—]?",
        )
        .expect("item heading regex is valid")
    })
}

fn part_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*part\s+(i{1,3}|iv)\b\s*(?:[.:\-–—]|$)")
            .expect("part heading regex is valid")
    })
}

/// Recognize heading lines. Long headings are prose.
pub fn classify_line(line: &str) -> Option<StructuralLine> {
    if let Some(caps) = item_re().captures(line) {
        if heading_end(line, caps.get(0)?.end()) > MAX_HEADING_LEN {
            return None;
        }
        let part = caps.get(1).and_then(|m| parse_roman(m.as_str()));
        let item = caps.get(2)?.as_str().to_ascii_uppercase();
        return Some(StructuralLine::Item { part, item });
    }
    if line.len() <= 100 {
        if let Some(caps) = part_re().captures(line) {
            return caps
                .get(1)
                .and_then(|m| parse_roman(m.as_str()))
                .map(StructuralLine::Part);
        }
    }
    None
}

/// Byte offset where the heading on an item line ends: just past the first
/// sentence break after the item marker, or the end of the line.
fn heading_end(line: &str, marker_end: usize) -> usize {
    line[marker_end..]
        .find(". ")
        .map_or(line.len(), |i| marker_end + i + 1)
}

/// Body text sharing a line with an item heading, as in
/// `Item 1A. Risk Factors. Supplier concentration could ...`.
pub fn same_line_body(line: &str) -> Option<&str> {
    let marker_end = item_re().find(line)?.end();
    let body = line[heading_end(line, marker_end)..].trim();
    (!body.is_empty()).then_some(body)
}

fn parse_roman(s: &str) -> Option<u8> {
    match s.to_ascii_uppercase().as_str() {
        "I" => Some(1),
        "II" => Some(2),
        "III" => Some(3),
        "IV" => Some(4),
        _ => None,
    }
}

fn roman(part: u8) -> &'static str {
    match part {
        1 => "I",
        2 => "II",
        3 => "III",
        _ => "IV",
    }
}
