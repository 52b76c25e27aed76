//! HTML to plain text with page-break hints.

/// Stand-alone line marking a page boundary in extracted text.
pub const PAGE_BREAK: char = '\x0c';

const SKIPPED: &[&str] = &["script", "style", "noscript", "head"];

const BLOCK: &[&str] = &[
    "p", "div", "br", "tr", "li", "ul", "ol", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    "section", "article", "blockquote", "pre", "center", "title",
];

/// Heuristic check for markup.
pub fn looks_like_html(raw: &str) -> bool {
    let lower = raw
        .get(..raw.len().min(4096))
        .unwrap_or(raw)
        .to_ascii_lowercase();
    ["<html", "<body", "<div", "<p>", "<p ", "<table", "<br", "<font", "<span", "<!doctype"]
        .iter()
        .any(|tag| lower.contains(tag))
}

/// Strip markup. Block elements end a line and table cells are separated by
/// a space. Page-break hints become a line holding only [`PAGE_BREAK`].
pub fn html_to_text(raw: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `raw`.
    let lower = raw.to_ascii_lowercase();
    let mut out = String::with_capacity(raw.len() / 2);
    let mut pending_after: Vec<String> = Vec::new();
    let mut pos = 0;

    while let Some(rel) = raw[pos..].find('<') {
        let lt = pos + rel;
        out.push_str(&decode_entities(&raw[pos..lt]));

        if lower[lt..].starts_with("<!--") {
            pos = match lower[lt..].find("-->") {
                Some(end) => lt + end + 3,
                None => raw.len(),
            };
            continue;
        }

        let Some(gt_rel) = raw[lt..].find('>') else {
            out.push_str(&decode_entities(&raw[lt..]));
            pos = raw.len();
            break;
        };
        let gt = lt + gt_rel;
        let tag = &lower[lt + 1..gt];
        pos = gt + 1;

        let closing = tag.starts_with('/');
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        if !closing && SKIPPED.contains(&name.as_str()) {
            let close = format!("</{}", name);
            pos = match lower[pos..].find(&close) {
                Some(end) => {
                    let close_at = pos + end;
                    lower[close_at..]
                        .find('>')
                        .map(|g| close_at + g + 1)
                        .unwrap_or(raw.len())
                }
                None => raw.len(),
            };
            continue;
        }

        if closing {
            if pending_after.last() == Some(&name) {
                pending_after.pop();
                push_page_break(&mut out);
            }
        } else {
            let style: String = tag.chars().filter(|c| !c.is_whitespace()).collect();
            if name == "hr" || style.contains("page-break-before") || style.contains("break-before:page") {
                push_page_break(&mut out);
            }
            if style.contains("page-break-after") || style.contains("break-after:page") {
                if tag.ends_with('/') {
                    push_page_break(&mut out);
                } else {
                    pending_after.push(name.clone());
                }
            }
        }

        if BLOCK.contains(&name.as_str()) {
            out.push('\n');
        } else if closing && (name == "td" || name == "th") {
            out.push(' ');
        }
    }

    if pos < raw.len() {
        out.push_str(&decode_entities(&raw[pos..]));
    }
    out
}

fn push_page_break(out: &mut String) {
    out.push('\n');
    out.push(PAGE_BREAK);
    out.push('\n');
}

/// Decode the common named entities and numeric character references.
/// Unknown entities are left as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&after[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "rsquo" | "lsquo" => Some('\''),
        "ldquo" | "rdquo" => Some('"'),
        "mdash" => Some('\u{2014}'),
        "ndash" => Some('\u{2013}'),
        "sect" => Some('\u{a7}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_scripts() {
        let input = "<html><head><title>x</title></head><body><script>var a = 1;</script>\
                     <p>Hello <b>world</b></p></body></html>";
        let output = html_to_text(input);
        assert_eq!(output.trim(), "Hello world");
    }

    #[test]
    fn test_block_tags_break_lines() {
        let output = html_to_text("<div>Item 1A.</div><div>Risk Factors</div>");
        let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["Item 1A.", "Risk Factors"]);
    }

    #[test]
    fn test_table_cells_share_a_line() {
        let output = html_to_text("<table><tr><td>Item 7.</td><td>MD&amp;A</td></tr></table>");
        assert!(output.contains("Item 7. MD&A"));
    }

    #[test]
    fn test_page_break_styles() {
        let input = "<p>one</p><div style=\"page-break-before: always\"></div><p>two</p>\
                     <hr/><p>three</p>";
        let output = html_to_text(input);
        assert_eq!(output.matches(PAGE_BREAK).count(), 2);
        let first = output.find(PAGE_BREAK).unwrap();
        assert!(output.find("one").unwrap() < first && first < output.find("two").unwrap());
    }

    #[test]
    fn test_page_break_after_closes_element() {
        let output = html_to_text("<p style=\"page-break-after:always\">end of page</p><p>next</p>");
        let brk = output.find(PAGE_BREAK).unwrap();
        assert!(output.find("end of page").unwrap() < brk);
        assert!(brk < output.find("next").unwrap());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("AT&amp;T &lt;b&gt; &#39;x&#39; &#x41;"), "AT&T <b> 'x' A");
        assert_eq!(decode_entities("R&D costs"), "R&D costs");
        assert_eq!(decode_entities("a&nbsp;b"), "a\u{a0}b");
    }

    #[test]
    fn test_unterminated_tag_is_text() {
        assert_eq!(html_to_text("revenue < costs"), "revenue < costs");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<HTML><BODY>x</BODY></HTML>"));
        assert!(!looks_like_html("ITEM 1. BUSINESS\nWe make things."));
    }
}
