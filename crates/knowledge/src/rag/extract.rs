//! Sentence extraction for answers built without the completion model.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::rag::types::SearchHit;

/// Passages that look like a table of contents or an exhibit list.
const TOC_HINTS: &[&str] = &["table of contents", "exhibit", "index of", "item 1."];
const MIN_SENTENCE_CHARS: usize = 40;
const MAX_SENTENCE_CHARS: usize = 350;
/// Passages quoted at most.
const MAX_PASSAGES: usize = 3;
/// Placeholder for dots inside abbreviations such as "U.S.".
const ABBREVIATION_DOT: char = '\u{222F}';

fn abbreviation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:[A-Z]\.){2,}").expect("valid abbreviation regex"))
}

fn sentence_end_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"))
}

fn hyphen_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\s*\n\s*").expect("valid hyphenation regex"))
}

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-zA-Z]{3,}").expect("valid keyword regex"))
}

/// A sentence taken from a passage, with the passage's marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Extract {
    pub marker: String,
    pub sentence: String,
}

/// Pick the sentences of `hits` (in prompt order) that best match `query`.
///
/// Two sentences come from the first usable passage and one from each of
/// the next, up to three passages. Passages with the same document and page
/// span as an earlier one are skipped, as are table-of-contents passages.
pub fn extract(query: &str, hits: &[&SearchHit]) -> Vec<Extract> {
    let mut seen_pages = HashSet::new();
    let mut used = 0;
    let mut out = Vec::new();

    for hit in hits {
        let page_key = (
            hit.chunk.document_id.as_str(),
            hit.chunk.page_start,
            hit.chunk.page_end,
        );
        if !seen_pages.insert(page_key) {
            continue;
        }
        let wanted = if used == 0 { 2 } else { 1 };
        let sentences = best_sentences(query, &hit.chunk.text, wanted);
        if sentences.is_empty() {
            continue;
        }
        out.extend(sentences.into_iter().map(|sentence| Extract {
            marker: hit.rank.to_string(),
            sentence,
        }));
        used += 1;
        if used == MAX_PASSAGES {
            break;
        }
    }
    out
}

/// Up to `max` sentences of `text` sharing the most words with `query`,
/// best first and stable by position. Without any overlap the leading
/// sentences are used.
pub fn best_sentences(query: &str, text: &str, max: usize) -> Vec<String> {
    if looks_like_toc(text) {
        return Vec::new();
    }
    let sentences = split_sentences(text);
    let query_words = keywords(query);

    let mut scored: Vec<(usize, usize, String)> = sentences
        .into_iter()
        .enumerate()
        .map(|(i, s)| (keywords(&s).intersection(&query_words).count(), i, s))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    if scored.first().is_some_and(|(score, _, _)| *score == 0) {
        scored.sort_by_key(|(_, i, _)| *i);
    }
    scored.into_iter().take(max).map(|(_, _, s)| s).collect()
}

fn looks_like_toc(text: &str) -> bool {
    let lower = text.to_lowercase();
    TOC_HINTS.iter().any(|hint| lower.contains(hint))
}

fn keywords(text: &str) -> HashSet<String> {
    keyword_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let text = text.replace('\u{a0}', " ");
    let text = hyphen_break_regex().replace_all(&text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = abbreviation_regex().replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[0].replace('.', &ABBREVIATION_DOT.to_string())
    });

    let mut sentences = Vec::new();
    let mut start = 0;
    for end in sentence_end_regex().find_iter(&text) {
        sentences.push(&text[start..end.start() + 1]);
        start = end.end();
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(|s| s.trim().replace(ABBREVIATION_DOT, "."))
        .filter(|s| (MIN_SENTENCE_CHARS..=MAX_SENTENCE_CHARS).contains(&s.chars().count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_and_keeps_abbreviations() {
        let text = "Sales in the U.S. grew strongly during the fiscal year. Short one. \
                    Costs of components rose because of supplier concentration!";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "Sales in the U.S. grew strongly during the fiscal year.",
                "Costs of components rose because of supplier concentration!",
            ]
        );
    }

    #[test]
    fn test_best_sentences_prefer_query_words() {
        let text = "The company designs and sells phones and computers worldwide. \
                    Supplier concentration is a significant risk to our operations.";
        let picked = best_sentences("supplier concentration risk", text, 1);
        assert_eq!(picked, vec!["Supplier concentration is a significant risk to our operations."]);
    }

    #[test]
    fn test_no_overlap_falls_back_to_leading_sentences() {
        let text = "The company designs and sells phones and computers worldwide. \
                    Supplier concentration is a significant risk to our operations.";
        let picked = best_sentences("liquidity", text, 1);
        assert_eq!(picked, vec!["The company designs and sells phones and computers worldwide."]);
    }

    #[test]
    fn test_table_of_contents_is_skipped() {
        let text = "Table of Contents Item 1. Business 4 Item 1A. Risk Factors 12 and more text here.";
        assert!(best_sentences("risk factors", text, 2).is_empty());
    }

    #[test]
    fn test_hyphenated_line_breaks_are_joined() {
        let sentences = split_sentences("Our infor-\nmation systems could be disrupted by attacks on them.");
        assert_eq!(sentences, vec!["Our information systems could be disrupted by attacks on them."]);
    }
}
