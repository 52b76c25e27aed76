//! Answer-style inference.
//!
//! Questions such as "list the top 3 risks" or "answer in 2 sentences" carry a
//! formatting request. We detect it and turn it into an explicit instruction
//! for the model.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_REQUESTED_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    Bullets,
    Numbered,
    Lines,
    Prose,
}

/// Requested style plus an optional item/sentence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleHint {
    pub style: AnswerStyle,
    pub count: Option<u32>,
}

fn verb_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:top|give me|list|into|in|show|summarize|provide)\s+(\d{1,2})\b")
            .expect("count pattern should compile")
    })
}

fn noun_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})\s+(?:bullets?|points?|items?|numbered|sentences?)\b")
            .expect("count pattern should compile")
    })
}

fn top_n_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\btop\s+\d+\b").expect("top-n pattern should compile"))
}

impl StyleHint {
    /// Infer the requested style from a question.
    pub fn infer(question: &str) -> Self {
        let q = question.trim().to_lowercase();

        let count = verb_count_pattern()
            .captures(&q)
            .or_else(|| noun_count_pattern().captures(&q))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());

        let style = if ["bullet", "points", "as a list"].iter().any(|k| q.contains(k))
            || q.starts_with("list ")
        {
            AnswerStyle::Bullets
        } else if q.contains("numbered") || top_n_pattern().is_match(&q) {
            AnswerStyle::Numbered
        } else if ["each on a new line", "separate lines", "new line", "line by line"]
            .iter()
            .any(|k| q.contains(k))
        {
            AnswerStyle::Lines
        } else {
            AnswerStyle::Prose
        };

        Self { style, count }
    }

    fn effective_count(&self) -> Option<u32> {
        self.count.filter(|n| (1..=MAX_REQUESTED_COUNT).contains(n))
    }

    /// Formatting instruction handed to the model.
    pub fn instruction(&self) -> String {
        let count = self.effective_count();
        match self.style {
            AnswerStyle::Bullets => {
                let amount = count
                    .map(|n| format!("Write exactly {} bullet points.", n))
                    .unwrap_or_else(|| "Write 3 to 5 bullet points.".to_string());
                format!(
                    "Format the answer strictly as bullet points using '- ' at the start of each line. \
                     Each bullet should be one concise sentence. {} \
                     Do not include a preamble or conclusion. \
                     End each bullet with the source markers of the context items used.",
                    amount
                )
            }
            AnswerStyle::Numbered => {
                let amount = count
                    .map(|n| format!("Write exactly {} numbered items.", n))
                    .unwrap_or_else(|| "Write 3 to 5 numbered items.".to_string());
                format!(
                    "Format the answer strictly as a numbered list using '1.', '2.', '3.' at the start of lines. \
                     Each item should be one concise sentence. {} \
                     Do not include a preamble or conclusion. \
                     End each item with the source markers of the context items used.",
                    amount
                )
            }
            AnswerStyle::Lines => {
                let amount = count
                    .map(|n| format!("Write exactly {} sentences.", n))
                    .unwrap_or_else(|| "Write 3 sentences.".to_string());
                format!(
                    "Write clear sentences, each on its own line. {} \
                     Append source markers at the end of sentences where relevant.",
                    amount
                )
            }
            AnswerStyle::Prose => "Write a concise answer in 3 to 5 sentences. \
                 Respect any formatting hints in the question. \
                 Include source markers inline where appropriate."
                .to_string(),
        }
    }
}
