//! Prompt types.

use serde::{Deserialize, Serialize};

use crate::style::StyleHint;

/// A prompt definition, built in or loaded from `.finrag/prompts/<id>.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Grounding rules placed at the top of every prompt
    pub rules: String,

    /// Handlebars template. Variables: `rules`, `formatting`, `question`,
    /// `facts`, `context`.
    pub template: String,
}

/// One citable block of evidence: a macro fact or a retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSource {
    /// Marker text without brackets, e.g. `3` or `M1`.
    pub marker: String,
    /// Short provenance line, e.g. `AAPL 10-K 2023-11-03, Item 1A, pages 12-13`.
    pub header: String,
    pub body: String,
}

impl PromptSource {
    pub fn new(marker: impl Into<String>, header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            header: header.into(),
            body: body.into(),
        }
    }
}

/// Length limits, all measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    /// Ceiling for the whole rendered prompt.
    pub max_chars: usize,
    /// Cap for a single passage body.
    pub max_passage_chars: usize,
    /// A partially fitting passage is kept only if at least this much of its
    /// body survives.
    pub min_partial_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_chars: 12_000,
            max_passage_chars: 1_200,
            min_partial_chars: 200,
        }
    }
}

/// A source that made it into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedSource {
    pub marker: String,
    pub truncated: bool,
}

/// The grounded prompt handed to the completion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub text: String,
    pub prompt_id: String,
    pub style: StyleHint,
    /// Macro facts, always complete.
    pub facts: Vec<IncludedSource>,
    /// Passages in rank order. Only these may be cited.
    pub passages: Vec<IncludedSource>,
    /// Lower-ranked passages left out to honor the budget.
    pub passages_dropped: usize,
}

impl AssembledPrompt {
    /// Whether `marker` refers to something actually present in the prompt.
    pub fn includes(&self, marker: &str) -> bool {
        self.facts
            .iter()
            .chain(self.passages.iter())
            .any(|s| s.marker == marker)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
