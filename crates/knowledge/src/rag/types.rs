//! Retrieval and answer types.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::indicators::MacroFact;
use crate::types::{Chunk, DocumentMeta};

/// One ranked chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// 1-based position in the result.
    pub rank: usize,
    pub score: f32,
    /// Ingestion order of the record.
    pub seq: u64,
    pub document: DocumentMeta,
    pub chunk: Chunk,
}

impl SearchHit {
    pub fn document_label(&self) -> String {
        self.document.label()
    }

    /// `p.12` or `p.12–13`
    pub fn page_span(&self) -> String {
        page_span(self.chunk.page_start, self.chunk.page_end)
    }

    /// Provenance line placed above the passage in a prompt.
    pub fn header(&self) -> String {
        format!(
            "{}, {}, {}",
            self.document_label(),
            self.chunk.section_label,
            self.page_span()
        )
    }
}

fn page_span(start: u32, end: u32) -> String {
    if start == end {
        format!("p.{}", start)
    } else {
        format!("p.{}–{}", start, end)
    }
}

/// Ranked hits, best first, at most `k` long.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
    /// Snapshot the hits were read from.
    pub snapshot_version: u64,
    /// Records that passed the filter and were scored.
    pub candidates: usize,
}

impl RetrievalResult {
    pub fn empty(query: &str, snapshot_version: u64) -> Self {
        Self {
            query: query.to_string(),
            hits: Vec::new(),
            snapshot_version,
            candidates: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Highest score among the hits. Hint ordering may put it below rank 1.
    pub fn max_score(&self) -> Option<f32> {
        self.hits.iter().map(|h| h.score).reduce(f32::max)
    }

    /// Keep only hits scoring at least `min_score`.
    pub fn above(mut self, min_score: f32) -> Self {
        self.hits.retain(|h| h.score >= min_score);
        self
    }
}

/// A reference that can be printed next to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Citation {
    Filing {
        /// Rank of the passage, also its marker in the prompt.
        number: usize,
        document_id: String,
        document_label: String,
        section: String,
        page_start: u32,
        page_end: u32,
        chunk_id: String,
        score: f32,
        /// The passage was shortened to fit the prompt.
        #[serde(default)]
        truncated: bool,
    },
    Indicator {
        number: usize,
        indicator: String,
        series_id: String,
        name: String,
        latest_date: NaiveDate,
        prior_date: Option<NaiveDate>,
    },
}

impl Citation {
    pub fn from_hit(hit: &SearchHit, truncated: bool) -> Self {
        Citation::Filing {
            number: hit.rank,
            document_id: hit.chunk.document_id.clone(),
            document_label: hit.document_label(),
            section: hit.chunk.section_label.clone(),
            page_start: hit.chunk.page_start,
            page_end: hit.chunk.page_end,
            chunk_id: hit.chunk.id.clone(),
            score: hit.score,
            truncated,
        }
    }

    pub fn from_fact(number: usize, fact: &MacroFact) -> Self {
        let (latest_date, prior_date) = fact.cited_dates();
        Citation::Indicator {
            number,
            indicator: fact.indicator.clone(),
            series_id: fact.series_id.clone(),
            name: fact.name.clone(),
            latest_date,
            prior_date,
        }
    }

    /// Marker text without brackets: `3` or `M1`.
    pub fn marker(&self) -> String {
        match self {
            Citation::Filing { number, .. } => number.to_string(),
            Citation::Indicator { number, .. } => format!("M{}", number),
        }
    }

    /// Rendering without the marker, used to spot duplicates.
    pub fn reference(&self) -> String {
        match self {
            Citation::Filing {
                document_label,
                page_start,
                page_end,
                ..
            } => format!("{} {}", document_label, page_span(*page_start, *page_end)),
            Citation::Indicator {
                name,
                series_id,
                latest_date,
                prior_date,
                ..
            } => match prior_date {
                Some(prior) => format!("{} (FRED {}) {} vs {}", name, series_id, latest_date, prior),
                None => format!("{} (FRED {}) {}", name, series_id, latest_date),
            },
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.marker(), self.reference())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Written by the completion model from cited evidence.
    Grounded,
    /// The model was unavailable; macro facts are stated directly.
    FactsOnly,
    /// The model was unavailable; sentences are quoted from the included
    /// passages, with any macro facts stated first.
    Extractive,
    CannotAnswer,
}

/// Result of answering one question.
///
/// `citations` lists exactly the sources that were placed in the prompt, so
/// every reference is backed by an included passage or fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub status: AnswerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Highest similarity among the retrieved passages, 0.0 when none.
    pub max_score: f32,
}

impl Answer {
    pub fn cannot_answer(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            text: format!("Cannot answer: {}", reason),
            citations: Vec::new(),
            status: AnswerStatus::CannotAnswer,
            reason: Some(reason),
            max_score: 0.0,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.status != AnswerStatus::CannotAnswer
    }

    /// Citation lines for display, one per distinct document span or fact.
    pub fn source_lines(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.citations
            .iter()
            .filter(|c| seen.insert(c.reference()))
            .map(|c| c.to_string())
            .collect()
    }
}
