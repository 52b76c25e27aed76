//! Filing knowledge base type definitions.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// SEC form type of a filing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormType {
    TenK,
    TenQ,
    Other(String),
}

impl FormType {
    pub fn as_str(&self) -> &str {
        match self {
            FormType::TenK => "10-K",
            FormType::TenQ => "10-Q",
            FormType::Other(s) => s,
        }
    }
}

impl From<String> for FormType {
    fn from(raw: String) -> Self {
        let normalized: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        match normalized.as_str() {
            "10K" | "10K/A" | "10K405" => FormType::TenK,
            "10Q" | "10Q/A" => FormType::TenQ,
            _ => FormType::Other(raw.trim().to_string()),
        }
    }
}

impl From<&str> for FormType {
    fn from(raw: &str) -> Self {
        FormType::from(raw.to_string())
    }
}

impl From<FormType> for String {
    fn from(form: FormType) -> Self {
        form.as_str().to_string()
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata of one filing, supplied by whoever fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub ticker: String,
    pub form: FormType,
    pub filing_date: NaiveDate,
    /// Accession number or URL. Doubles as the document id.
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DocumentMeta {
    pub fn new(
        ticker: impl Into<String>,
        form: impl Into<FormType>,
        filing_date: NaiveDate,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into().trim().to_uppercase(),
            form: form.into(),
            filing_date,
            source_id: source_id.into(),
            company: None,
            url: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.source_id
    }

    /// Human-readable label used in citations, e.g. `AAPL 10-K 2023-11-03`.
    pub fn label(&self) -> String {
        format!("{} {} {}", self.ticker, self.form, self.filing_date)
    }
}

/// A raw filing handed to ingestion.
#[derive(Debug, Clone)]
pub struct FilingInput {
    pub meta: DocumentMeta,
    pub raw: String,
    /// Where the raw content came from (path or URL), for reporting.
    pub origin: String,
}

/// A labeled region of a filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// e.g. `Item 1A. Risk Factors`
    pub label: String,
    /// Position within the document, starting at 0.
    pub ordinal: usize,
    pub page_start: u32,
    pub page_end: u32,
    /// Byte offsets into `text` where a new page begins.
    #[serde(default)]
    pub page_breaks: Vec<usize>,
    pub text: String,
}

impl Section {
    /// Page holding the byte at `offset`.
    pub fn page_at(&self, offset: usize) -> u32 {
        self.page_start + self.page_breaks.partition_point(|b| *b <= offset) as u32
    }
}

/// A registered filing together with its parsed sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub meta: DocumentMeta,
    /// SHA-256 of the raw content.
    pub content_hash: String,
    pub origin: String,
    pub ingested_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

impl DocumentRecord {
    pub fn id(&self) -> &str {
        self.meta.id()
    }
}

/// A bounded span of one section's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}:{section_ordinal}:{word_offset}`
    pub id: String,
    pub document_id: String,
    pub section_label: String,
    pub section_ordinal: usize,
    /// Word range within the section, end exclusive.
    pub word_start: usize,
    pub word_end: usize,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
    /// SHA-256 of `text`.
    pub content_hash: String,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.word_end - self.word_start
    }
}

/// A chunk that could not be embedded and is missing from the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub chunk_id: String,
    pub document_id: String,
    pub section: String,
    pub reason: String,
}

/// A filing left out of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub origin: String,
    pub document_id: Option<String>,
    pub reason: String,
}

/// Outcome of an ingestion or rebuild run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: String,
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    pub documents_skipped: Vec<SkippedDocument>,
    pub chunks_indexed: usize,
    pub coverage_gaps: Vec<CoverageGap>,
    pub snapshot_version: u64,
    pub duration_ms: u64,
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    pub base_name: String,
    pub documents_count: usize,
    pub superseded_count: usize,
    pub chunks_count: usize,
    pub coverage_gaps: usize,
    pub snapshot_version: u64,
    pub embedding_model: String,
    pub metric: String,
    pub built_at: Option<DateTime<Utc>>,
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_type_normalization() {
        assert_eq!(FormType::from("10-K"), FormType::TenK);
        assert_eq!(FormType::from("10k"), FormType::TenK);
        assert_eq!(FormType::from(" 10-Q "), FormType::TenQ);
        assert_eq!(FormType::from("8-K"), FormType::Other("8-K".to_string()));
        assert_eq!(FormType::TenQ.to_string(), "10-Q");
    }

    #[test]
    fn test_form_type_serde_as_string() {
        let json = serde_json::to_string(&FormType::TenK).unwrap();
        assert_eq!(json, "\"10-K\"");
        let parsed: FormType = serde_json::from_str("\"10-Q\"").unwrap();
        assert_eq!(parsed, FormType::TenQ);
    }

    #[test]
    fn test_document_label() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 3).unwrap();
        let meta = DocumentMeta::new("aapl", "10-K", date, "0000320193-23-000106");
        assert_eq!(meta.ticker, "AAPL");
        assert_eq!(meta.label(), "AAPL 10-K 2023-11-03");
        assert_eq!(meta.id(), "0000320193-23-000106");
    }

    #[test]
    fn test_section_page_at() {
        let section = Section {
            label: "Item 7".into(),
            ordinal: 2,
            page_start: 4,
            page_end: 6,
            page_breaks: vec![10, 20],
            text: "x".repeat(30),
        };
        assert_eq!(section.page_at(0), 4);
        assert_eq!(section.page_at(9), 4);
        assert_eq!(section.page_at(10), 5);
        assert_eq!(section.page_at(25), 6);
    }
}
