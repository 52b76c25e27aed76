//! Filing discovery and per-document preparation.
//!
//! Preparation (parse, chunk, embed) touches no shared state, so many
//! documents can be prepared at once. Only the final write into the index is
//! serialized, see [`crate::KnowledgeBase::ingest`].

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use finrag_core::{AppError, AppResult};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::chunker::{content_hash, Chunker};
use crate::index::{EmbeddedChunks, EmbeddingIndexer};
use crate::parser::parse_filing;
use crate::types::{Chunk, DocumentMeta, DocumentRecord, FilingInput, SkippedDocument};

const META_FILE: &str = "meta.json";
const SOURCE_CANDIDATES: &[&str] = &["source.htm", "source.html", "source.txt"];

/// `meta.json` written next to each downloaded filing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilingMetaFile {
    ticker: String,
    form: String,
    filing_date: String,
    accession: String,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default, alias = "primaryDocument")]
    primary_doc_url: Option<String>,
}

impl FilingMetaFile {
    fn into_meta(self) -> AppResult<DocumentMeta> {
        let filing_date = NaiveDate::parse_from_str(self.filing_date.trim(), "%Y-%m-%d")
            .map_err(|e| AppError::Parse(format!("Invalid filingDate {:?}: {}", self.filing_date, e)))?;
        if self.ticker.trim().is_empty() || self.accession.trim().is_empty() {
            return Err(AppError::Parse("ticker and accession are required".to_string()));
        }
        let mut meta = DocumentMeta::new(self.ticker, self.form, filing_date, self.accession.trim());
        meta.company = self.company_name;
        meta.url = self.primary_doc_url;
        Ok(meta)
    }
}

/// Filings found under a directory, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct DiscoveredFilings {
    pub filings: Vec<FilingInput>,
    pub skipped: Vec<SkippedDocument>,
}

/// Find every `meta.json` under `root` that has a sibling `source.htm`,
/// `source.html` or `source.txt`. Results are sorted by path.
pub fn discover_filings(root: &Path) -> AppResult<DiscoveredFilings> {
    if !root.is_dir() {
        return Err(AppError::Config(format!(
            "Filings directory does not exist: {}",
            root.display()
        )));
    }

    let mut meta_paths: Vec<_> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == META_FILE)
        .map(|e| e.into_path())
        .collect();
    meta_paths.sort();

    let mut found = DiscoveredFilings::default();
    for meta_path in meta_paths {
        let origin = meta_path
            .parent()
            .unwrap_or(root)
            .display()
            .to_string();
        match read_filing(&meta_path) {
            Ok(filing) => found.filings.push(filing),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "Skipping filing");
                found.skipped.push(SkippedDocument {
                    origin,
                    document_id: None,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        root = %root.display(),
        filings = found.filings.len(),
        skipped = found.skipped.len(),
        "Discovered filings"
    );
    Ok(found)
}

fn read_filing(meta_path: &Path) -> AppResult<FilingInput> {
    let dir = meta_path
        .parent()
        .ok_or_else(|| AppError::Parse(format!("{} has no parent directory", meta_path.display())))?;
    let content = fs::read_to_string(meta_path)?;
    let meta_file: FilingMetaFile = serde_json::from_str(&content)
        .map_err(|e| AppError::Parse(format!("Invalid {}: {}", meta_path.display(), e)))?;
    let meta = meta_file.into_meta()?;

    let source = SOURCE_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            AppError::Parse(format!(
                "No source.htm, source.html or source.txt in {}",
                dir.display()
            ))
        })?;
    let bytes = fs::read(&source)?;

    Ok(FilingInput {
        meta,
        raw: String::from_utf8_lossy(&bytes).into_owned(),
        origin: source.display().to_string(),
    })
}

/// A parsed filing and its chunks, before embedding.
#[derive(Debug, Clone)]
pub struct ParsedFiling {
    pub record: DocumentRecord,
    pub chunks: Vec<Chunk>,
}

/// Parse and chunk one filing. Parse failures are per-document.
pub fn parse_and_chunk(input: FilingInput, chunker: Chunker) -> AppResult<ParsedFiling> {
    let sections = parse_filing(&input.raw, &input.meta.form)?;
    let record = DocumentRecord {
        content_hash: content_hash(input.raw.as_bytes()),
        meta: input.meta,
        origin: input.origin,
        ingested_at: Utc::now(),
        sections,
    };
    let chunks = chunk_record(&record, chunker);
    Ok(ParsedFiling { record, chunks })
}

/// All chunks of a registered document, in section order.
pub fn chunk_record(record: &DocumentRecord, chunker: Chunker) -> Vec<Chunk> {
    record
        .sections
        .iter()
        .flat_map(|section| chunker.chunk(record.id(), section))
        .collect()
}

/// A document ready to be written into a snapshot.
#[derive(Debug)]
pub struct PreparedDocument {
    pub record: DocumentRecord,
    pub embedded: EmbeddedChunks,
}

/// Parse, chunk and embed one filing. Parsing runs on the blocking pool.
pub async fn prepare_filing(
    input: FilingInput,
    chunker: Chunker,
    indexer: &EmbeddingIndexer,
) -> AppResult<PreparedDocument> {
    let parsed = tokio::task::spawn_blocking(move || parse_and_chunk(input, chunker))
        .await
        .map_err(|e| AppError::Other(format!("Parser task failed: {}", e)))??;
    tracing::debug!(
        document.id = %parsed.record.id(),
        sections = parsed.record.sections.len(),
        chunks = parsed.chunks.len(),
        "Parsed filing"
    );
    let embedded = indexer.embed_chunks(parsed.chunks).await;
    Ok(PreparedDocument {
        record: parsed.record,
        embedded,
    })
}

/// Re-chunk and re-embed a registered document without its raw file.
pub async fn prepare_record(
    mut record: DocumentRecord,
    chunker: Chunker,
    indexer: &EmbeddingIndexer,
) -> PreparedDocument {
    let chunks = chunk_record(&record, chunker);
    record.ingested_at = Utc::now();
    let embedded = indexer.embed_chunks(chunks).await;
    PreparedDocument { record, embedded }
}
