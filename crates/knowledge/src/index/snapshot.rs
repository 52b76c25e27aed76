//! Immutable, versioned index snapshots and the builder that produces them.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use finrag_core::{AppError, AppResult};

use crate::chunker::ChunkingParams;
use crate::embeddings::ModelIdentity;
use crate::types::{Chunk, CoverageGap, DocumentRecord};

/// One embedding record with its chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Ingestion order; breaks score ties.
    pub seq: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Everything searchable at one point in time.
///
/// Snapshots are never mutated. Writers derive a [`SnapshotBuilder`] from the
/// current snapshot and publish the result as a new version.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    version: u64,
    identity: ModelIdentity,
    chunking: ChunkingParams,
    built_at: Option<DateTime<Utc>>,
    documents: BTreeMap<String, DocumentRecord>,
    records: Vec<IndexedChunk>,
    by_id: HashMap<String, usize>,
    superseded: HashSet<String>,
    gaps: Vec<CoverageGap>,
    next_seq: u64,
}

/// Raw snapshot contents as stored on disk.
#[derive(Debug)]
pub(crate) struct SnapshotParts {
    pub version: u64,
    pub identity: ModelIdentity,
    pub chunking: ChunkingParams,
    pub built_at: Option<DateTime<Utc>>,
    pub documents: Vec<DocumentRecord>,
    pub records: Vec<IndexedChunk>,
    pub gaps: Vec<CoverageGap>,
}

impl IndexSnapshot {
    /// Version 0: no documents, no records.
    pub fn empty(identity: ModelIdentity, chunking: ChunkingParams) -> Self {
        Self::from_parts(SnapshotParts {
            version: 0,
            identity,
            chunking,
            built_at: None,
            documents: Vec::new(),
            records: Vec::new(),
            gaps: Vec::new(),
        })
    }

    pub(crate) fn from_parts(parts: SnapshotParts) -> Self {
        let mut records = parts.records;
        records.sort_by_key(|r| r.seq);
        let by_id = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.chunk.id.clone(), idx))
            .collect();
        let next_seq = records.last().map(|r| r.seq + 1).unwrap_or(0);
        let documents: BTreeMap<String, DocumentRecord> = parts
            .documents
            .into_iter()
            .map(|d| (d.id().to_string(), d))
            .collect();
        let superseded = superseded_documents(&documents);

        Self {
            version: parts.version,
            identity: parts.identity,
            chunking: parts.chunking,
            built_at: parts.built_at,
            documents,
            records,
            by_id,
            superseded,
            gaps: parts.gaps,
            next_seq,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    pub fn chunking(&self) -> ChunkingParams {
        self.chunking
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// True when there is nothing to search.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records in ingestion order.
    pub fn records(&self) -> &[IndexedChunk] {
        &self.records
    }

    pub fn get(&self, chunk_id: &str) -> Option<&IndexedChunk> {
        self.by_id.get(chunk_id).map(|idx| &self.records[*idx])
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.values()
    }

    pub fn document(&self, id: &str) -> Option<&DocumentRecord> {
        self.documents.get(id)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// A newer filing of the same ticker and form exists.
    pub fn is_superseded(&self, document_id: &str) -> bool {
        self.superseded.contains(document_id)
    }

    pub fn superseded_count(&self) -> usize {
        self.superseded.len()
    }

    pub fn gaps(&self) -> &[CoverageGap] {
        &self.gaps
    }

    /// Fail unless vectors built by `configured` are comparable with this
    /// index. An empty index accepts any model.
    pub fn ensure_compatible(&self, configured: &ModelIdentity) -> AppResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.identity.ensure_matches(configured)
    }
}

/// For each ticker and form, every filing older than the newest.
fn superseded_documents(documents: &BTreeMap<String, DocumentRecord>) -> HashSet<String> {
    let mut newest: HashMap<(&str, &str), (&DocumentRecord, &str)> = HashMap::new();
    for (id, doc) in documents {
        let key = (doc.meta.ticker.as_str(), doc.meta.form.as_str());
        let replace = match newest.get(&key) {
            Some((current, _)) => doc.meta.filing_date > current.meta.filing_date,
            None => true,
        };
        if replace {
            newest.insert(key, (doc, id.as_str()));
        }
    }
    let latest: HashSet<&str> = newest.values().map(|(_, id)| *id).collect();
    documents
        .keys()
        .filter(|id| !latest.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Accumulates changes for the next snapshot version.
#[derive(Debug)]
pub struct SnapshotBuilder {
    base_version: u64,
    identity: ModelIdentity,
    chunking: ChunkingParams,
    documents: BTreeMap<String, DocumentRecord>,
    records: Vec<IndexedChunk>,
    by_id: HashMap<String, usize>,
    gaps: Vec<CoverageGap>,
    next_seq: u64,
}

impl SnapshotBuilder {
    /// Add-only append on top of `base`.
    ///
    /// A non-empty base built with a different model is a configuration
    /// error: mixing vectors from two models makes scores meaningless.
    pub fn from_snapshot(
        base: &IndexSnapshot,
        identity: ModelIdentity,
        chunking: ChunkingParams,
    ) -> AppResult<Self> {
        base.ensure_compatible(&identity)?;
        Ok(Self {
            base_version: base.version,
            identity,
            chunking,
            documents: base.documents.clone(),
            records: base.records.clone(),
            by_id: base.by_id.clone(),
            gaps: base.gaps.clone(),
            next_seq: base.next_seq,
        })
    }

    /// Start over: the next version of `base_version` with no content.
    pub fn empty(base_version: u64, identity: ModelIdentity, chunking: ChunkingParams) -> Self {
        Self {
            base_version,
            identity,
            chunking,
            documents: BTreeMap::new(),
            records: Vec::new(),
            by_id: HashMap::new(),
            gaps: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn contains_document(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// Register a document, dropping every chunk and coverage gap a previous
    /// version of it left behind.
    pub fn upsert_document(&mut self, record: DocumentRecord) {
        let id = record.id().to_string();
        self.drop_document_content(&id);
        self.documents.insert(id, record);
    }

    /// Remove a document and all of its chunks.
    pub fn remove_document(&mut self, id: &str) -> bool {
        self.drop_document_content(id);
        self.documents.remove(id).is_some()
    }

    fn drop_document_content(&mut self, id: &str) {
        let before = self.records.len();
        self.records.retain(|r| r.chunk.document_id != id);
        if self.records.len() != before {
            self.reindex();
        }
        self.gaps.retain(|g| g.document_id != id);
    }

    fn reindex(&mut self) {
        self.by_id = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.chunk.id.clone(), idx))
            .collect();
    }

    /// Insert a record. A colliding chunk id overwrites the prior record and
    /// keeps its ingestion position.
    pub fn upsert_record(&mut self, chunk: Chunk, vector: Vec<f32>) -> AppResult<()> {
        if !self.documents.contains_key(&chunk.document_id) {
            return Err(AppError::Index(format!(
                "Chunk {} references unknown document {}",
                chunk.id, chunk.document_id
            )));
        }
        if vector.len() != self.identity.dimensions {
            return Err(AppError::Index(format!(
                "Chunk {} has {} dimensions, index expects {}",
                chunk.id,
                vector.len(),
                self.identity.dimensions
            )));
        }

        match self.by_id.get(&chunk.id) {
            Some(idx) => {
                let record = &mut self.records[*idx];
                record.chunk = chunk;
                record.vector = vector;
            }
            None => {
                self.by_id.insert(chunk.id.clone(), self.records.len());
                self.records.push(IndexedChunk {
                    seq: self.next_seq,
                    chunk,
                    vector,
                });
                self.next_seq += 1;
            }
        }
        Ok(())
    }

    pub fn add_gap(&mut self, gap: CoverageGap) {
        self.gaps.retain(|g| g.chunk_id != gap.chunk_id);
        self.gaps.push(gap);
    }

    pub fn finish(self) -> IndexSnapshot {
        let superseded = superseded_documents(&self.documents);
        IndexSnapshot {
            version: self.base_version + 1,
            identity: self.identity,
            chunking: self.chunking,
            built_at: Some(Utc::now()),
            documents: self.documents,
            records: self.records,
            by_id: self.by_id,
            superseded,
            gaps: self.gaps,
            next_seq: self.next_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingConfig;
    use crate::types::DocumentMeta;
    use chrono::NaiveDate;

    fn identity(dimensions: usize) -> ModelIdentity {
        EmbeddingConfig {
            dimensions,
            ..EmbeddingConfig::default()
        }
        .identity()
    }

    fn params() -> ChunkingParams {
        ChunkingParams {
            chunk_size: 10,
            overlap: 2,
        }
    }

    fn document(id: &str, ticker: &str, date: (i32, u32, u32)) -> DocumentRecord {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        DocumentRecord {
            meta: DocumentMeta::new(ticker, "10-K", date, id),
            content_hash: "hash".to_string(),
            origin: "test".to_string(),
            ingested_at: Utc::now(),
            sections: Vec::new(),
        }
    }

    fn chunk(document_id: &str, offset: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("{}:0:{}", document_id, offset),
            document_id: document_id.to_string(),
            section_label: "Full Text".to_string(),
            section_ordinal: 0,
            word_start: offset,
            word_end: offset + 1,
            page_start: 1,
            page_end: 1,
            text: text.to_string(),
            content_hash: String::new(),
        }
    }

    #[test]
    fn test_colliding_ids_overwrite() {
        let base = IndexSnapshot::empty(identity(2), params());
        let mut builder = SnapshotBuilder::from_snapshot(&base, identity(2), params()).unwrap();
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        builder.upsert_record(chunk("d1", 0, "a"), vec![1.0, 0.0]).unwrap();
        builder.upsert_record(chunk("d1", 5, "b"), vec![0.0, 1.0]).unwrap();
        builder.upsert_record(chunk("d1", 0, "a2"), vec![0.5, 0.5]).unwrap();

        let snapshot = builder.finish();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.len(), 2);
        let first = snapshot.get("d1:0:0").unwrap();
        assert_eq!(first.chunk.text, "a2");
        assert_eq!(first.seq, 0);
    }

    #[test]
    fn test_upsert_document_replaces_chunks() {
        let base = IndexSnapshot::empty(identity(2), params());
        let mut builder = SnapshotBuilder::from_snapshot(&base, identity(2), params()).unwrap();
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        builder.upsert_record(chunk("d1", 0, "old"), vec![1.0, 0.0]).unwrap();
        builder.upsert_record(chunk("d1", 7, "stale"), vec![1.0, 0.0]).unwrap();
        let v1 = builder.finish();

        let mut builder = SnapshotBuilder::from_snapshot(&v1, identity(2), params()).unwrap();
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        builder.upsert_record(chunk("d1", 0, "new"), vec![0.0, 1.0]).unwrap();
        let v2 = builder.finish();

        assert_eq!(v2.version(), 2);
        assert_eq!(v2.len(), 1);
        assert!(v2.get("d1:0:7").is_none());
        assert_eq!(v1.len(), 2, "published snapshots never change");
    }

    #[test]
    fn test_remove_document_cascades() {
        let base = IndexSnapshot::empty(identity(2), params());
        let mut builder = SnapshotBuilder::from_snapshot(&base, identity(2), params()).unwrap();
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        builder.upsert_document(document("d2", "MSFT", (2023, 7, 27)));
        builder.upsert_record(chunk("d1", 0, "a"), vec![1.0, 0.0]).unwrap();
        builder.upsert_record(chunk("d2", 0, "b"), vec![0.0, 1.0]).unwrap();
        builder.add_gap(CoverageGap {
            chunk_id: "d1:0:9".to_string(),
            document_id: "d1".to_string(),
            section: "Full Text".to_string(),
            reason: "timeout".to_string(),
        });

        assert!(builder.remove_document("d1"));
        let snapshot = builder.finish();
        assert_eq!(snapshot.document_count(), 1);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("d2:0:0").is_some());
        assert!(snapshot.gaps().is_empty());
    }

    #[test]
    fn test_record_requires_document_and_dimensions() {
        let mut builder = SnapshotBuilder::empty(0, identity(2), params());
        assert!(builder.upsert_record(chunk("d1", 0, "a"), vec![1.0, 0.0]).is_err());
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        assert!(builder.upsert_record(chunk("d1", 0, "a"), vec![1.0]).is_err());
    }

    #[test]
    fn test_model_mismatch_rejected_for_non_empty_base() {
        let mut builder = SnapshotBuilder::empty(0, identity(2), params());
        builder.upsert_document(document("d1", "AAPL", (2023, 11, 3)));
        builder.upsert_record(chunk("d1", 0, "a"), vec![1.0, 0.0]).unwrap();
        let snapshot = builder.finish();

        let err = SnapshotBuilder::from_snapshot(&snapshot, identity(3), params()).unwrap_err();
        assert!(err.is_config());

        let empty = IndexSnapshot::empty(identity(2), params());
        assert!(SnapshotBuilder::from_snapshot(&empty, identity(3), params()).is_ok());
    }

    #[test]
    fn test_superseded_filings() {
        let mut builder = SnapshotBuilder::empty(0, identity(2), params());
        builder.upsert_document(document("old", "AAPL", (2022, 10, 28)));
        builder.upsert_document(document("new", "AAPL", (2023, 11, 3)));
        builder.upsert_document(document("msft", "MSFT", (2023, 7, 27)));
        let snapshot = builder.finish();

        assert!(snapshot.is_superseded("old"));
        assert!(!snapshot.is_superseded("new"));
        assert!(!snapshot.is_superseded("msft"));
        assert_eq!(snapshot.superseded_count(), 1);
    }
}
