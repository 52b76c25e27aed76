//! Filtered similarity search over an index snapshot.
//!
//! The filter is evaluated against the document registry before any vector
//! is scored, so `k` always refers to the filtered population.

use std::collections::HashSet;
use std::sync::Arc;

use finrag_core::AppResult;
use serde::{Deserialize, Serialize};

use crate::embeddings::ModelIdentity;
use crate::index::{EmbeddingIndexer, IndexSnapshot, IndexStore};
use crate::rag::types::{RetrievalResult, SearchHit};
use crate::types::{DocumentRecord, FormType};

/// Restricts which filings take part in a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Upper-case tickers; empty means any.
    #[serde(default)]
    pub tickers: Vec<String>,

    #[serde(default)]
    pub forms: Vec<FormType>,

    /// Calendar year of the filing date.
    #[serde(default)]
    pub filed_year: Option<i32>,

    /// Skip filings superseded by a newer one of the same ticker and form.
    #[serde(default)]
    pub latest_only: bool,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, ticker: impl AsRef<str>) -> Self {
        let ticker = ticker.as_ref().trim().to_uppercase();
        if !ticker.is_empty() && !self.tickers.contains(&ticker) {
            self.tickers.push(ticker);
        }
        self
    }

    pub fn with_tickers<I, S>(self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tickers.into_iter().fold(self, |f, t| f.with_ticker(t))
    }

    pub fn with_form(mut self, form: impl Into<FormType>) -> Self {
        let form = form.into();
        if !self.forms.contains(&form) {
            self.forms.push(form);
        }
        self
    }

    pub fn filed_in(mut self, year: i32) -> Self {
        self.filed_year = Some(year);
        self
    }

    pub fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    /// True when the filter lets everything through.
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
            && self.forms.is_empty()
            && self.filed_year.is_none()
            && !self.latest_only
    }

    fn admits(&self, document: &DocumentRecord, superseded: bool) -> bool {
        use chrono::Datelike;

        let meta = &document.meta;
        if !self.tickers.is_empty() && !self.tickers.contains(&meta.ticker) {
            return false;
        }
        if !self.forms.is_empty() && !self.forms.contains(&meta.form) {
            return false;
        }
        if let Some(year) = self.filed_year {
            if meta.filing_date.year() != year {
                return false;
            }
        }
        !(self.latest_only && superseded)
    }

    /// Ids of the documents in `snapshot` that pass the filter.
    pub fn admitted_documents<'a>(&self, snapshot: &'a IndexSnapshot) -> HashSet<&'a str> {
        snapshot
            .documents()
            .filter(|d| self.admits(d, snapshot.is_superseded(d.id())))
            .map(|d| d.id())
            .collect()
    }
}

/// Embeds queries and ranks indexed chunks against them.
#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<IndexStore>,
    indexer: EmbeddingIndexer,
    identity: ModelIdentity,
}

impl Retriever {
    /// `identity` must describe the model behind `indexer`; it is compared
    /// with the snapshot's identity on every search.
    pub fn new(store: Arc<IndexStore>, indexer: EmbeddingIndexer, identity: ModelIdentity) -> Self {
        Self {
            store,
            indexer,
            identity,
        }
    }

    /// The snapshot the next search would read.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.store.snapshot()
    }

    /// Search the current snapshot.
    pub async fn search(&self, query: &str, k: usize, filter: &SearchFilter) -> AppResult<RetrievalResult> {
        let snapshot = self.snapshot();
        self.search_in(&snapshot, query, k, filter).await
    }

    /// Search a specific snapshot.
    ///
    /// An index built by a different model is a configuration error. An empty
    /// index, blank query or `k == 0` gives an empty result.
    #[tracing::instrument(skip(self, snapshot, filter), fields(snapshot.version = snapshot.version()))]
    pub async fn search_in(
        &self,
        snapshot: &IndexSnapshot,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> AppResult<RetrievalResult> {
        snapshot.ensure_compatible(&self.identity)?;

        let query = query.trim();
        if query.is_empty() || snapshot.is_empty() || k == 0 {
            return Ok(RetrievalResult::empty(query, snapshot.version()));
        }

        let admitted = if filter.is_empty() {
            None
        } else {
            Some(filter.admitted_documents(snapshot))
        };
        let candidates: Vec<usize> = snapshot
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                admitted
                    .as_ref()
                    .map_or(true, |ids| ids.contains(r.chunk.document_id.as_str()))
            })
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            tracing::debug!(?filter, "No indexed chunks pass the filter");
            return Ok(RetrievalResult::empty(query, snapshot.version()));
        }

        let query_vector = self.indexer.embed_query(query).await?;
        let metric = snapshot.identity().metric;
        let records = snapshot.records();

        let mut scored: Vec<(f32, u64, usize)> = candidates
            .iter()
            .map(|&idx| {
                let record = &records[idx];
                (metric.score(&query_vector, &record.vector), record.seq, idx)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .enumerate()
            .filter_map(|(position, (score, seq, idx))| {
                let record = &records[idx];
                let document = snapshot.document(&record.chunk.document_id)?;
                Some(SearchHit {
                    rank: position + 1,
                    score,
                    seq,
                    document: document.meta.clone(),
                    chunk: record.chunk.clone(),
                })
            })
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            hits = hits.len(),
            max_score = hits.first().map(|h| h.score),
            "Ranked chunks"
        );

        Ok(RetrievalResult {
            query: query.to_string(),
            hits,
            snapshot_version: snapshot.version(),
            candidates: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingParams;
    use crate::embeddings::{create_provider, EmbeddingConfig};
    use crate::index::SnapshotBuilder;
    use crate::types::{Chunk, DocumentMeta};
    use chrono::{NaiveDate, Utc};
    use finrag_core::RetryPolicy;
    use std::time::Duration;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            dimensions: 128,
            ..EmbeddingConfig::default()
        }
    }

    fn params() -> ChunkingParams {
        ChunkingParams {
            chunk_size: 50,
            overlap: 5,
        }
    }

    fn document(ticker: &str, form: &str, date: (i32, u32, u32), id: &str) -> DocumentRecord {
        DocumentRecord {
            meta: DocumentMeta::new(
                ticker,
                form,
                NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                id,
            ),
            content_hash: id.to_string(),
            origin: "test".to_string(),
            ingested_at: Utc::now(),
            sections: Vec::new(),
        }
    }

    fn chunk(document_id: &str, offset: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("{}:0:{}", document_id, offset),
            document_id: document_id.to_string(),
            section_label: "Item 7".to_string(),
            section_ordinal: 0,
            word_start: offset,
            word_end: offset + 10,
            page_start: 1,
            page_end: 1,
            text: text.to_string(),
            content_hash: String::new(),
        }
    }

    async fn retriever_with(entries: &[(DocumentRecord, Vec<&str>)]) -> Retriever {
        let config = config();
        let provider = create_provider(&config).unwrap();
        let indexer = EmbeddingIndexer::new(
            provider,
            RetryPolicy::new(1, Duration::from_secs(5)),
            8,
        );
        let store = Arc::new(IndexStore::in_memory(config.identity(), params()));

        let mut builder = SnapshotBuilder::empty(0, config.identity(), params());
        for (doc, texts) in entries {
            let id = doc.id().to_string();
            builder.upsert_document(doc.clone());
            let chunks = texts
                .iter()
                .enumerate()
                .map(|(i, t)| chunk(&id, i * 10, t))
                .collect();
            indexer.index(&mut builder, chunks).await.unwrap();
        }
        let next = builder.finish();
        store.write().await.commit(next).await.unwrap();

        Retriever::new(store, indexer, config.identity())
    }

    #[tokio::test]
    async fn test_scores_are_non_increasing_and_bounded() {
        let retriever = retriever_with(&[(
            document("AAPL", "10-K", (2023, 11, 3), "a1"),
            vec![
                "supply chain disruption risk",
                "foreign currency exchange rates",
                "net sales increased in services",
                "risk of litigation and regulatory action",
                "research and development expense",
            ],
        )])
        .await;

        for k in 0..7 {
            let result = retriever
                .search("risk of supply disruption", k, &SearchFilter::new())
                .await
                .unwrap();
            assert!(result.len() <= k);
            for pair in result.hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
            for (i, hit) in result.hits.iter().enumerate() {
                assert_eq!(hit.rank, i + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_filter_applies_before_ranking() {
        let retriever = retriever_with(&[
            (
                document("AAPL", "10-K", (2023, 11, 3), "a1"),
                vec!["iphone demand", "iphone margins", "iphone supply"],
            ),
            (
                document("MSFT", "10-K", (2023, 7, 27), "m1"),
                vec!["cloud revenue growth"],
            ),
        ])
        .await;

        let filter = SearchFilter::new().with_ticker("msft");
        let result = retriever.search("iphone demand", 3, &filter).await.unwrap();

        assert_eq!(result.candidates, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].document.ticker, "MSFT");
    }

    #[tokio::test]
    async fn test_latest_only_and_year_filters() {
        let retriever = retriever_with(&[
            (
                document("AAPL", "10-K", (2022, 10, 28), "old"),
                vec!["services revenue"],
            ),
            (
                document("AAPL", "10-K", (2023, 11, 3), "new"),
                vec!["services revenue"],
            ),
        ])
        .await;

        let latest = retriever
            .search("services revenue", 5, &SearchFilter::new().latest_only())
            .await
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest.hits[0].chunk.document_id, "new");

        let year = retriever
            .search("services revenue", 5, &SearchFilter::new().filed_in(2022))
            .await
            .unwrap();
        assert_eq!(year.len(), 1);
        assert_eq!(year.hits[0].chunk.document_id, "old");
    }

    #[tokio::test]
    async fn test_ties_go_to_earlier_ingested() {
        let retriever = retriever_with(&[(
            document("AAPL", "10-K", (2023, 11, 3), "a1"),
            vec!["identical passage", "identical passage", "identical passage"],
        )])
        .await;

        let result = retriever
            .search("identical passage", 3, &SearchFilter::new())
            .await
            .unwrap();
        let seqs: Vec<u64> = result.hits.iter().map(|h| h.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_query_and_empty_index() {
        let retriever = retriever_with(&[]).await;
        assert!(retriever
            .search("anything", 3, &SearchFilter::new())
            .await
            .unwrap()
            .is_empty());

        let retriever = retriever_with(&[(
            document("AAPL", "10-K", (2023, 11, 3), "a1"),
            vec!["text"],
        )])
        .await;
        assert!(retriever
            .search("   ", 3, &SearchFilter::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_model_mismatch_is_config_error() {
        let retriever = retriever_with(&[(
            document("AAPL", "10-K", (2023, 11, 3), "a1"),
            vec!["text"],
        )])
        .await;

        let other = EmbeddingConfig {
            dimensions: 64,
            ..config()
        };
        let provider = create_provider(&other).unwrap();
        let indexer = EmbeddingIndexer::new(provider, RetryPolicy::default(), 8);
        let mismatched = Retriever::new(Arc::clone(&retriever.store), indexer, other.identity());

        let err = mismatched
            .search("text", 3, &SearchFilter::new())
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_filter_builders() {
        let filter = SearchFilter::new()
            .with_tickers(["aapl", "AAPL", " msft "])
            .with_form("10-k");
        assert_eq!(filter.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(filter.forms, vec![FormType::TenK]);
        assert!(!filter.is_empty());
        assert!(SearchFilter::new().is_empty());
    }
}
