//! Chunk embedding with bounded retries and coverage-gap accounting.

use std::sync::Arc;

use finrag_core::{AppError, AppResult, RetryPolicy};
use tracing::{debug, warn};

use crate::embeddings::EmbeddingProvider;
use crate::index::snapshot::SnapshotBuilder;
use crate::types::{Chunk, CoverageGap};

/// Chunks with their vectors, plus the chunks that could not be embedded.
#[derive(Debug, Default)]
pub struct EmbeddedChunks {
    pub embedded: Vec<(Chunk, Vec<f32>)>,
    pub gaps: Vec<CoverageGap>,
}

impl EmbeddedChunks {
    /// Write the records and gaps into `builder`. Returns the number of
    /// records written.
    pub fn apply(self, builder: &mut SnapshotBuilder) -> AppResult<usize> {
        let count = self.embedded.len();
        for (chunk, vector) in self.embedded {
            builder.upsert_record(chunk, vector)?;
        }
        for gap in self.gaps {
            builder.add_gap(gap);
        }
        Ok(count)
    }
}

/// Computes one vector per chunk through a fixed embedding model.
#[derive(Debug, Clone)]
pub struct EmbeddingIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl EmbeddingIndexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            provider,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed and append `chunks` to `builder`. Chunks that fail after the
    /// bounded retries are recorded as coverage gaps, not errors.
    pub async fn index(&self, builder: &mut SnapshotBuilder, chunks: Vec<Chunk>) -> AppResult<EmbeddedSummary> {
        let embedded = self.embed_chunks(chunks).await;
        let gaps = embedded.gaps.clone();
        let indexed = embedded.apply(builder)?;
        Ok(EmbeddedSummary { indexed, gaps })
    }

    /// Embed in batches. A failed batch falls back to one call per chunk so a
    /// single bad chunk only costs itself.
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> EmbeddedChunks {
        let mut out = EmbeddedChunks::default();
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            match self.embed_batch(&texts).await {
                Ok(vectors) => {
                    out.embedded.extend(batch.into_iter().zip(vectors));
                }
                Err(err) => {
                    debug!(batch = texts.len(), error = %err, "Batch embedding failed, retrying chunks one by one");
                    for chunk in batch {
                        match self.embed_one(&chunk.text).await {
                            Ok(vector) => out.embedded.push((chunk, vector)),
                            Err(err) => {
                                warn!(
                                    chunk.id = %chunk.id,
                                    document.id = %chunk.document_id,
                                    error = %err,
                                    "Coverage gap: chunk could not be embedded"
                                );
                                out.gaps.push(CoverageGap {
                                    chunk_id: chunk.id,
                                    document_id: chunk.document_id,
                                    section: chunk.section_label,
                                    reason: err.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        out
    }

    /// Embed a query or any other free text with the index's model.
    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let provider = &self.provider;
        let vectors = self
            .policy
            .run("embed batch", || provider.embed_batch(texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &vectors {
            self.check_dimensions(vector)?;
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let provider = &self.provider;
        let vector = self.policy.run("embed", || provider.embed(text)).await?;
        self.check_dimensions(&vector)?;
        Ok(vector)
    }

    fn check_dimensions(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.provider.dimensions() {
            return Err(AppError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.provider.dimensions(),
                vector.len()
            )));
        }
        Ok(())
    }
}

/// Outcome of [`EmbeddingIndexer::index`].
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSummary {
    pub indexed: usize,
    pub gaps: Vec<CoverageGap>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingParams;
    use crate::embeddings::EmbeddingConfig;
    use crate::types::{DocumentMeta, DocumentRecord};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails every batch containing "poison"; one-off calls for "flaky" fail
    /// once before succeeding.
    #[derive(Debug, Default)]
    struct FlakyProvider {
        flaky_calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn provider_name(&self) -> &str {
            "trigram"
        }
        fn model_name(&self) -> &str {
            "trigram-v1"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(AppError::Upstream("poisoned batch".to_string()));
            }
            if texts.len() == 1 && texts[0].contains("flaky") {
                if self.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(AppError::Upstream("connection reset".to_string()));
                }
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(offset: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("d1:0:{}", offset),
            document_id: "d1".to_string(),
            section_label: "Item 7".to_string(),
            section_ordinal: 0,
            word_start: offset,
            word_end: offset + 1,
            page_start: 1,
            page_end: 1,
            text: text.to_string(),
            content_hash: String::new(),
        }
    }

    fn indexer(provider: Arc<dyn EmbeddingProvider>) -> EmbeddingIndexer {
        let policy = RetryPolicy::new(2, Duration::from_secs(5))
            .with_initial_backoff(Duration::from_millis(1));
        EmbeddingIndexer::new(provider, policy, 2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_becomes_coverage_gap() {
        let indexer = indexer(Arc::new(FlakyProvider::default()));
        let result = indexer
            .embed_chunks(vec![
                chunk(0, "fine"),
                chunk(1, "poison pill"),
                chunk(2, "flaky text"),
                chunk(3, "also fine"),
            ])
            .await;

        let ids: Vec<&str> = result.embedded.iter().map(|(c, _)| c.id.as_str()).collect();
        assert_eq!(ids, vec!["d1:0:0", "d1:0:2", "d1:0:3"]);
        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].chunk_id, "d1:0:1");
        assert_eq!(result.gaps[0].section, "Item 7");
    }

    #[tokio::test]
    async fn test_index_writes_into_builder() {
        let identity = EmbeddingConfig {
            dimensions: 2,
            ..EmbeddingConfig::default()
        }
        .identity();
        let mut builder = SnapshotBuilder::empty(
            0,
            identity,
            ChunkingParams {
                chunk_size: 10,
                overlap: 2,
            },
        );
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        builder.upsert_document(DocumentRecord {
            meta: DocumentMeta::new("MSFT", "10-Q", date, "d1"),
            content_hash: String::new(),
            origin: "test".to_string(),
            ingested_at: Utc::now(),
            sections: Vec::new(),
        });

        let indexer = indexer(Arc::new(FlakyProvider::default()));
        let summary = indexer
            .index(&mut builder, vec![chunk(0, "one"), chunk(1, "two"), chunk(2, "three")])
            .await
            .unwrap();

        assert_eq!(summary.indexed, 3);
        assert!(summary.gaps.is_empty());
        assert_eq!(builder.finish().len(), 3);
    }
}
