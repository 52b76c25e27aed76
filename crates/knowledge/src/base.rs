//! A named knowledge base: configuration, embedding model and index store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use finrag_core::{AppConfig, AppError, AppResult};
use finrag_prompt::PromptBudget;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::chunker::{content_hash, Chunker};
use crate::config::{self, KnowledgeBaseConfig};
use crate::embeddings::{create_provider, EmbeddingProvider, ModelIdentity};
use crate::index::{EmbeddingIndexer, IndexSnapshot, IndexStore, SnapshotBuilder};
use crate::ingest::{discover_filings, prepare_filing, prepare_record, PreparedDocument};
use crate::rag::{AnswerOptions, Retriever};
use crate::types::{BaseStats, FilingInput, IngestReport, SkippedDocument};

#[derive(Debug)]
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    identity: ModelIdentity,
    chunker: Chunker,
    store: Arc<IndexStore>,
    indexer: EmbeddingIndexer,
}

impl KnowledgeBase {
    /// Open `base_name` under `workspace` with its configured embedding
    /// provider. A missing index starts empty.
    pub fn open(workspace: &Path, base_name: &str) -> AppResult<Self> {
        let config = config::load_config(workspace, base_name)?;
        config.validate()?;
        let provider = create_provider(&config.embedding)?;
        let path = config::get_index_path(workspace, base_name);
        Self::open_at(&path, config, provider)
    }

    /// Open the index file at `path` with an explicit provider.
    pub fn open_at(path: &Path, config: KnowledgeBaseConfig, provider: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        config.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = IndexStore::open(path, config.embedding.identity(), config.chunking())?;
        Self::from_store(config, provider, store)
    }

    /// A base that is never written to disk.
    pub fn in_memory(config: KnowledgeBaseConfig, provider: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        config.validate()?;
        let store = IndexStore::in_memory(config.embedding.identity(), config.chunking());
        Self::from_store(config, provider, store)
    }

    fn from_store(
        config: KnowledgeBaseConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: IndexStore,
    ) -> AppResult<Self> {
        let identity = config.embedding.identity();
        if provider.dimensions() != identity.dimensions {
            return Err(AppError::Config(format!(
                "Embedding provider {} produces {} dimensions, configuration says {}",
                provider.provider_name(),
                provider.dimensions(),
                identity.dimensions
            )));
        }
        let chunker = Chunker::from_params(config.chunking())?;
        let indexer = EmbeddingIndexer::new(
            provider,
            config.embedding.retry_policy(),
            config.embedding.batch_size,
        );
        Ok(Self {
            config,
            identity,
            chunker,
            store: Arc::new(store),
            indexer,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.store.snapshot()
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.store),
            self.indexer.clone(),
            self.identity.clone(),
        )
    }

    /// Answer settings from this base's retrieval knobs and the completion
    /// settings in `app`.
    pub fn answer_options(&self, app: &AppConfig) -> AnswerOptions {
        AnswerOptions {
            top_k: self.config.top_k,
            min_relevance: self.config.min_relevance,
            budget: PromptBudget {
                max_chars: self.config.prompt_budget_chars,
                max_passage_chars: self.config.max_passage_chars,
                ..PromptBudget::default()
            },
            model: app.model.clone(),
            temperature: app.temperature,
            completion_policy: app.completion_policy(),
        }
    }

    /// Fail with a configuration error if the stored index was built by a
    /// different embedding model.
    pub fn ensure_compatible(&self) -> AppResult<()> {
        self.snapshot().ensure_compatible(&self.identity)
    }

    /// Discover filings under `root` and ingest them.
    pub async fn ingest_dir(&self, root: &Path) -> AppResult<IngestReport> {
        let found = discover_filings(root)?;
        let mut report = self.ingest(found.filings).await?;
        report.documents_skipped.extend(found.skipped);
        Ok(report)
    }

    /// Add filings to the index.
    ///
    /// Documents are prepared concurrently and isolated from each other: one
    /// that fails to parse is reported as skipped. A document already indexed
    /// with the same content and chunking is left alone; a changed one replaces
    /// its previous chunks.
    #[tracing::instrument(skip(self, filings), fields(base = %self.config.name, filings = filings.len()))]
    pub async fn ingest(&self, filings: Vec<FilingInput>) -> AppResult<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..IngestReport::default()
        };

        let current = self.snapshot();
        current.ensure_compatible(&self.identity)?;
        let same_chunking = current.chunking() == self.config.chunking();

        let mut seen = HashSet::new();
        let mut todo = Vec::new();
        for filing in filings {
            let id = filing.meta.id().to_string();
            if !seen.insert(id.clone()) {
                report.documents_skipped.push(SkippedDocument {
                    origin: filing.origin,
                    document_id: Some(id),
                    reason: "duplicate document id in this run".to_string(),
                });
                continue;
            }
            let unchanged = same_chunking
                && current
                    .document(&id)
                    .is_some_and(|d| d.content_hash == content_hash(filing.raw.as_bytes()));
            if unchanged {
                report.documents_unchanged += 1;
                continue;
            }
            todo.push(filing);
        }

        if !same_chunking && current.document_count() > 0 {
            warn!(
                indexed = ?current.chunking(),
                configured = ?self.config.chunking(),
                "Chunking parameters changed; run a rebuild to re-chunk documents not in this run"
            );
        }

        let indexer = &self.indexer;
        let chunker = self.chunker;
        let mut prepared: Vec<(usize, FilingOutcome)> = stream::iter(todo.into_iter().enumerate())
            .map(|(position, filing)| async move {
                let origin = filing.origin.clone();
                let id = filing.meta.id().to_string();
                let outcome = match prepare_filing(filing, chunker, indexer).await {
                    Ok(document) => FilingOutcome::Ready(document),
                    Err(err) => FilingOutcome::Failed(SkippedDocument {
                        origin,
                        document_id: Some(id),
                        reason: err.to_string(),
                    }),
                };
                (position, outcome)
            })
            .buffer_unordered(self.config.ingest_concurrency)
            .collect()
            .await;
        // Input order decides ingestion order, and with it tie-breaking.
        prepared.sort_by_key(|(position, _)| *position);

        let mut ready = Vec::new();
        for (_, outcome) in prepared {
            match outcome {
                FilingOutcome::Ready(document) => ready.push(document),
                FilingOutcome::Failed(skipped) => {
                    warn!(
                        origin = %skipped.origin,
                        reason = %skipped.reason,
                        "Skipping filing"
                    );
                    report.documents_skipped.push(skipped);
                }
            }
        }

        if ready.is_empty() {
            report.snapshot_version = current.version();
        } else {
            let writer = self.store.write().await;
            let base = writer.base();
            let mut builder = SnapshotBuilder::from_snapshot(&base, self.identity.clone(), self.config.chunking())?;
            apply_documents(&mut builder, ready, &mut report)?;
            let published = writer.commit(builder.finish()).await?;
            report.snapshot_version = published.version();
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            indexed = report.documents_indexed,
            unchanged = report.documents_unchanged,
            skipped = report.documents_skipped.len(),
            chunks = report.chunks_indexed,
            gaps = report.coverage_gaps.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Regenerate the whole index from the registered documents with the
    /// current chunking and embedding model. Readers keep the old snapshot
    /// until the new one is published.
    #[tracing::instrument(skip(self), fields(base = %self.config.name))]
    pub async fn rebuild(&self) -> AppResult<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            ..IngestReport::default()
        };

        let writer = self.store.write().await;
        let base = writer.base();

        // Keep the previous ingestion order.
        let first_seq: HashMap<&str, u64> = base.records().iter().rev().map(|r| (r.chunk.document_id.as_str(), r.seq)).collect();
        let mut documents: Vec<_> = base.documents().cloned().collect();
        documents.sort_by_key(|d| (first_seq.get(d.id()).copied().unwrap_or(u64::MAX), d.ingested_at));

        let indexer = &self.indexer;
        let chunker = self.chunker;
        let ready: Vec<PreparedDocument> = stream::iter(documents)
            .map(|record| prepare_record(record, chunker, indexer))
            .buffered(self.config.ingest_concurrency)
            .collect()
            .await;

        let mut builder = SnapshotBuilder::empty(base.version(), self.identity.clone(), self.config.chunking());
        apply_documents(&mut builder, ready, &mut report)?;
        let published = writer.commit(builder.finish()).await?;

        report.snapshot_version = published.version();
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            documents = report.documents_indexed,
            chunks = report.chunks_indexed,
            gaps = report.coverage_gaps.len(),
            model = %self.identity,
            "Rebuild finished"
        );
        Ok(report)
    }

    /// Publish an empty snapshot. Returns the number of chunks removed.
    pub async fn clean(&self) -> AppResult<usize> {
        let identity = self.identity.clone();
        let chunking = self.config.chunking();
        let mut removed = 0;
        self.store
            .update(|base| {
                removed = base.len();
                Ok(SnapshotBuilder::empty(base.version(), identity, chunking).finish())
            })
            .await?;
        info!(base = %self.config.name, removed, "Knowledge base cleaned");
        Ok(removed)
    }

    pub fn stats(&self) -> BaseStats {
        let snapshot = self.snapshot();
        let db_size_bytes = self
            .index_path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        BaseStats {
            base_name: self.config.name.clone(),
            documents_count: snapshot.document_count(),
            superseded_count: snapshot.superseded_count(),
            chunks_count: snapshot.len(),
            coverage_gaps: snapshot.gaps().len(),
            snapshot_version: snapshot.version(),
            embedding_model: snapshot.identity().to_string(),
            metric: snapshot.identity().metric.as_str().to_string(),
            built_at: snapshot.built_at(),
            db_size_bytes,
        }
    }

    pub fn index_path(&self) -> Option<PathBuf> {
        self.store.path().map(Path::to_path_buf)
    }
}

enum FilingOutcome {
    Ready(PreparedDocument),
    Failed(SkippedDocument),
}

fn apply_documents(
    builder: &mut SnapshotBuilder,
    documents: Vec<PreparedDocument>,
    report: &mut IngestReport,
) -> AppResult<()> {
    for document in documents {
        builder.upsert_document(document.record);
        report.coverage_gaps.extend(document.embedded.gaps.iter().cloned());
        report.chunks_indexed += document.embedded.apply(builder)?;
        report.documents_indexed += 1;
    }
    Ok(())
}
