//! Holder of the current snapshot.
//!
//! Readers clone an `Arc` and keep working against the version they started
//! with. Writers are serialized by an async mutex and publish by swapping the
//! `Arc` after the new version is on disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use finrag_core::{AppError, AppResult};
use tokio::sync::{Mutex, MutexGuard};

use crate::chunker::ChunkingParams;
use crate::embeddings::ModelIdentity;
use crate::index::persist::{load_snapshot, save_snapshot};
use crate::index::snapshot::IndexSnapshot;

#[derive(Debug)]
pub struct IndexStore {
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl IndexStore {
    /// Open the index at `path`, or start an empty one with the given identity.
    pub fn open(path: &Path, identity: ModelIdentity, chunking: ChunkingParams) -> AppResult<Self> {
        let snapshot = match load_snapshot(path)? {
            Some(snapshot) => snapshot,
            None => IndexSnapshot::empty(identity, chunking),
        };
        tracing::debug!(
            path = %path.display(),
            snapshot.version = snapshot.version(),
            "Opened index store"
        );
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            path: Some(path.to_path_buf()),
        })
    }

    /// A store that is never persisted.
    pub fn in_memory(identity: ModelIdentity, chunking: ChunkingParams) -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::empty(identity, chunking))),
            writer: Mutex::new(()),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current snapshot. Holding it keeps that version alive regardless
    /// of later writes.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Become the only writer until the returned handle is dropped.
    pub async fn write(&self) -> IndexWriter<'_> {
        let guard = self.writer.lock().await;
        IndexWriter {
            store: self,
            _guard: guard,
        }
    }

    /// Build the next snapshot from the current one, persist it and publish it.
    pub async fn update<F>(&self, build: F) -> AppResult<Arc<IndexSnapshot>>
    where
        F: FnOnce(&IndexSnapshot) -> AppResult<IndexSnapshot>,
    {
        let writer = self.write().await;
        let base = writer.base();
        let next = build(base.as_ref())?;
        writer.commit(next).await
    }

    fn swap(&self, next: Arc<IndexSnapshot>) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
    }
}

/// Exclusive write access to an [`IndexStore`].
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    _guard: MutexGuard<'a, ()>,
}

impl IndexWriter<'_> {
    /// The snapshot to build on. Stable while this writer is held.
    pub fn base(&self) -> Arc<IndexSnapshot> {
        self.store.snapshot()
    }

    /// Persist `next` and make it current. On a persistence failure the
    /// previous snapshot stays current.
    pub async fn commit(self, next: IndexSnapshot) -> AppResult<Arc<IndexSnapshot>> {
        let next = Arc::new(next);
        if let Some(path) = self.store.path.clone() {
            let to_save = Arc::clone(&next);
            tokio::task::spawn_blocking(move || save_snapshot(&path, &to_save))
                .await
                .map_err(|e| AppError::Index(format!("Index writer task failed: {}", e)))??;
        }
        self.store.swap(Arc::clone(&next));
        tracing::info!(
            snapshot.version = next.version(),
            chunks = next.len(),
            documents = next.document_count(),
            "Published index snapshot"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingConfig;
    use crate::index::snapshot::SnapshotBuilder;
    use crate::types::{Chunk, DocumentMeta, DocumentRecord};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn identity() -> ModelIdentity {
        EmbeddingConfig {
            dimensions: 2,
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

    fn add_document(base: &IndexSnapshot, id: &str) -> AppResult<IndexSnapshot> {
        let mut builder = SnapshotBuilder::from_snapshot(base, identity(), params())?;
        let date = NaiveDate::from_ymd_opt(2023, 11, 3).unwrap();
        builder.upsert_document(DocumentRecord {
            meta: DocumentMeta::new("AAPL", "10-K", date, id),
            content_hash: id.to_string(),
            origin: "test".to_string(),
            ingested_at: Utc::now(),
            sections: Vec::new(),
        });
        builder.upsert_record(
            Chunk {
                id: format!("{}:0:0", id),
                document_id: id.to_string(),
                section_label: "Full Text".to_string(),
                section_ordinal: 0,
                word_start: 0,
                word_end: 1,
                page_start: 1,
                page_end: 1,
                text: id.to_string(),
                content_hash: String::new(),
            },
            vec![1.0, 0.0],
        )?;
        Ok(builder.finish())
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot() {
        let store = IndexStore::in_memory(identity(), params());
        let before = store.snapshot();

        let after = store.update(|base| add_document(base, "d1")).await.unwrap();

        assert_eq!(before.version(), 0);
        assert!(before.is_empty());
        assert_eq!(after.version(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_current() {
        let store = IndexStore::in_memory(identity(), params());
        let result = store
            .update(|_| Err(AppError::Index("boom".to_string())))
            .await;
        assert!(result.is_err());
        assert_eq!(store.snapshot().version(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_serialized() {
        let store = Arc::new(IndexStore::in_memory(identity(), params()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update(|base| add_document(base, &format!("d{}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.version(), 8);
        assert_eq!(snapshot.document_count(), 8);
        assert_eq!(snapshot.len(), 8);
    }

    #[tokio::test]
    async fn test_persisted_store_reopens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");

        let store = IndexStore::open(&path, identity(), params()).unwrap();
        store.update(|base| add_document(base, "d1")).await.unwrap();
        drop(store);

        let reopened = IndexStore::open(&path, identity(), params()).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.get("d1:0:0").is_some());
    }
}
