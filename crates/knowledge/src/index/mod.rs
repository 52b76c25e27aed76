//! Embedding index: immutable snapshots, the store that publishes them, SQLite
//! persistence and the indexer that turns chunks into embedding records.

pub mod indexer;
pub mod persist;
pub mod snapshot;
pub mod store;

pub use indexer::{EmbeddedChunks, EmbeddedSummary, EmbeddingIndexer};
pub use persist::{load_snapshot, save_snapshot};
pub use snapshot::{IndexSnapshot, IndexedChunk, SnapshotBuilder};
pub use store::{IndexStore, IndexWriter};
