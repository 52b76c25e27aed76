//! Filing and macro-indicator knowledge base.
//!
//! Build time: raw filing → [`parser`] → [`chunker`] → [`index`] (embedded,
//! versioned snapshot persisted in SQLite).
//!
//! Query time: question → [`rag::Retriever`] plus [`indicators::MacroStore`]
//! → prompt assembly → completion model → [`rag::Answer`] with citations.
//!
//! # Example
//! ```no_run
//! use std::path::Path;
//! use finrag_knowledge::{KnowledgeBase, SearchFilter};
//!
//! # async fn example() -> finrag_core::AppResult<()> {
//! let kb = KnowledgeBase::open(Path::new("."), "filings")?;
//! kb.ingest_dir(Path::new("data/raw/sec")).await?;
//! let result = kb
//!     .retriever()
//!     .search("supply chain risk", 5, &SearchFilter::new().with_ticker("AAPL"))
//!     .await?;
//! for hit in &result.hits {
//!     println!("[{}] {} {:.3}", hit.rank, hit.header(), hit.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod indicators;
pub mod ingest;
pub mod parser;
pub mod rag;
pub mod types;

#[cfg(test)]
mod tests;

pub use base::KnowledgeBase;
pub use config::KnowledgeBaseConfig;
pub use indicators::{MacroFact, MacroResolution, MacroSeries, MacroStore};
pub use rag::{
    Answer, AnswerOptions, AnswerStatus, Citation, QueryEngine, QueryHints, RetrievalResult,
    Retriever, SearchFilter, SearchHit,
};
pub use types::{
    BaseStats, Chunk, CoverageGap, DocumentMeta, DocumentRecord, FilingInput, FormType,
    IngestReport, Section, SkippedDocument,
};
