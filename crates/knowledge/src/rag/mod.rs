//! Retrieval and grounded answering.
//!
//! [`Retriever`] ranks indexed chunks for a query; [`QueryEngine`] combines
//! retrieval, macro facts and prompt assembly into a cited [`Answer`].

pub mod answer;
pub mod extract;
pub mod hints;
pub mod search;
pub mod types;

pub use answer::{AnswerOptions, QueryEngine, INSUFFICIENT_CONTEXT};
pub use hints::QueryHints;
pub use search::{Retriever, SearchFilter};
pub use types::{Answer, AnswerStatus, Citation, RetrievalResult, SearchHit};
