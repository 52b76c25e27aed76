//! Embedding providers and model identity.
//!
//! A provider maps text to vectors for one fixed model version. The
//! [`ModelIdentity`] recorded with an index decides whether query vectors from
//! the current configuration are comparable with the stored ones.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::{cosine_similarity, EmbeddingConfig, ModelIdentity, SimilarityMetric};
pub use provider::{create_provider, EmbeddingProvider};
