//! Embedding configuration and model identity.

use std::fmt;
use std::time::Duration;

use finrag_core::{AppError, AppResult, RetryPolicy};
use serde::{Deserialize, Serialize};

/// How vectors are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Dot,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Dot => "dot",
        }
    }

    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::Dot => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0.0 when either vector is all zeros or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Everything that must be equal for two vectors to be comparable.
/// Persisted with the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub metric: SimilarityMetric,
    pub normalize: bool,
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}d, {})",
            self.provider,
            self.model,
            self.dimensions,
            self.metric.as_str()
        )
    }
}

impl ModelIdentity {
    /// Fail with a `Config` error unless `other` describes the same model.
    pub fn ensure_matches(&self, other: &ModelIdentity) -> AppResult<()> {
        if self == other {
            return Ok(());
        }
        let what = if self.provider != other.provider {
            "provider"
        } else if self.model != other.model {
            "model"
        } else if self.dimensions != other.dimensions {
            "dimensions"
        } else if self.metric != other.metric {
            "metric"
        } else {
            "normalization"
        };
        Err(AppError::Config(format!(
            "Embedding {} mismatch: index was built with {}, configuration uses {}. Rebuild the index.",
            what, self, other
        )))
    }
}

/// Embedding configuration for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default)]
    pub metric: SimilarityMetric,

    /// Whether to normalize embeddings to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-attempt deadline for one embedding call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Endpoint for HTTP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_provider() -> String {
    "trigram".to_string()
}

fn default_model() -> String {
    "trigram-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_normalize() -> bool {
    true
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            metric: SimilarityMetric::default(),
            normalize: default_normalize(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn identity(&self) -> ModelIdentity {
        ModelIdentity {
            provider: self.provider.clone(),
            model: self.model.clone(),
            dimensions: self.dimensions,
            metric: self.metric,
            normalize: self.normalize,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "embedding.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::Config(
                "embedding.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
