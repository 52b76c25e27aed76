//! Error types for finrag.
//!
//! One enum covers every failure category in the workspace. Ingestion code
//! treats [`AppError::Parse`] as per-document and keeps going; query code turns
//! most failures into a "cannot answer" outcome and only lets
//! [`AppError::Config`] escape.

use thiserror::Error;

/// Unified error type for finrag.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid configuration or an index built with a different embedding model.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A filing or data file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A call to an external service did not finish in time.
    #[error("Upstream timeout: {operation} did not complete after {attempts} attempt(s)")]
    UpstreamTimeout { operation: String, attempts: u32 },

    /// A transient failure talking to an external service (connection refused, 5xx).
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Completion provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index and metadata store errors
    #[error("Index error: {0}")]
    Index(String),

    /// Prompt assembly and template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamTimeout { .. } | AppError::Upstream(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        let timeout = AppError::UpstreamTimeout {
            operation: "embed".to_string(),
            attempts: 3,
        };
        assert!(timeout.is_retryable());
        assert!(AppError::Upstream("connection refused".into()).is_retryable());
        assert!(!AppError::Parse("empty".into()).is_retryable());
        assert!(!AppError::Config("overlap".into()).is_retryable());
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = AppError::UpstreamTimeout {
            operation: "completion".to_string(),
            attempts: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("completion"));
        assert!(msg.contains("2 attempt"));
    }
}
