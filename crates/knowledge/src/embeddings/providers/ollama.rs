//! Ollama embedding provider.
//!
//! Calls the local `/api/embeddings` endpoint once per text. Each request is a
//! single attempt; retry and deadline handling belong to the caller's
//! [`finrag_core::RetryPolicy`].

use async_trait::async_trait;
use finrag_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::embeddings::config::EmbeddingConfig;
use crate::embeddings::provider::EmbeddingProvider;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Arc<Client>,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Build the provider. No request is made until the first embed call.
    ///
    /// The base URL comes from the config endpoint, then `OLLAMA_URL`, then
    /// the local default.
    pub fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let base_url = config
            .endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(status_error(status, &message));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse Ollama response: {}", e))
        })?;

        if parsed.embedding.len() != self.dimensions {
            return Err(AppError::Embedding(format!(
                "Model '{}' returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimensions
            )));
        }

        debug!("Received embedding of {} dimensions", parsed.embedding.len());
        Ok(parsed.embedding)
    }

    fn transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::UpstreamTimeout {
                operation: format!("ollama embedding ({})", self.model),
                attempts: 1,
            }
        } else {
            AppError::Upstream(format!(
                "Failed to reach Ollama at {}: {}",
                self.base_url, err
            ))
        }
    }
}

fn status_error(status: StatusCode, message: &str) -> AppError {
    if status.is_server_error() {
        AppError::Upstream(format!("Ollama returned {}: {}", status, message))
    } else if status == StatusCode::NOT_FOUND {
        AppError::Embedding(format!(
            "Ollama model not found ({}). Pull it with `ollama pull`.",
            message
        ))
    } else {
        AppError::Embedding(format!("Ollama rejected request ({}): {}", status, message))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: Some(endpoint.to_string()),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let provider = OllamaProvider::new(&config("http://localhost:11434/")).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::BAD_GATEWAY, "down").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad").is_retryable());
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "model"),
            AppError::Embedding(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        // Port 1 is reserved and refuses connections.
        let provider = OllamaProvider::new(&config("http://127.0.0.1:1")).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
