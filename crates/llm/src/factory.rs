//! Completion client factory.

use std::sync::Arc;

use finrag_core::{AppConfig, AppError, AppResult};

use crate::client::LlmClient;
use crate::providers::OllamaClient;

/// Create a completion client by provider name.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let client = match endpoint {
                Some(url) => OllamaClient::with_base_url(url),
                None => OllamaClient::new(),
            };
            Ok(Arc::new(client))
        }
        other => Err(AppError::Config(format!(
            "Unknown completion provider: {}",
            other
        ))),
    }
}

/// Create the completion client described by the application config.
pub fn client_from_config(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    create_client(&config.provider, Some(&config.endpoint))
}
