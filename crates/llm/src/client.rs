//! Completion request/response types and the provider trait.

use finrag_core::{AppResult, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the model
    pub prompt: String,

    /// Model identifier (e.g., "qwen2.5:3b-instruct")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    #[serde(default)]
    pub usage: LlmUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A text-completion provider.
///
/// Implementations perform a single attempt. Deadlines and retries are the
/// caller's job, see [`complete_with_policy`].
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama").
    fn provider_name(&self) -> &str;

    /// Perform a non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

/// Run a completion under a deadline with bounded retries.
///
/// An attempt that exceeds `policy.timeout` is abandoned; the provider is not
/// asked to cancel anything server-side.
pub async fn complete_with_policy(
    client: &dyn LlmClient,
    request: &LlmRequest,
    policy: &RetryPolicy,
) -> AppResult<LlmResponse> {
    policy.run("completion", || client.complete(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use finrag_core::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SlowClient {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl LlmClient for SlowClient {
        fn provider_name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(LlmResponse {
                content: "late".into(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Hello", "llama3")
            .with_temperature(0.1)
            .with_max_tokens(256)
            .with_system("Be terse.");
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.system.as_deref(), Some("Be terse."));
    }

    #[test]
    fn test_usage_totals() {
        assert_eq!(LlmUsage::new(10, 5).total_tokens, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_deadline_is_enforced() {
        let client = SlowClient {
            calls: AtomicU32::new(0),
        };
        let request = LlmRequest::new("q", "m");
        let policy = RetryPolicy::new(2, Duration::from_secs(5));

        let err = complete_with_policy(&client, &request, &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UpstreamTimeout { attempts: 2, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
