//! Completion capability for finrag.
//!
//! The answer pipeline treats the language model as an opaque
//! `complete(prompt) -> text` call. This crate defines that capability as the
//! [`LlmClient`] trait and ships an Ollama implementation.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use finrag_core::RetryPolicy;
//! use finrag_llm::{complete_with_policy, LlmRequest, OllamaClient};
//!
//! # async fn example() -> finrag_core::AppResult<()> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Summarize the risk factors.", "qwen2.5:3b-instruct");
//! let policy = RetryPolicy::new(2, Duration::from_secs(60));
//! let response = complete_with_policy(&client, &request, &policy).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

pub use client::{complete_with_policy, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{client_from_config, create_client};
pub use providers::OllamaClient;
