//! Completion provider implementations.

mod ollama;

pub use ollama::OllamaClient;
