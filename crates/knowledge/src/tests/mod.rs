//! Crate-level scenario tests and the fakes they share.


use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use finrag_core::{AppError, AppResult};
use finrag_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use crate::types::{DocumentMeta, FilingInput};

/// One dimension per keyword plus a constant one, so that unrelated text
/// still gets a small non-zero score.
pub(crate) const KEYWORDS: &[&str] = &["risk", "factors", "inflation", "revenue", "liquidity"];

/// Counts whole-word keyword occurrences. Deterministic and instant.
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    /// Texts containing this word fail to embed.
    pub fail_on: Option<&'static str>,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| words.iter().filter(|w| *w == k).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn provider_name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-v1"
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if let Some(bad) = self.fail_on {
            if texts.iter().any(|t| t.split_whitespace().any(|w| w == bad)) {
                return Err(AppError::Embedding(format!("cannot embed text containing {}", bad)));
            }
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

pub(crate) fn keyword_embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "keyword".to_string(),
        model: "keyword-v1".to_string(),
        dimensions: KEYWORDS.len() + 1,
        max_attempts: 1,
        ..EmbeddingConfig::default()
    }
}

pub(crate) fn test_config(chunk_size: usize, chunk_overlap: usize) -> KnowledgeBaseConfig {
    KnowledgeBaseConfig {
        name: "test".to_string(),
        chunk_size,
        chunk_overlap,
        embedding: keyword_embedding_config(),
        ..KnowledgeBaseConfig::default()
    }
}

pub(crate) fn keyword_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(KeywordEmbedder::default())
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn filing(ticker: &str, filed: NaiveDate, id: &str, raw: impl Into<String>) -> FilingInput {
    FilingInput {
        meta: DocumentMeta::new(ticker, "10-K", filed, id),
        raw: raw.into(),
        origin: format!("memory:{}", id),
    }
}

/// `n` distinct filler words: `w0 w1 w2 ...`.
pub(crate) fn words(prefix: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{}{}", prefix, i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A 10-K with "Item 1A" of 500 words and "Item 7" of 300 words.
pub(crate) fn two_section_filing() -> String {
    format!(
        "Item 1A. Risk Factors\n{}\nItem 7. Management's Discussion and Analysis\n{}\n",
        words("hazard", 500),
        words("sales", 300)
    )
}

/// Replies with a fixed text and remembers every prompt.
#[derive(Debug)]
pub(crate) struct ScriptedLlm {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(LlmResponse {
            content: self.reply.clone(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Never answers within any reasonable deadline.
#[derive(Debug)]
pub(crate) struct HangingLlm;

#[async_trait::async_trait]
impl LlmClient for HangingLlm {
    fn provider_name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(LlmResponse {
            content: "too late".to_string(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}
