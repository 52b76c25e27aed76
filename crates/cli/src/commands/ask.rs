//! Ask command handler.
//!
//! Retrieves filing passages and macro facts for a question, has the
//! completion model answer from them, and prints the cited sources.

use clap::Args;
use finrag_core::{config::AppConfig, AppResult};
use finrag_knowledge::{AnswerStatus, QueryEngine};
use finrag_llm::client_from_config;
use finrag_prompt::{resolve_prompt, PromptAssembler, DEFAULT_PROMPT_ID};
use std::sync::Arc;

use super::{load_macros, open_base, print_json};
use crate::spelling;

/// Answer a question with citations
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of passages to retrieve (default: the base's top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Prompt definition ID (from .finrag/prompts/)
    #[arg(long, default_value = DEFAULT_PROMPT_ID)]
    pub prompt: String,

    /// Temperature for response generation (0.0-2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let corrected = spelling::correct(&self.question);
        for (from, to) in &corrected.replacements {
            tracing::info!(from = %from, to = %to, "Corrected query term");
        }

        let kb = open_base(config)?;
        let macros = load_macros(config, &kb)?;

        let definition = resolve_prompt(&config.workspace, &self.prompt)?;
        tracing::debug!("Loaded prompt definition: {}", definition.id);
        let assembler = PromptAssembler::new(definition)?;

        let client = client_from_config(config)?;

        let mut options = kb.answer_options(config);
        if let Some(k) = self.top_k {
            options.top_k = k;
        }
        if let Some(temperature) = self.temperature {
            options.temperature = temperature;
        }

        let engine = QueryEngine::new(kb.retriever(), Arc::new(macros), assembler, client, options);
        let answer = engine.answer(&corrected.text).await?;

        tracing::debug!(
            status = ?answer.status,
            max_score = answer.max_score,
            citations = answer.citations.len(),
            "Answer ready"
        );

        if self.json {
            return print_json(&serde_json::json!({
                "question": self.question,
                "query": corrected.text,
                "provider": config.provider,
                "model": config.model,
                "answer": answer,
            }));
        }

        println!("Answer:");
        println!("{}", answer.text);
        let fallback_note = match answer.status {
            AnswerStatus::FactsOnly => Some("showing indicator values only"),
            AnswerStatus::Extractive => Some("quoting the retrieved passages"),
            AnswerStatus::Grounded | AnswerStatus::CannotAnswer => None,
        };
        if let (Some(note), Some(reason)) = (fallback_note, &answer.reason) {
            println!();
            println!("(model unavailable: {}; {})", reason, note);
        }
        println!();

        let sources = answer.source_lines();
        if sources.is_empty() {
            println!("Sources: (no sources available)");
        } else {
            println!("Sources:");
            for line in sources {
                println!("{}", line);
            }
        }

        Ok(())
    }
}
