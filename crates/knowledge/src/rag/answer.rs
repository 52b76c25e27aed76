//! Question answering over filings and macro indicators.
//!
//! Flow: resolve macro mentions, retrieve passages (restricted to mentioned
//! issuers, preferring mentioned years), drop weak hits, assemble a budgeted
//! prompt and ask the completion model. Citations are taken from what the
//! prompt actually contains, never from the model output. When the model
//! gives nothing usable, the answer quotes the included evidence instead.

use std::sync::Arc;

use finrag_core::{AppResult, RetryPolicy};
use finrag_llm::{complete_with_policy, LlmClient, LlmRequest};
use finrag_prompt::{AssembledPrompt, PromptAssembler, PromptBudget, PromptSource};
use tracing::{debug, info, warn};

use crate::index::IndexSnapshot;
use crate::indicators::{MacroFact, MacroResolution, MacroStore};
use crate::rag::extract;
use crate::rag::hints::QueryHints;
use crate::rag::search::{Retriever, SearchFilter};
use crate::rag::types::{Answer, AnswerStatus, Citation, RetrievalResult, SearchHit};

/// What the model is told to say when the context does not cover the question.
pub const INSUFFICIENT_CONTEXT: &str = "Insufficient context.";

/// Candidates fetched per hinted search, as a multiple of `top_k`, so that
/// year preference and issuer balancing have something to choose from.
const CANDIDATE_FACTOR: usize = 4;

/// Knobs for [`QueryEngine`].
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub top_k: usize,
    pub min_relevance: f32,
    pub budget: PromptBudget,
    pub model: String,
    pub temperature: f32,
    pub completion_policy: RetryPolicy,
}

/// Answers questions against one knowledge base.
pub struct QueryEngine {
    retriever: Retriever,
    macros: Arc<MacroStore>,
    assembler: PromptAssembler,
    llm: Arc<dyn LlmClient>,
    options: AnswerOptions,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("provider", &self.llm.provider_name())
            .field("assembler", &self.assembler)
            .field("options", &self.options)
            .finish()
    }
}

impl QueryEngine {
    pub fn new(
        retriever: Retriever,
        macros: Arc<MacroStore>,
        assembler: PromptAssembler,
        llm: Arc<dyn LlmClient>,
        options: AnswerOptions,
    ) -> Self {
        Self {
            retriever,
            macros,
            assembler,
            llm,
            options,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `query`.
    ///
    /// Only configuration and prompt-definition problems are returned as
    /// errors. A model timeout or empty output falls back to an extractive
    /// or facts-only answer built from the prompt's sources; with no
    /// evidence at all the result is [`AnswerStatus::CannotAnswer`].
    #[tracing::instrument(skip(self))]
    pub async fn answer(&self, query: &str) -> AppResult<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Answer::cannot_answer("the question is empty"));
        }

        // One snapshot for the whole query, even if a rebuild lands meanwhile.
        let snapshot = self.retriever.snapshot();
        let facts = self.resolve_facts(query);

        let retrieval = match self.retrieve(&snapshot, query).await {
            Ok(result) => result,
            Err(err) if err.is_config() => return Err(err),
            Err(err) if facts.is_empty() => {
                warn!(error = %err, "Retrieval failed");
                return Ok(Answer::cannot_answer(format!("retrieval failed: {}", err)));
            }
            Err(err) => {
                warn!(error = %err, "Retrieval failed, continuing with macro facts only");
                RetrievalResult::empty(query, snapshot.version())
            }
        };
        let max_score = retrieval.max_score().unwrap_or(0.0);

        if retrieval.is_empty() && facts.is_empty() {
            info!("Nothing relevant to ground an answer on");
            return Ok(Answer::cannot_answer(
                "no indexed passage or macro indicator is relevant to the question",
            ));
        }

        let fact_sources: Vec<PromptSource> = facts
            .iter()
            .enumerate()
            .map(|(i, fact)| {
                PromptSource::new(
                    format!("M{}", i + 1),
                    format!("{}, FRED {}", fact.name, fact.series_id),
                    fact.render(),
                )
            })
            .collect();
        let passage_sources: Vec<PromptSource> = retrieval
            .hits
            .iter()
            .map(|hit| PromptSource::new(hit.rank.to_string(), hit.header(), hit.chunk.text.clone()))
            .collect();

        let prompt = self.assembler.assemble(
            query,
            &fact_sources,
            &passage_sources,
            &self.options.budget,
        )?;
        let citations = citations_for(&prompt, &facts, &retrieval.hits);
        debug!(
            prompt.chars = prompt.char_len(),
            passages = prompt.passages.len(),
            facts = prompt.facts.len(),
            "Assembled prompt"
        );

        let request = LlmRequest::new(prompt.text.clone(), self.options.model.clone())
            .with_temperature(self.options.temperature);

        let (failure, quote_passages) =
            match complete_with_policy(self.llm.as_ref(), &request, &self.options.completion_policy).await {
                Ok(response) => {
                    let text = response.content.trim();
                    if text.is_empty() {
                        ("the model returned an empty answer".to_string(), true)
                    } else if text == INSUFFICIENT_CONTEXT {
                        ("the retrieved context does not answer the question".to_string(), false)
                    } else {
                        warn_on_unknown_markers(text, &prompt);
                        return Ok(Answer {
                            text: text.to_string(),
                            citations,
                            status: AnswerStatus::Grounded,
                            reason: None,
                            max_score,
                        });
                    }
                }
                Err(err) if err.is_config() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Completion failed");
                    (format!("completion failed: {}", err), true)
                }
            };

        let passages: Vec<&SearchHit> = if quote_passages {
            included_hits(&prompt, &retrieval.hits)
        } else {
            Vec::new()
        };
        Ok(fallback_answer(query, &prompt, &facts, &passages, failure, max_score))
    }

    fn resolve_facts(&self, query: &str) -> Vec<MacroFact> {
        self.macros
            .detect_mentions(query)
            .into_iter()
            .filter_map(|indicator| match self.macros.resolve(&indicator) {
                MacroResolution::Found(fact) => Some(fact),
                MacroResolution::NotFound { indicator } => {
                    debug!(%indicator, "Indicator mentioned but no series loaded");
                    None
                }
            })
            .collect()
    }

    /// Search with issuer and year hints.
    ///
    /// Mentioned issuers restrict the search, each searched on its own when
    /// several are named so one cannot crowd out the others. The restriction
    /// is dropped only when it matches nothing. Mentioned years never filter;
    /// passages from those filings are moved ahead of the rest.
    async fn retrieve(&self, snapshot: &IndexSnapshot, query: &str) -> AppResult<RetrievalResult> {
        let k = self.options.top_k;
        let hints = QueryHints::detect(query, snapshot);
        let pool = if hints.is_empty() {
            k
        } else {
            k.saturating_mul(CANDIDATE_FACTOR)
        };

        let mut result = RetrievalResult::empty(query, snapshot.version());
        if hints.tickers.len() >= 2 {
            for ticker in &hints.tickers {
                let filter = SearchFilter::new().with_ticker(ticker);
                let part = self.retriever.search_in(snapshot, query, pool, &filter).await?;
                result.candidates += part.candidates;
                result.hits.extend(part.hits);
            }
        } else if !hints.tickers.is_empty() {
            result = self
                .retriever
                .search_in(snapshot, query, pool, &hints.issuer_filter())
                .await?;
        }

        if result.is_empty() {
            if !hints.tickers.is_empty() {
                debug!(?hints, "Mentioned issuers have no passages, searching everything");
            }
            result = self
                .retriever
                .search_in(snapshot, query, pool, &SearchFilter::new())
                .await?;
        }

        let mut result = result.above(self.options.min_relevance);
        result.hits = hints.arrange(std::mem::take(&mut result.hits), k);
        if !hints.is_empty() {
            debug!(?hints, hits = result.len(), "Search arranged by query hints");
        }
        Ok(result)
    }
}

fn citations_for(prompt: &AssembledPrompt, facts: &[MacroFact], hits: &[SearchHit]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = facts
        .iter()
        .enumerate()
        .filter(|(i, _)| prompt.includes(&format!("M{}", i + 1)))
        .map(|(i, fact)| Citation::from_fact(i + 1, fact))
        .collect();
    for included in &prompt.passages {
        if let Some(hit) = hits.iter().find(|h| h.rank.to_string() == included.marker) {
            citations.push(Citation::from_hit(hit, included.truncated));
        }
    }
    citations
}

/// Included passages in prompt order.
fn included_hits<'a>(prompt: &AssembledPrompt, hits: &'a [SearchHit]) -> Vec<&'a SearchHit> {
    prompt
        .passages
        .iter()
        .filter_map(|included| hits.iter().find(|h| h.rank.to_string() == included.marker))
        .collect()
}

/// Deterministic answer for when the model gives nothing usable.
///
/// States the included macro facts and quotes the sentences of `passages`
/// closest to the question, citing only what is used.
fn fallback_answer(
    query: &str,
    prompt: &AssembledPrompt,
    facts: &[MacroFact],
    passages: &[&SearchHit],
    reason: String,
    max_score: f32,
) -> Answer {
    let mut lines = Vec::new();
    let mut citations = Vec::new();
    for (i, fact) in facts.iter().enumerate() {
        let marker = format!("M{}", i + 1);
        if prompt.includes(&marker) {
            lines.push(format!("{} [{}]", fact.render(), marker));
            citations.push(Citation::from_fact(i + 1, fact));
        }
    }

    let extracts = extract::extract(query, passages);
    for hit in passages {
        let marker = hit.rank.to_string();
        if extracts.iter().any(|e| e.marker == marker) {
            let truncated = prompt
                .passages
                .iter()
                .any(|p| p.marker == marker && p.truncated);
            citations.push(Citation::from_hit(hit, truncated));
        }
    }
    lines.extend(
        extracts
            .iter()
            .map(|e| format!("{} [{}]", e.sentence, e.marker)),
    );

    let status = if !extracts.is_empty() {
        AnswerStatus::Extractive
    } else if !lines.is_empty() {
        AnswerStatus::FactsOnly
    } else {
        return Answer {
            max_score,
            ..Answer::cannot_answer(reason)
        };
    };
    Answer {
        text: lines.join("\n"),
        citations,
        status,
        reason: Some(reason),
        max_score,
    }
}

fn warn_on_unknown_markers(text: &str, prompt: &AssembledPrompt) {
    for marker in cited_markers(text) {
        if !prompt.includes(&marker) {
            warn!(%marker, "Model cited a marker that is not in the prompt");
        }
    }
}

/// Markers such as `[2]` or `[M1]` appearing in `text`.
fn cited_markers(text: &str) -> Vec<String> {
    let mut markers = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else {
            break;
        };
        let inner = &rest[..close];
        let digits = inner.strip_prefix('M').unwrap_or(inner);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && !markers.iter().any(|m| m == inner) {
            markers.push(inner.to_string());
        }
        rest = &rest[close..];
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cited_markers() {
        let markers = cited_markers("Supply risk [1][3], CPI rose [M1]. See [note] and [1].");
        assert_eq!(markers, vec!["1", "3", "M1"]);
    }

    #[test]
    fn test_cited_markers_unclosed() {
        assert!(cited_markers("broken [12").is_empty());
    }
}
