//! Grounded prompt assembly.
//!
//! Macro facts go in first and are never shortened. Passages follow in rank
//! order until the character budget runs out: the first passage that does not
//! fit is cut with a visible marker (or dropped if too little of it would
//! survive) and every lower-ranked passage is dropped. Only sources that end
//! up in the text are reported as citable.

use std::collections::BTreeMap;

use finrag_core::{AppError, AppResult};
use handlebars::Handlebars;

use crate::style::StyleHint;
use crate::types::{AssembledPrompt, IncludedSource, PromptBudget, PromptDefinition, PromptSource};

/// Appended to any passage body that was shortened.
pub const TRUNCATION_MARKER: &str = " [...truncated]";

const TEMPLATE_NAME: &str = "prompt";
const BLOCK_SEPARATOR: &str = "\n\n";
const CONTEXT_SENTINEL: &str = "\u{1}";

/// Builds budgeted, citation-marked prompts from one definition.
pub struct PromptAssembler {
    definition: PromptDefinition,
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for PromptAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAssembler")
            .field("prompt_id", &self.definition.id)
            .finish()
    }
}

impl PromptAssembler {
    pub fn new(definition: PromptDefinition) -> AppResult<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, definition.template.as_str())
            .map_err(|e| {
                AppError::Prompt(format!(
                    "Failed to register template {}: {}",
                    definition.id, e
                ))
            })?;
        Ok(Self {
            definition,
            registry,
        })
    }

    pub fn definition(&self) -> &PromptDefinition {
        &self.definition
    }

    fn render(&self, question: &str, formatting: &str, facts: &str, context: &str) -> AppResult<String> {
        let mut vars = BTreeMap::new();
        vars.insert("rules", self.definition.rules.clone());
        vars.insert("formatting", formatting.to_string());
        vars.insert("question", question.to_string());
        vars.insert("facts", facts.to_string());
        vars.insert("context", context.to_string());
        self.registry
            .render(TEMPLATE_NAME, &vars)
            .map_err(|e| AppError::Prompt(format!("Failed to render prompt: {}", e)))
    }

    /// Assemble the prompt for `question`.
    ///
    /// `passages` must be in rank order; their markers are kept as given.
    pub fn assemble(
        &self,
        question: &str,
        facts: &[PromptSource],
        passages: &[PromptSource],
        budget: &PromptBudget,
    ) -> AppResult<AssembledPrompt> {
        let style = StyleHint::infer(question);
        let formatting = style.instruction();
        let facts_text = facts
            .iter()
            .map(|f| format_block(&f.marker, &f.header, f.body.trim()))
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR);

        // Everything except the passages. The sentinel keeps the template's
        // context section switched on while measuring it.
        let sentinel = if passages.is_empty() { "" } else { CONTEXT_SENTINEL };
        let skeleton = self.render(question, &formatting, &facts_text, sentinel)?;
        let fixed = char_len(&skeleton) - char_len(sentinel);
        if fixed > budget.max_chars {
            return Err(AppError::Prompt(format!(
                "Prompt budget of {} characters cannot hold the question, rules and macro facts ({} characters)",
                budget.max_chars, fixed
            )));
        }

        let mut selection = select_passages(passages, budget, budget.max_chars - fixed);
        let mut text = self.render(question, &formatting, &facts_text, &selection.context)?;

        // Only reachable with templates that repeat {{context}}.
        while char_len(&text) > budget.max_chars && !selection.included.is_empty() {
            let keep = selection.included.len() - 1;
            selection = select_passages(&passages[..keep], budget, budget.max_chars - fixed);
            text = self.render(question, &formatting, &facts_text, &selection.context)?;
        }

        let passages_dropped = passages.len() - selection.included.len();
        if passages_dropped > 0 {
            tracing::debug!(
                included = selection.included.len(),
                dropped = passages_dropped,
                budget = budget.max_chars,
                "Dropped lower-ranked passages to honor prompt budget"
            );
        }

        Ok(AssembledPrompt {
            text: text.clone(),
            prompt_id: self.definition.id.clone(),
            style,
            facts: facts
                .iter()
                .filter(|f| text.contains(&block_head(&f.marker, &f.header)))
                .map(|f| IncludedSource {
                    marker: f.marker.clone(),
                    truncated: false,
                })
                .collect(),
            passages: selection.included,
            passages_dropped,
        })
    }
}

struct Selection {
    context: String,
    included: Vec<IncludedSource>,
}

fn select_passages(passages: &[PromptSource], budget: &PromptBudget, available: usize) -> Selection {
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = Vec::new();
    let marker_len = char_len(TRUNCATION_MARKER);

    for passage in passages {
        let body = collapse_whitespace(&passage.body);
        let (body, capped) = if char_len(&body) > budget.max_passage_chars {
            (truncate_with_marker(&body, budget.max_passage_chars), true)
        } else {
            (body, false)
        };

        let separator = if context.is_empty() { "" } else { BLOCK_SEPARATOR };
        let head_cost = char_len(separator) + char_len(&block_head(&passage.marker, &passage.header));
        let remaining = available - used;

        let fits = head_cost + char_len(&body) <= remaining;
        let (body, truncated) = if fits {
            (body, capped)
        } else {
            let room = remaining.saturating_sub(head_cost);
            if room < budget.min_partial_chars + marker_len {
                break;
            }
            (truncate_with_marker(&body, room), true)
        };

        context.push_str(separator);
        let block = format_block(&passage.marker, &passage.header, &body);
        used += char_len(separator) + char_len(&block);
        context.push_str(&block);
        included.push(IncludedSource {
            marker: passage.marker.clone(),
            truncated,
        });

        if !fits {
            break;
        }
    }

    Selection { context, included }
}

fn block_head(marker: &str, header: &str) -> String {
    format!("[{}] ({})\n", marker, header)
}

fn format_block(marker: &str, header: &str, body: &str) -> String {
    format!("{}{}", block_head(marker, header), body)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` so that the result, marker included, has at most `limit` chars.
/// Prefers a word boundary in the second half of the kept span.
fn truncate_with_marker(text: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(char_len(TRUNCATION_MARKER));
    let cut = text
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut head = &text[..cut];
    if let Some(space) = head.rfind(' ') {
        if space >= cut / 2 {
            head = &head[..space];
        }
    }
    format!("{}{}", head.trim_end(), TRUNCATION_MARKER)
}
