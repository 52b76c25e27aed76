//! Prompt assembly for finrag.
//!
//! Turns a question, ranked passages and macro facts into one grounded prompt
//! that fits a character budget and carries a citation marker on every source.
//! Templates are Handlebars; the built-in definition can be overridden per
//! workspace.

pub mod builder;
pub mod loader;
pub mod style;
pub mod types;

pub use builder::{PromptAssembler, TRUNCATION_MARKER};
pub use loader::{builtin_prompt, list_prompts, load_prompt, resolve_prompt, DEFAULT_PROMPT_ID};
pub use style::{AnswerStyle, StyleHint};
pub use types::{AssembledPrompt, IncludedSource, PromptBudget, PromptDefinition, PromptSource};
