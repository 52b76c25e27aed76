//! Command handlers for the finrag CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod indicator;
pub mod knowledge;
pub mod search;
pub mod stats;

pub use ask::AskCommand;
pub use indicator::IndicatorCommand;
pub use knowledge::{CleanCommand, IngestCommand, RebuildCommand};
pub use search::SearchCommand;
pub use stats::StatsCommand;

use finrag_core::{config::AppConfig, AppResult};
use finrag_knowledge::{KnowledgeBase, MacroStore};
use serde::Serialize;

/// Open the knowledge base selected by `--base`.
pub(crate) fn open_base(config: &AppConfig) -> AppResult<KnowledgeBase> {
    tracing::debug!(base = %config.base, "Opening knowledge base");
    KnowledgeBase::open(&config.workspace, &config.base)
}

/// Macro series from `.finrag/macro`, using the base's year-over-year window.
pub(crate) fn load_macros(config: &AppConfig, kb: &KnowledgeBase) -> AppResult<MacroStore> {
    MacroStore::load_dir(&config.macro_dir(), kb.config().yoy_tolerance_days)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
