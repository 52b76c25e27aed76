//! Stats command handler.
//!
//! Reports what the selected knowledge base holds and which macro series
//! are available.

use clap::Args;
use finrag_core::{config::AppConfig, AppResult};

use super::{load_macros, open_base, print_json};

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command for base '{}'", config.base);

        let kb = open_base(config)?;
        let stats = kb.stats();
        let macros = load_macros(config, &kb)?;
        let indicators: Vec<&str> = macros.indicators().map(|s| s.key()).collect();

        if self.json {
            return print_json(&serde_json::json!({
                "base": stats,
                "indicators": indicators,
            }));
        }

        println!("Knowledge base: {}", stats.base_name);
        println!("  Documents: {} ({} superseded)", stats.documents_count, stats.superseded_count);
        println!("  Chunks: {}", stats.chunks_count);
        println!("  Coverage gaps: {}", stats.coverage_gaps);
        println!("  Snapshot version: {}", stats.snapshot_version);
        println!("  Embedding model: {}", stats.embedding_model);
        println!("  DB size: {} bytes", stats.db_size_bytes);
        if let Some(built_at) = stats.built_at {
            println!("  Built: {}", built_at.to_rfc3339());
        }
        if indicators.is_empty() {
            println!("Macro indicators: (none loaded)");
        } else {
            println!("Macro indicators: {}", indicators.join(", "));
        }

        Ok(())
    }
}
