//! Index maintenance commands: ingest, rebuild and clean.

use clap::Args;
use finrag_core::{config::AppConfig, AppResult};
use finrag_knowledge::IngestReport;
use std::path::PathBuf;

use super::{open_base, print_json};

/// Ingest downloaded filings
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Directory of downloaded filings (one `meta.json` plus `source.*` per filing)
    #[arg(default_value = "data/raw/sec")]
    pub dir: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for base '{}'", config.base);

        let kb = open_base(config)?;
        let dir = if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            config.workspace.join(&self.dir)
        };
        let report = kb.ingest_dir(&dir).await?;

        if self.json {
            return print_json(&report);
        }
        print_report("Ingested", &report);
        Ok(())
    }
}

/// Rebuild the index with the current configuration
#[derive(Args, Debug)]
pub struct RebuildCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RebuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing rebuild command for base '{}'", config.base);

        let kb = open_base(config)?;
        let report = kb.rebuild().await?;

        if self.json {
            return print_json(&report);
        }
        print_report("Rebuilt", &report);
        Ok(())
    }
}

/// Clean knowledge base
#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command for base '{}'", config.base);

        let kb = open_base(config)?;
        let removed = kb.clean().await?;

        if self.json {
            return print_json(&serde_json::json!({
                "base": kb.name(),
                "chunksRemoved": removed,
                "snapshotVersion": kb.snapshot().version(),
            }));
        }
        println!("Knowledge base '{}' cleaned ({} chunks removed)", kb.name(), removed);
        Ok(())
    }
}

fn print_report(verb: &str, report: &IngestReport) {
    println!(
        "{} {} documents ({} chunks) in {:.2}s, snapshot v{}",
        verb,
        report.documents_indexed,
        report.chunks_indexed,
        report.duration_ms as f64 / 1000.0,
        report.snapshot_version
    );
    if report.documents_unchanged > 0 {
        println!("  Unchanged: {}", report.documents_unchanged);
    }
    if !report.documents_skipped.is_empty() {
        println!("  Skipped: {}", report.documents_skipped.len());
        for skipped in &report.documents_skipped {
            println!("    {}: {}", skipped.origin, skipped.reason);
        }
    }
    if !report.coverage_gaps.is_empty() {
        println!("  Coverage gaps: {}", report.coverage_gaps.len());
        for gap in &report.coverage_gaps {
            println!("    {} ({}): {}", gap.chunk_id, gap.section, gap.reason);
        }
    }
}
