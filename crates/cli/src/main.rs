//! finrag CLI
//!
//! Main entry point for the finrag command-line tool.
//! Answers questions over SEC filings and FRED macro series with cited,
//! locally indexed evidence.

mod commands;
mod spelling;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, CleanCommand, IndicatorCommand, IngestCommand, RebuildCommand, SearchCommand,
    StatsCommand,
};
use finrag_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// finrag - cited answers over SEC filings and macro indicators
#[derive(Parser, Debug)]
#[command(name = "finrag")]
#[command(about = "Cited answers over SEC filings and FRED macro indicators", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "FINRAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "FINRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Knowledge base name
    #[arg(short, long, global = true, env = "FINRAG_BASE")]
    base: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Completion provider (ollama)
    #[arg(short, long, global = true, env = "FINRAG_PROVIDER")]
    provider: Option<String>,

    /// Completion model identifier
    #[arg(short, long, global = true, env = "FINRAG_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest downloaded filings into the knowledge base
    Ingest(IngestCommand),

    /// Re-chunk and re-embed every indexed filing
    Rebuild(RebuildCommand),

    /// Show the passages most relevant to a query
    Search(SearchCommand),

    /// Answer a question with citations
    Ask(AskCommand),

    /// Show the latest value of a macro indicator
    Indicator(IndicatorCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),

    /// Remove every indexed chunk
    Clean(CleanCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Rebuild(_) => "rebuild",
            Commands::Search(_) => "search",
            Commands::Ask(_) => "ask",
            Commands::Indicator(_) => "indicator",
            Commands::Stats(_) => "stats",
            Commands::Clean(_) => "clean",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.base,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    config.log_json |= cli.log_json;

    let format = if config.log_json {
        logging::LogFormat::Json
    } else {
        logging::LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("finrag starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Base: {}", config.base);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_finrag_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Rebuild(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Indicator(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Clean(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
