//! Search command handler.
//!
//! Retrieval only: ranked passages with their provenance, no completion call.

use clap::Args;
use finrag_core::{config::AppConfig, AppResult};
use finrag_knowledge::{FormType, SearchFilter};

use super::{open_base, print_json};

const SNIPPET_CHARS: usize = 240;

/// Show the passages most relevant to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of passages to return (default: the base's top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Only filings of these tickers
    #[arg(long)]
    pub ticker: Vec<String>,

    /// Only these form types (10-K, 10-Q)
    #[arg(long)]
    pub form: Vec<String>,

    /// Only filings filed in this year
    #[arg(long)]
    pub year: Option<i32>,

    /// Skip filings superseded by a newer one of the same ticker and form
    #[arg(long)]
    pub latest_only: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    fn filter(&self) -> SearchFilter {
        let mut filter = SearchFilter::new().with_tickers(&self.ticker);
        for form in &self.form {
            filter = filter.with_form(FormType::from(form.as_str()));
        }
        if let Some(year) = self.year {
            filter = filter.filed_in(year);
        }
        if self.latest_only {
            filter = filter.latest_only();
        }
        filter
    }

    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command for base '{}'", config.base);

        let kb = open_base(config)?;
        let k = self.top_k.unwrap_or(kb.config().top_k);
        let result = kb.retriever().search(&self.query, k, &self.filter()).await?;

        if self.json {
            return print_json(&result);
        }

        if result.is_empty() {
            println!("No matching passages ({} candidates searched)", result.candidates);
            return Ok(());
        }
        for hit in &result.hits {
            println!("[{}] {}  score {:.3}", hit.rank, hit.header(), hit.score);
            println!("    {}", snippet(&hit.chunk.text));
        }
        Ok(())
    }
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}
