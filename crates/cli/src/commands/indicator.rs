//! Indicator command handler.

use clap::Args;
use finrag_core::{config::AppConfig, AppResult};
use finrag_knowledge::MacroResolution;

use super::{load_macros, open_base, print_json};

/// Show the latest value of a macro indicator
#[derive(Args, Debug)]
pub struct IndicatorCommand {
    /// Indicator name, alias or FRED series id (e.g. cpi, "fed funds", UNRATE)
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndicatorCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing indicator command for '{}'", self.name);

        let kb = open_base(config)?;
        let macros = load_macros(config, &kb)?;
        let resolution = macros.resolve(&self.name);

        if self.json {
            return print_json(&match &resolution {
                MacroResolution::Found(fact) => serde_json::json!({
                    "indicator": self.name,
                    "found": true,
                    "fact": fact,
                    "text": fact.render(),
                }),
                MacroResolution::NotFound { indicator } => serde_json::json!({
                    "indicator": indicator,
                    "found": false,
                }),
            });
        }

        match resolution {
            MacroResolution::Found(fact) => println!("{}", fact.render()),
            MacroResolution::NotFound { indicator } => {
                println!("No data for indicator '{}'", indicator);
                let loaded: Vec<&str> = macros.indicators().map(|s| s.key()).collect();
                if loaded.is_empty() {
                    println!("No macro series loaded from {}", config.macro_dir().display());
                } else {
                    println!("Loaded indicators: {}", loaded.join(", "));
                }
            }
        }
        Ok(())
    }
}
