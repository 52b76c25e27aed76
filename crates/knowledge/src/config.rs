//! Knowledge base configuration management.

use finrag_core::config::WORKSPACE_DIR;
use finrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingParams;
use crate::embeddings::EmbeddingConfig;

/// Per-base settings, stored at `.finrag/knowledge/<base>/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    #[serde(default)]
    pub name: String,

    /// Chunk window in words
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared by consecutive chunks; must be smaller than `chunk_size`
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Hits scoring below this are not used to ground an answer
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    #[serde(default = "default_prompt_budget_chars")]
    pub prompt_budget_chars: usize,

    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,

    /// Filings parsed and embedded at the same time
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,

    /// Window around "one year earlier" for year-over-year changes
    #[serde(default = "default_yoy_tolerance_days")]
    pub yoy_tolerance_days: i64,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_chunk_size() -> usize {
    200
}

fn default_chunk_overlap() -> usize {
    30
}

fn default_top_k() -> usize {
    5
}

fn default_min_relevance() -> f32 {
    0.05
}

fn default_prompt_budget_chars() -> usize {
    12_000
}

fn default_max_passage_chars() -> usize {
    1_200
}

fn default_ingest_concurrency() -> usize {
    4
}

fn default_yoy_tolerance_days() -> i64 {
    31
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            min_relevance: default_min_relevance(),
            prompt_budget_chars: default_prompt_budget_chars(),
            max_passage_chars: default_max_passage_chars(),
            ingest_concurrency: default_ingest_concurrency(),
            yoy_tolerance_days: default_yoy_tolerance_days(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl KnowledgeBaseConfig {
    pub fn chunking(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    /// Checked before any command touches the index.
    pub fn validate(&self) -> AppResult<()> {
        self.chunking().validate()?;
        self.embedding.validate()?;
        if self.top_k == 0 {
            return Err(AppError::Config("top_k must be greater than 0".to_string()));
        }
        if self.ingest_concurrency == 0 {
            return Err(AppError::Config(
                "ingest_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.prompt_budget_chars == 0 || self.max_passage_chars == 0 {
            return Err(AppError::Config(
                "prompt_budget_chars and max_passage_chars must be greater than 0".to_string(),
            ));
        }
        if self.yoy_tolerance_days < 0 {
            return Err(AppError::Config(
                "yoy_tolerance_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load knowledge base configuration.
///
/// Loads from `.finrag/knowledge/<base>/config.yaml` if it exists,
/// otherwise returns defaults named after the base.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        config.name = base_name.to_string();

        tracing::debug!("Loaded knowledge base config for '{}'", base_name);
        Ok(config)
    } else {
        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        Ok(KnowledgeBaseConfig {
            name: base_name.to_string(),
            ..Default::default()
        })
    }
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml)?;

    tracing::debug!("Saved knowledge base config for '{}'", config.name);
    Ok(())
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace
        .join(WORKSPACE_DIR)
        .join("knowledge")
        .join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

/// Get the SQLite index path for a base.
pub fn get_index_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), "filings").unwrap();

        assert_eq!(config.name, "filings");
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 30);
        assert_eq!(config.embedding.provider, "trigram");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeBaseConfig {
            name: "my-base".to_string(),
            chunk_size: 400,
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();
        assert!(get_config_path(temp.path(), "my-base").exists());

        let loaded = load_config(temp.path(), "my-base").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: KnowledgeBaseConfig =
            serde_yaml::from_str("chunk_size: 120\nembedding:\n  dimensions: 256\n").unwrap();
        assert_eq!(config.chunk_size, 120);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.embedding.dimensions, 256);
        assert_eq!(config.embedding.model, "trigram-v1");
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_rejected() {
        let config = KnowledgeBaseConfig {
            chunk_size: 50,
            chunk_overlap: 50,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let config = KnowledgeBaseConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_index_path_layout() {
        let path = get_index_path(Path::new("/ws"), "filings");
        assert_eq!(path, PathBuf::from("/ws/.finrag/knowledge/filings/index.sqlite"));
    }
}
