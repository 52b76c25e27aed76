//! Application configuration.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - `.finrag/config.yaml` in the workspace (or the file named by `FINRAG_CONFIG`)
//! - `FINRAG_*` environment variables
//! - command-line flags (`with_overrides`)
//!
//! Retrieval and chunking settings live with each knowledge base; this file
//! only carries what every command needs: where the workspace is and how to
//! reach the completion model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

pub const WORKSPACE_DIR: &str = ".finrag";
pub const DEFAULT_BASE: &str = "filings";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_COMPLETION_MODEL: &str = "qwen2.5:3b-instruct";

const KNOWN_PROVIDERS: [&str; 1] = ["ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .finrag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Knowledge base name under `.finrag/knowledge/`
    pub base: String,

    /// Completion provider
    pub provider: String,

    /// Completion model identifier
    pub model: String,

    /// Completion endpoint
    pub endpoint: String,

    /// Per-attempt completion deadline in seconds
    pub timeout_secs: u64,

    /// Completion attempts before the query is reported as failed
    pub max_attempts: u32,

    pub temperature: f32,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    llm: Option<LlmSection>,
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    knowledge: Option<KnowledgeSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    provider: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KnowledgeSection {
    base: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            base: DEFAULT_BASE.to_string(),
            provider: "ollama".to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            timeout_secs: 60,
            max_attempts: 2,
            temperature: 0.2,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the workspace config file and the
    /// environment.
    ///
    /// Environment variables:
    /// - `FINRAG_WORKSPACE`, `FINRAG_CONFIG`, `FINRAG_BASE`
    /// - `FINRAG_PROVIDER`, `FINRAG_MODEL`, `OLLAMA_URL`
    /// - `RUST_LOG`, `NO_COLOR`
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("FINRAG_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        if let Ok(config_file) = std::env::var("FINRAG_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.workspace.join(WORKSPACE_DIR).join("config.yaml"));
        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(base) = std::env::var("FINRAG_BASE") {
            self.base = base;
        }
        if let Ok(provider) = std::env::var("FINRAG_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(model) = std::env::var("FINRAG_MODEL") {
            self.model = model;
        }
        if let Ok(endpoint) = std::env::var("OLLAMA_URL") {
            self.endpoint = endpoint;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(base) = file.knowledge.and_then(|k| k.base) {
            result.base = base;
        }

        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(endpoint) = llm.endpoint {
                result.endpoint = endpoint;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if let Some(timeout) = llm.timeout_secs {
                result.timeout_secs = timeout;
            }
            if let Some(attempts) = llm.max_attempts {
                result.max_attempts = attempts;
            }
            if let Some(temperature) = llm.temperature {
                result.temperature = temperature;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        base: Option<String>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }
        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }
        if let Some(base) = base {
            self.base = base;
        }
        if let Some(provider) = provider {
            self.provider = provider;
        }
        if let Some(model) = model {
            self.model = model;
        }
        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }
        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }
        if no_color {
            self.no_color = true;
        }
        self
    }

    /// Path to the `.finrag` directory.
    pub fn finrag_dir(&self) -> PathBuf {
        self.workspace.join(WORKSPACE_DIR)
    }

    pub fn ensure_finrag_dir(&self) -> AppResult<()> {
        let dir = self.finrag_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", WORKSPACE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Directory holding macro series CSV files.
    pub fn macro_dir(&self) -> PathBuf {
        self.finrag_dir().join("macro")
    }

    pub fn completion_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::Config("llm.timeoutSecs must be greater than 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config("llm.maxAttempts must be at least 1".into()));
        }
        if self.base.trim().is_empty() {
            return Err(AppError::Config("knowledge base name cannot be empty".into()));
        }
        Ok(())
    }
}
