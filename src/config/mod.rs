/// Configuration system for codebase-context
///
/// Supports loading from multiple sources with priority:
/// Explicit values > Config file > Environment variables > Defaults
///
/// The environment is read once into an [`AmbientEnv`] and never consulted again,
/// so a resolved configuration is frozen for the lifetime of whatever holds it.
use crate::embedding::ProviderKind;
use crate::error::{ConfigError, ContextError};
use crate::types::SplitterKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Upper bound for search result limits
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding provider defaults (the instance tier of provider resolution)
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Indexing defaults applied to every run
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Snapshot persistence configuration
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Embedding provider configuration
///
/// Identity fields are optional: anything left unset here falls through to the
/// environment and then to built-in fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: "openai", "gemini", "ollama" or "fastembed"
    #[serde(default)]
    pub provider: Option<ProviderKind>,

    /// Model identifier (e.g., "text-embedding-3-small", "gemini-embedding-001")
    #[serde(default)]
    pub model: Option<String>,

    /// Requested output dimensionality for Matryoshka-capable models
    #[serde(default)]
    pub output_dimensionality: Option<usize>,

    /// API key for network-backed providers
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the provider endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Batch size the indexing pipeline should use for embed_batch calls
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// HTTP timeout in seconds for embedding requests
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Extensions added to the pipeline's defaults on every run
    #[serde(default)]
    pub custom_extensions: Vec<String>,

    /// Ignore patterns added to the pipeline's defaults on every run
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Default splitter when a request doesn't choose one
    #[serde(default)]
    pub splitter: SplitterKind,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot file path
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

fn default_batch_size() -> usize {
    100
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_result_limit() -> usize {
    10
}

fn default_snapshot_path() -> PathBuf {
    crate::paths::PlatformPaths::default_snapshot_path()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            output_dimensionality: None,
            api_key: None,
            base_url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            custom_extensions: Vec::new(),
            ignore_patterns: Vec::new(),
            splitter: SplitterKind::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_result_limit(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
        }
    }
}

/// Frozen view of the process environment
///
/// Captured once at startup and passed explicitly to whatever needs ambient
/// configuration. Empty values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct AmbientEnv {
    vars: HashMap<String, String>,
}

impl AmbientEnv {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an environment from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First set value among `keys`, in order
    pub fn first(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ContextError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, ContextError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ContextError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.embedding.output_dimensionality == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "embedding.output_dimensionality".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.search.limit == 0 || self.search.limit > MAX_SEARCH_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "search.limit".to_string(),
                reason: format!(
                    "must be between 1 and {}, got {}",
                    MAX_SEARCH_LIMIT, self.search.limit
                ),
            }
            .into());
        }

        for pattern in &self.indexing.ignore_patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                return Err(ConfigError::InvalidValue {
                    key: "indexing.ignore_patterns".to_string(),
                    reason: format!("invalid glob '{}': {}", pattern, e),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides for the non-provider settings
    ///
    /// Provider identity (kind, model, key, URL) is resolved separately by
    /// [`crate::embedding::ProviderSettings::resolve`], where the environment
    /// ranks below the config file.
    pub fn apply_env_overrides(&mut self, env: &AmbientEnv) {
        if let Some(path) = env.get("CODE_CONTEXT_SNAPSHOT_PATH") {
            self.snapshot.path = PathBuf::from(path);
        }

        if let Some(batch_size) = env.get("CODE_CONTEXT_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Some(timeout) = env.get("CODE_CONTEXT_TIMEOUT_SECS")
            && let Ok(secs) = timeout.parse()
        {
            self.embedding.timeout_secs = secs;
        }

        if let Some(limit) = env.get("CODE_CONTEXT_SEARCH_LIMIT")
            && let Ok(limit) = limit.parse()
        {
            self.search.limit = limit;
        }
    }

    /// Create a new Config from the default file (if any) and environment overrides
    pub fn new(env: &AmbientEnv) -> Result<Self, ContextError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides(env);
        config.validate()?;
        Ok(config)
    }
}
