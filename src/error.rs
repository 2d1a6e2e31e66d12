/// Centralized error types for codebase-context using thiserror
///
/// Every failure the core can report is a structured value here; formatting for
/// users and exit-code mapping belong to whatever command surface wraps the crate.
use thiserror::Error;

/// Main error type for the indexing core
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Codebase '{path}' is already being indexed")]
    Concurrency { path: String },

    #[error("Codebase '{path}' is already indexed; use force to re-index")]
    AlreadyIndexed { path: String },

    #[error("Vector storage capacity reached: {0}")]
    Capacity(String),

    #[error("Indexing failed for '{path}': {message}")]
    IndexFailed { path: String, message: String },

    #[error("Codebase '{path}' is not indexed")]
    NotIndexed { path: String },

    #[error("Vector storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by embedding backends
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} request failed: {reason}")]
    Transport { provider: String, reason: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned no vector data: {detail}")]
    EmptyResponse { provider: String, detail: String },

    #[error("{provider} returned an unreadable response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{provider} returned {actual} embeddings for {expected} inputs")]
    CountMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Local embedding model failed: {0}")]
    Local(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors for an invalid indexing target
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path does not exist: {0}")]
    NotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to resolve path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// Errors related to request validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{field} must be {constraint}, got {actual}")]
    ConstraintViolation {
        field: String,
        constraint: String,
        actual: String,
    },

    #[error("Empty {0}")]
    Empty(String),
}

/// Errors related to snapshot persistence
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to save snapshot to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Failed to lock snapshot '{path}': {reason}")]
    LockFailed { path: String, reason: String },
}

impl ProviderError {
    pub(crate) fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Transport {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn empty(provider: &str, detail: impl Into<String>) -> Self {
        ProviderError::EmptyResponse {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    /// Whether the failure came from the network rather than the response content
    pub fn is_transport(&self) -> bool {
        match self {
            ProviderError::Transport { .. } => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl ContextError {
    /// Convert to a user-facing error string suitable for tool responses
    pub fn to_user_string(&self) -> String {
        format!("{}", self)
    }

    /// Check if this is a user error (bad input, missing precondition) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ContextError::Validation(_)
                | ContextError::Path(_)
                | ContextError::AlreadyIndexed { .. }
                | ContextError::NotIndexed { .. }
                | ContextError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if retrying the same call later can succeed without changes
    pub fn is_retryable(&self) -> bool {
        match self {
            ContextError::Concurrency { .. } | ContextError::Capacity(_) => true,
            ContextError::Provider(e) => e.is_transport(),
            _ => false,
        }
    }
}
