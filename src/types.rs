use crate::config::MAX_SEARCH_LIMIT;
use crate::error::ValidationError;
use crate::snapshot::{IndexStats, IndexStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Code splitter the pipeline should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SplitterKind {
    /// Syntax-aware splitting
    #[default]
    Ast,
    /// Character-based splitting
    Langchain,
}

/// Request to index a codebase
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexRequest {
    /// Path to the codebase directory to index
    pub path: String,
    /// Re-index even if an index already exists
    #[serde(default)]
    pub force: bool,
    /// Code splitter to use (default from configuration)
    #[serde(default)]
    pub splitter: Option<SplitterKind>,
    /// Additional file extensions to include (e.g., [".vue", ".svelte"])
    #[serde(default)]
    pub custom_extensions: Vec<String>,
    /// Additional glob patterns to ignore (e.g., ["static/**", "*.tmp"])
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl IndexRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            force: false,
            splitter: None,
            custom_extensions: Vec::new(),
            ignore_patterns: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.trim().is_empty() {
            return Err(ValidationError::Empty("path".to_string()));
        }

        for ext in &self.custom_extensions {
            if ext.trim().trim_start_matches('.').is_empty() {
                return Err(ValidationError::Empty("custom extension".to_string()));
            }
        }

        for pattern in &self.ignore_patterns {
            globset::Glob::new(pattern).map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// Response from a completed indexing run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexResponse {
    /// Normalized codebase identity
    pub path: String,
    /// Number of files indexed
    pub indexed_files: usize,
    /// Number of chunks stored
    pub total_chunks: usize,
    /// "completed" or "limit_reached"
    pub status: String,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Request for the indexing state of a codebase
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusRequest {
    /// Path to the codebase directory
    pub path: String,
}

/// Current indexing state of a codebase
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    /// Normalized codebase identity
    pub path: String,
    pub status: IndexStatus,
    /// Progress while indexing, or last known progress after a failure
    pub progress_percentage: Option<f64>,
    /// Stats of the most recent successful run
    pub last_indexed_stats: Option<IndexStats>,
    /// Failure message when status is index_failed
    pub last_error: Option<String>,
    /// RFC 3339 timestamp of the last transition
    pub updated_at: Option<String>,
    /// Short description of the state
    pub message: String,
}

/// Request to clear a codebase's index
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearRequest {
    /// Path to the codebase directory
    pub path: String,
}

/// Response from clear operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearResponse {
    /// Normalized codebase identity
    pub path: String,
    /// Whether a snapshot record or a vector collection existed before clearing
    pub existed: bool,
    /// Whether a vector collection was dropped
    pub collection_dropped: bool,
}

/// Request to search an indexed codebase
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    /// Path to the indexed codebase directory
    pub path: String,
    /// Natural language query
    pub query: String,
    /// Number of results to return (default: 10, max: 50)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only return chunks from files with these extensions (e.g., [".rs"])
    #[serde(default)]
    pub extension_filter: Vec<String>,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.trim().is_empty() {
            return Err(ValidationError::Empty("path".to_string()));
        }
        if self.query.trim().is_empty() {
            return Err(ValidationError::Empty("query".to_string()));
        }
        if self.limit == 0 || self.limit > MAX_SEARCH_LIMIT {
            return Err(ValidationError::ConstraintViolation {
                field: "limit".to_string(),
                constraint: format!("between 1 and {}", MAX_SEARCH_LIMIT),
                actual: self.limit.to_string(),
            });
        }
        Ok(())
    }
}

/// A single search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    /// File path relative to the indexed root
    pub relative_path: String,
    /// Starting line number in the file
    pub start_line: usize,
    /// Ending line number in the file
    pub end_line: usize,
    /// Programming language detected
    pub language: String,
    /// The code chunk content
    pub content: String,
    /// Similarity score
    pub score: f32,
}

/// Response from search operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    /// Results ordered by relevance
    pub results: Vec<SearchHit>,
    /// True when the codebase is still being indexed and results may be incomplete
    pub indexing_in_progress: bool,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Normalize a file extension to its dotted form (`rs` -> `.rs`)
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim();
    if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{}", trimmed)
    }
}
