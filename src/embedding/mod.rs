//! Embedding provider abstraction
//!
//! Every backend turns text into fixed-dimension vectors behind
//! [`EmbeddingProvider`]. The backend is chosen once by [`create_provider`].

mod fastembed_manager;
mod gemini;
mod http;
mod ollama;
mod openai;
pub mod registry;
mod settings;

pub use fastembed_manager::FastEmbedManager;
pub use gemini::GeminiEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use registry::{DEFAULT_CONTEXT_LENGTH, DEFAULT_DIMENSION, ModelProfile};
pub use settings::{ProviderConfig, ProviderSettings};

use crate::error::{ContextError, ProviderError};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Rough characters-per-token ratio used for truncation
pub const CHARS_PER_TOKEN: usize = 4;

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Ollama,
    FastEmbed,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::FastEmbed => "fastembed",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "text-embedding-3-small",
            ProviderKind::Gemini => "gemini-embedding-001",
            ProviderKind::Ollama => "nomic-embed-text",
            ProviderKind::FastEmbed => "all-MiniLM-L6-v2",
        }
    }

    /// Endpoint used when nothing else is configured; `None` for local backends
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderKind::Ollama => Some("http://127.0.0.1:11434"),
            ProviderKind::FastEmbed => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderKind::OpenAi | ProviderKind::Gemini)
    }

    pub(crate) fn model_env_keys(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Ollama => &["EMBEDDING_MODEL", "OLLAMA_MODEL"],
            _ => &["EMBEDDING_MODEL"],
        }
    }

    pub(crate) fn api_key_env_keys(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Gemini => &["GEMINI_API_KEY"],
            _ => &[],
        }
    }

    pub(crate) fn base_url_env_keys(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["OPENAI_BASE_URL"],
            ProviderKind::Gemini => &["GEMINI_BASE_URL"],
            ProviderKind::Ollama => &["OLLAMA_HOST"],
            ProviderKind::FastEmbed => &[],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "fastembed" => Ok(ProviderKind::FastEmbed),
            other => Err(format!(
                "unknown embedding provider '{}' (expected openai, gemini, ollama or fastembed)",
                other
            )),
        }
    }
}

/// A single embedding; `dimension` always equals `values.len()`
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Vec<f32>,
    dimension: usize,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        let dimension = values.len();
        Self { values, dimension }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Estimate the token count of `text` with the chars-per-token heuristic
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Prepare text for a backend request
///
/// Empty input becomes a single space. Longer input is cut to
/// `max_tokens * CHARS_PER_TOKEN` characters on a char boundary.
pub fn preprocess_text(text: &str, max_tokens: usize) -> String {
    if text.is_empty() {
        return " ".to_string();
    }
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError>;

    /// Embed a batch of texts, preserving input order
    ///
    /// Fails as a whole if any element comes back without vector data.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError>;

    /// Dimension this instance produces
    fn dimension(&self) -> usize;

    /// Dimension reported by the backend
    ///
    /// Backends with a statically known dimension answer without a request.
    async fn detect_dimension(&self) -> Result<usize, ProviderError> {
        Ok(self.dimension())
    }

    fn supported_dimensions(&self) -> BTreeSet<usize>;

    fn is_dimension_supported(&self, dimension: usize) -> bool {
        self.supported_dimensions().contains(&dimension)
    }

    /// Token budget applied when truncating input
    fn max_input_tokens(&self) -> usize;

    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}

/// Build the backend selected by `settings`
pub fn create_provider(
    settings: &ProviderSettings,
) -> Result<Arc<dyn EmbeddingProvider>, ContextError> {
    tracing::info!(
        "Creating {} embedding provider with model {}",
        settings.kind,
        settings.model
    );

    let provider: Arc<dyn EmbeddingProvider> = match settings.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiEmbedder::new(settings)?),
        ProviderKind::Gemini => Arc::new(GeminiEmbedder::new(settings)?),
        ProviderKind::Ollama => Arc::new(OllamaEmbedder::new(settings)?),
        ProviderKind::FastEmbed => Arc::new(FastEmbedManager::from_settings(settings)?),
    };

    tracing::debug!(
        "Embedding provider ready: dimension={}, max_tokens={}",
        provider.dimension(),
        provider.max_input_tokens()
    );
    Ok(provider)
}
