//! Static table of known embedding models
//!
//! Resolution happens once per provider instance; nothing here talks to a backend.

use std::collections::BTreeSet;

/// Dimension assumed for models missing from the registry
pub const DEFAULT_DIMENSION: usize = 3072;

/// Context length (in tokens) assumed for models missing from the registry
pub const DEFAULT_CONTEXT_LENGTH: usize = 2048;

#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub dimension: usize,
    pub context_length: usize,
    pub supported_dimensions: &'static [usize],
}

static KNOWN_MODELS: &[ModelSpec] = &[
    // OpenAI
    ModelSpec {
        name: "text-embedding-3-small",
        dimension: 1536,
        context_length: 8192,
        supported_dimensions: &[512, 1536],
    },
    ModelSpec {
        name: "text-embedding-3-large",
        dimension: 3072,
        context_length: 8192,
        supported_dimensions: &[256, 1024, 3072],
    },
    ModelSpec {
        name: "text-embedding-ada-002",
        dimension: 1536,
        context_length: 8192,
        supported_dimensions: &[1536],
    },
    // Gemini
    ModelSpec {
        name: "gemini-embedding-001",
        dimension: 3072,
        context_length: 2048,
        supported_dimensions: &[3072, 1536, 768, 256],
    },
    ModelSpec {
        name: "text-embedding-004",
        dimension: 768,
        context_length: 2048,
        supported_dimensions: &[768],
    },
    // Ollama
    ModelSpec {
        name: "nomic-embed-text",
        dimension: 768,
        context_length: 8192,
        supported_dimensions: &[768],
    },
    ModelSpec {
        name: "mxbai-embed-large",
        dimension: 1024,
        context_length: 512,
        supported_dimensions: &[1024],
    },
    ModelSpec {
        name: "all-minilm",
        dimension: 384,
        context_length: 256,
        supported_dimensions: &[384],
    },
    // FastEmbed (local)
    ModelSpec {
        name: "all-MiniLM-L6-v2",
        dimension: 384,
        context_length: 256,
        supported_dimensions: &[384],
    },
    ModelSpec {
        name: "all-MiniLM-L12-v2",
        dimension: 384,
        context_length: 256,
        supported_dimensions: &[384],
    },
    ModelSpec {
        name: "BAAI/bge-small-en-v1.5",
        dimension: 384,
        context_length: 512,
        supported_dimensions: &[384],
    },
    ModelSpec {
        name: "BAAI/bge-base-en-v1.5",
        dimension: 768,
        context_length: 512,
        supported_dimensions: &[768],
    },
];

/// Find a model by name
///
/// Accepts Gemini's `models/` prefix and Ollama's `:tag` suffix.
pub fn lookup(model: &str) -> Option<&'static ModelSpec> {
    let name = model.trim();
    let name = name.strip_prefix("models/").unwrap_or(name);
    let name = match name.rsplit_once(':') {
        Some((base, _tag)) if !base.is_empty() => base,
        _ => name,
    };
    KNOWN_MODELS.iter().find(|spec| spec.name == name)
}

/// Effective model parameters for one provider instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub model: String,
    pub dimension: usize,
    pub max_tokens: usize,
    pub supported_dimensions: BTreeSet<usize>,
    /// Whether the model was found in the registry
    pub known: bool,
}

impl ModelProfile {
    /// Resolve dimension and token budget for `model`
    ///
    /// Registry values win over the defaults, and an explicit
    /// `output_dimensionality` wins over both. The override is not checked
    /// against `supported_dimensions`; the backend decides at call time.
    pub fn resolve(model: &str, output_dimensionality: Option<usize>) -> Self {
        let (base_dimension, max_tokens, supported, known) = match lookup(model) {
            Some(spec) => (
                spec.dimension,
                spec.context_length,
                spec.supported_dimensions.iter().copied().collect(),
                true,
            ),
            None => (
                DEFAULT_DIMENSION,
                DEFAULT_CONTEXT_LENGTH,
                BTreeSet::from([DEFAULT_DIMENSION]),
                false,
            ),
        };

        Self {
            model: model.to_string(),
            dimension: output_dimensionality.unwrap_or(base_dimension),
            max_tokens,
            supported_dimensions: supported,
            known,
        }
    }
}
