use super::{EmbeddingProvider, EmbeddingVector, ModelProfile, ProviderSettings, preprocess_text};
use crate::error::{ConfigError, ContextError, ProviderError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const PROVIDER: &str = "FastEmbed";

/// Local ONNX embedding provider backed by FastEmbed
///
/// Inference runs on the blocking pool; the model needs exclusive access
/// while embedding, so it sits behind a mutex.
pub struct FastEmbedManager {
    model: Arc<Mutex<TextEmbedding>>,
    profile: ModelProfile,
}

/// Map a model name onto a FastEmbed model
pub fn fastembed_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            Some(EmbeddingModel::AllMiniLML6V2)
        }
        "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
            Some(EmbeddingModel::AllMiniLML12V2)
        }
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        _ => None,
    }
}

fn canonical_name(model: &EmbeddingModel) -> &'static str {
    match model {
        EmbeddingModel::AllMiniLML12V2 => "all-MiniLM-L12-v2",
        EmbeddingModel::BGESmallENV15 => "BAAI/bge-small-en-v1.5",
        EmbeddingModel::BGEBaseENV15 => "BAAI/bge-base-en-v1.5",
        _ => "all-MiniLM-L6-v2",
    }
}

impl FastEmbedManager {
    /// Create a provider with the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self, ContextError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2, None)
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ContextError> {
        let model = fastembed_model(&settings.model).ok_or_else(|| ConfigError::InvalidValue {
            key: "embedding.model".to_string(),
            reason: format!(
                "'{}' is not a supported FastEmbed model (all-MiniLM-L6-v2, all-MiniLM-L12-v2, \
                 BAAI/bge-small-en-v1.5, BAAI/bge-base-en-v1.5)",
                settings.model
            ),
        })?;
        Self::with_model(model, settings.output_dimensionality)
    }

    /// Create a provider with a specific model
    ///
    /// An `output_dimensionality` below the native size truncates every vector
    /// to that prefix.
    pub fn with_model(
        model: EmbeddingModel,
        output_dimensionality: Option<usize>,
    ) -> Result<Self, ContextError> {
        tracing::info!("Initializing FastEmbed model: {:?}", model);

        let profile = ModelProfile::resolve(canonical_name(&model), output_dimensionality);

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = true;

        let embedding_model = TextEmbedding::try_new(options)
            .map_err(|e| ProviderError::Local(format!("failed to initialize model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding_model)),
            profile,
        })
    }

    fn shape(
        &self,
        raw: Vec<Vec<f32>>,
        expected: usize,
    ) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if raw.len() != expected {
            return Err(ProviderError::CountMismatch {
                provider: PROVIDER.to_string(),
                expected,
                actual: raw.len(),
            });
        }

        let target = self.profile.dimension;
        raw.into_iter()
            .enumerate()
            .map(|(i, mut values)| {
                if values.is_empty() {
                    return Err(ProviderError::empty(
                        PROVIDER,
                        format!("embedding at index {} has no values", i),
                    ));
                }
                if values.len() < target {
                    return Err(ProviderError::DimensionMismatch {
                        expected: target,
                        actual: values.len(),
                    });
                }
                values.truncate(target);
                Ok(EmbeddingVector::new(values))
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedManager {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::empty(PROVIDER, "model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let inputs: Vec<String> = texts
            .iter()
            .map(|text| preprocess_text(text, self.profile.max_tokens))
            .collect();
        let model = Arc::clone(&self.model);

        let raw = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| ProviderError::Local("embedding model lock poisoned".to_string()))?;
            model
                .embed(inputs, None)
                .map_err(|e| ProviderError::Local(format!("failed to generate embeddings: {}", e)))
        })
        .await
        .map_err(|e| ProviderError::Local(format!("embedding task failed: {}", e)))??;

        self.shape(raw, texts.len())
    }

    fn dimension(&self) -> usize {
        self.profile.dimension
    }

    fn supported_dimensions(&self) -> BTreeSet<usize> {
        self.profile.supported_dimensions.clone()
    }

    fn max_input_tokens(&self) -> usize {
        self.profile.max_tokens
    }

    fn model_name(&self) -> &str {
        &self.profile.model
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
