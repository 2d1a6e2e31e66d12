//! Ollama embeddings backend (`/api/embed`)

use super::http::{build_client, collect_batch, post_json, single_vector};
use super::{EmbeddingProvider, EmbeddingVector, ModelProfile, ProviderSettings, preprocess_text};
use crate::error::{ConfigError, ContextError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const PROVIDER: &str = "Ollama";

pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    profile: ModelProfile,
    output_dimensionality: Option<usize>,
}

impl OllamaEmbedder {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ContextError> {
        let host = settings
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("Ollama host".to_string()))?;

        Ok(Self {
            client: build_client(PROVIDER, settings.timeout, None)?,
            endpoint: format!("{}/api/embed", host.trim_end_matches('/')),
            profile: ModelProfile::resolve(&settings.model, settings.output_dimensionality),
            output_dimensionality: settings.output_dimensionality,
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbedRequest {
            model: &self.profile.model,
            input: inputs,
            dimensions: self.output_dimensionality,
        };
        let response: EmbedResponse =
            post_json(&self.client, PROVIDER, &self.endpoint, &request).await?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        let input = vec![preprocess_text(text, self.profile.max_tokens)];
        let vector = self.request(&input).await?.into_iter().next();
        single_vector(PROVIDER, vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Requesting {} Ollama embeddings", texts.len());

        let inputs: Vec<String> = texts
            .iter()
            .map(|text| preprocess_text(text, self.profile.max_tokens))
            .collect();
        let vectors = self.request(&inputs).await?.into_iter().map(Some).collect();
        collect_batch(PROVIDER, texts.len(), vectors)
    }

    fn dimension(&self) -> usize {
        self.profile.dimension
    }

    /// Local models vary by build, so always ask the server
    async fn detect_dimension(&self) -> Result<usize, ProviderError> {
        tracing::debug!("Probing Ollama dimension for model {}", self.profile.model);
        Ok(self.embed("dimension probe").await?.dimension())
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

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}
