//! OpenAI-compatible embeddings backend

use super::http::{build_client, collect_batch, post_json, single_vector};
use super::{EmbeddingProvider, EmbeddingVector, ModelProfile, ProviderSettings, preprocess_text};
use crate::error::{ConfigError, ContextError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const PROVIDER: &str = "OpenAI";

/// Embeddings client for `/embeddings` style endpoints
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    profile: ModelProfile,
    output_dimensionality: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ContextError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("OpenAI API key".to_string()))?;
        let base_url = settings
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("OpenAI base URL".to_string()))?;

        let client = build_client(
            PROVIDER,
            settings.timeout,
            Some((AUTHORIZATION, format!("Bearer {}", api_key.trim()))),
        )?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            profile: ModelProfile::resolve(&settings.model, settings.output_dimensionality),
            output_dimensionality: settings.output_dimensionality,
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Option<Vec<f32>>>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.profile.model,
            input: inputs,
            dimensions: self.output_dimensionality,
        };
        let mut parsed: EmbeddingResponse =
            post_json(&self.client, PROVIDER, &self.endpoint, &request).await?;

        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        let input = vec![preprocess_text(text, self.profile.max_tokens)];
        let vector = self.request(&input).await?.into_iter().next().flatten();
        single_vector(PROVIDER, vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Requesting {} OpenAI embeddings", texts.len());

        let inputs: Vec<String> = texts
            .iter()
            .map(|text| preprocess_text(text, self.profile.max_tokens))
            .collect();
        let vectors = self.request(&inputs).await?;
        collect_batch(PROVIDER, texts.len(), vectors)
    }

    fn dimension(&self) -> usize {
        self.profile.dimension
    }

    /// Registry models answer locally; anything else is probed
    async fn detect_dimension(&self) -> Result<usize, ProviderError> {
        if self.profile.known || self.output_dimensionality.is_some() {
            return Ok(self.profile.dimension);
        }
        tracing::debug!("Probing OpenAI dimension for model {}", self.profile.model);
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
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    index: usize,
}
