//! Google Gemini embeddings backend

use super::http::{build_client, collect_batch, post_json, single_vector};
use super::{EmbeddingProvider, EmbeddingVector, ModelProfile, ProviderSettings, preprocess_text};
use crate::error::{ConfigError, ContextError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const PROVIDER: &str = "Gemini";

pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    /// Model name as sent in request bodies, always `models/...`
    qualified_model: String,
    profile: ModelProfile,
    output_dimensionality: Option<usize>,
}

impl GeminiEmbedder {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ContextError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("Gemini API key".to_string()))?;
        let base_url = settings
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("Gemini base URL".to_string()))?;

        let client = build_client(
            PROVIDER,
            settings.timeout,
            Some((
                HeaderName::from_static("x-goog-api-key"),
                api_key.trim().to_string(),
            )),
        )?;

        let bare_model = settings
            .model
            .strip_prefix("models/")
            .unwrap_or(&settings.model);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            qualified_model: format!("models/{}", bare_model),
            profile: ModelProfile::resolve(bare_model, settings.output_dimensionality),
            output_dimensionality: settings.output_dimensionality,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.qualified_model, method)
    }

    fn content_request<'a>(&'a self, text: &'a str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.qualified_model,
            content: Content {
                parts: vec![Part { text }],
            },
            output_dimensionality: self.output_dimensionality,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        let text = preprocess_text(text, self.profile.max_tokens);
        let request = self.content_request(&text);

        let response: EmbedContentResponse =
            post_json(&self.client, PROVIDER, &self.endpoint("embedContent"), &request).await?;
        single_vector(PROVIDER, response.embedding.and_then(|e| e.values))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Requesting {} Gemini embeddings", texts.len());

        let prepared: Vec<String> = texts
            .iter()
            .map(|text| preprocess_text(text, self.profile.max_tokens))
            .collect();
        let request = BatchEmbedRequest {
            requests: prepared
                .iter()
                .map(|text| self.content_request(text))
                .collect(),
        };

        let response: BatchEmbedResponse = post_json(
            &self.client,
            PROVIDER,
            &self.endpoint("batchEmbedContents"),
            &request,
        )
        .await?;

        let vectors = response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect();
        collect_batch(PROVIDER, texts.len(), vectors)
    }

    fn dimension(&self) -> usize {
        self.profile.dimension
    }

    /// Unknown models without an override are asked for one real vector
    async fn detect_dimension(&self) -> Result<usize, ProviderError> {
        if self.profile.known || self.output_dimensionality.is_some() {
            return Ok(self.profile.dimension);
        }
        tracing::debug!("Detecting Gemini dimension for model {}", self.profile.model);
        Ok(self.embed("dimension check").await?.dimension())
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
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    #[serde(default)]
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}
