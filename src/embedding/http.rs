//! Request plumbing shared by the HTTP embedding backends

use super::EmbeddingVector;
use crate::error::{ConfigError, ContextError, ProviderError};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest response body excerpt carried in an error
const MAX_ERROR_BODY: usize = 512;

/// Build a JSON client with one optional auth header
pub(crate) fn build_client(
    provider: &str,
    timeout: Duration,
    auth: Option<(HeaderName, String)>,
) -> Result<Client, ContextError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some((name, value)) = auth {
        let mut value = HeaderValue::from_str(&value).map_err(|e| ConfigError::InvalidValue {
            key: format!("{} API key", provider),
            reason: e.to_string(),
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    let client = Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| {
            ProviderError::transport(provider, format!("failed to build HTTP client: {}", e))
        })?;
    Ok(client)
}

/// POST `body` as JSON and decode the success response
///
/// Non-2xx statuses become [`ProviderError::Api`] with the response body.
pub(crate) async fn post_json<B, R>(
    client: &Client,
    provider: &str,
    url: &str,
    body: &B,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    if !status.is_success() {
        return Err(ProviderError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate_body(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: e.to_string(),
    })
}

/// Turn one response vector into an [`EmbeddingVector`], rejecting empty data
pub(crate) fn single_vector(
    provider: &str,
    values: Option<Vec<f32>>,
) -> Result<EmbeddingVector, ProviderError> {
    match values {
        Some(values) if !values.is_empty() => Ok(EmbeddingVector::new(values)),
        _ => Err(ProviderError::empty(provider, "response contained no embedding values")),
    }
}

/// Validate a whole batch; any missing element fails the call
pub(crate) fn collect_batch(
    provider: &str,
    expected: usize,
    vectors: Vec<Option<Vec<f32>>>,
) -> Result<Vec<EmbeddingVector>, ProviderError> {
    if vectors.len() != expected {
        return Err(ProviderError::CountMismatch {
            provider: provider.to_string(),
            expected,
            actual: vectors.len(),
        });
    }

    vectors
        .into_iter()
        .enumerate()
        .map(|(i, values)| match values {
            Some(values) if !values.is_empty() => Ok(EmbeddingVector::new(values)),
            _ => Err(ProviderError::empty(
                provider,
                format!("embedding at index {} has no values", i),
            )),
        })
        .collect()
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
