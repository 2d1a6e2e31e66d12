//! Layered resolution of embedding provider settings
//!
//! Precedence: explicit [`ProviderConfig`] > instance defaults
//! ([`EmbeddingConfig`]) > [`AmbientEnv`] > built-in fallback.

use super::ProviderKind;
use crate::config::{AmbientEnv, EmbeddingConfig};
use crate::error::ConfigError;
use std::fmt;
use std::time::Duration;

/// Explicit provider configuration supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub output_dimensionality: Option<usize>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Fully resolved, immutable provider settings
#[derive(Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub output_dimensionality: Option<usize>,
    pub api_key: Option<String>,
    /// Endpoint root; `None` for in-process backends
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("output_dimensionality", &self.output_dimensionality)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn pick(
    explicit: &Option<String>,
    instance: &Option<String>,
    ambient: Option<&str>,
    fallback: Option<&str>,
) -> Option<String> {
    non_blank(explicit)
        .or_else(|| non_blank(instance))
        .or(ambient)
        .or(fallback)
        .map(str::to_string)
}

impl ProviderSettings {
    /// Resolve every setting once; fails fast if a mandatory value is missing
    pub fn resolve(
        explicit: &ProviderConfig,
        instance: &EmbeddingConfig,
        env: &AmbientEnv,
    ) -> Result<Self, ConfigError> {
        let kind = match explicit.provider.or(instance.provider) {
            Some(kind) => kind,
            None => match env.get("EMBEDDING_PROVIDER") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: "EMBEDDING_PROVIDER".to_string(),
                    reason,
                })?,
                None => ProviderKind::OpenAi,
            },
        };

        let model = pick(
            &explicit.model,
            &instance.model,
            env.first(kind.model_env_keys()),
            Some(kind.default_model()),
        )
        .unwrap_or_else(|| kind.default_model().to_string());

        let api_key = pick(
            &explicit.api_key,
            &instance.api_key,
            env.first(kind.api_key_env_keys()),
            None,
        );
        if kind.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingRequired(format!(
                "{} API key (set {})",
                kind,
                kind.api_key_env_keys().join(" or ")
            )));
        }

        let base_url = pick(
            &explicit.base_url,
            &instance.base_url,
            env.first(kind.base_url_env_keys()),
            kind.default_base_url(),
        )
        .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = &base_url {
            reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                key: "embedding.base_url".to_string(),
                reason: format!("'{}' is not a valid URL: {}", url, e),
            })?;
        }

        let output_dimensionality = match explicit
            .output_dimensionality
            .or(instance.output_dimensionality)
        {
            Some(dim) => Some(dim),
            None => match env.get("EMBEDDING_DIMENSIONS") {
                Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "EMBEDDING_DIMENSIONS".to_string(),
                    reason: format!("expected a positive integer, got '{}'", raw),
                })?),
                None => None,
            },
        };
        if output_dimensionality == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "output_dimensionality".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            kind,
            model,
            output_dimensionality,
            api_key,
            base_url,
            timeout: Duration::from_secs(instance.timeout_secs),
        })
    }
}
