//! Core library client for codebase-context
//!
//! [`ContextClient`] is the entry point a command surface (CLI, MCP server,
//! editor plugin) wraps. It wires the embedding provider, the snapshot and
//! the lifecycle manager together and exposes the index, search, status and
//! clear operations.

use crate::config::{AmbientEnv, Config};
use crate::embedding::{EmbeddingProvider, ProviderConfig, ProviderSettings, create_provider};
use crate::error::{ContextError, ProviderError, ValidationError};
use crate::lifecycle::{
    IndexLifecycleManager, IndexOptions, IndexProgress, IndexingPipeline, VectorStorage,
};
use crate::paths::CodebaseIdentity;
use crate::snapshot::{IndexRecord, IndexStatus, SnapshotStore};
use crate::types::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Main client for indexing and searching codebases
///
/// # Example
///
/// ```no_run
/// use codebase_context::{AmbientEnv, Config, ContextClient, IndexRequest};
/// # use codebase_context::lifecycle::{IndexingPipeline, VectorStorage};
/// # use std::sync::Arc;
///
/// # async fn run(
/// #     pipeline: Arc<dyn IndexingPipeline>,
/// #     storage: Arc<dyn VectorStorage>,
/// # ) -> Result<(), codebase_context::ContextError> {
/// let env = AmbientEnv::capture();
/// let config = Config::new(&env)?;
/// let client = ContextClient::new(config, &env, pipeline, storage)?;
///
/// let response = client
///     .index_codebase(IndexRequest::new("/path/to/code"), |p| {
///         println!("{:.0}% {}", p.percentage, p.phase)
///     })
///     .await?;
/// println!("Indexed {} files", response.indexed_files);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ContextClient {
    pub(crate) embedding: Arc<dyn EmbeddingProvider>,
    pub(crate) storage: Arc<dyn VectorStorage>,
    pub(crate) lifecycle: Arc<IndexLifecycleManager>,
    pub(crate) snapshot: Arc<RwLock<SnapshotStore>>,
    pub(crate) config: Arc<Config>,
}

impl ContextClient {
    /// Create a client, resolving the embedding provider from config and environment
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - A mandatory provider setting (API key, host) cannot be resolved
    pub fn new(
        config: Config,
        env: &AmbientEnv,
        pipeline: Arc<dyn IndexingPipeline>,
        storage: Arc<dyn VectorStorage>,
    ) -> Result<Self, ContextError> {
        Self::with_provider_config(config, &ProviderConfig::default(), env, pipeline, storage)
    }

    /// Create a client with explicit provider settings taking precedence
    pub fn with_provider_config(
        config: Config,
        provider: &ProviderConfig,
        env: &AmbientEnv,
        pipeline: Arc<dyn IndexingPipeline>,
        storage: Arc<dyn VectorStorage>,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        let settings = ProviderSettings::resolve(provider, &config.embedding, env)?;
        tracing::debug!("Resolved embedding settings: {:?}", settings);
        let embedding = create_provider(&settings)?;
        Self::with_components(config, embedding, pipeline, storage)
    }

    /// Create a client from already-built components
    ///
    /// Loads the snapshot and drops records of codebases that no longer exist.
    pub fn with_components(
        config: Config,
        embedding: Arc<dyn EmbeddingProvider>,
        pipeline: Arc<dyn IndexingPipeline>,
        storage: Arc<dyn VectorStorage>,
    ) -> Result<Self, ContextError> {
        config.validate()?;

        let mut store = SnapshotStore::load(&config.snapshot.path);
        let pruned = store.prune_missing();
        if !pruned.is_empty() {
            tracing::info!("Pruned {} missing codebases from snapshot", pruned.len());
            if let Err(e) = store.save() {
                tracing::warn!("Failed to save pruned snapshot: {}", e);
            }
        }

        let snapshot = Arc::new(RwLock::new(store));
        let lifecycle = Arc::new(
            IndexLifecycleManager::new(
                Arc::clone(&snapshot),
                pipeline,
                Arc::clone(&storage),
                config.indexing.clone(),
            )
            .with_batch_size(config.embedding.batch_size),
        );

        Ok(Self {
            embedding,
            storage,
            lifecycle,
            snapshot,
            config: Arc::new(config),
        })
    }

    /// Index a codebase, reporting progress to `on_progress`
    pub async fn index_codebase<F>(
        &self,
        request: IndexRequest,
        on_progress: F,
    ) -> Result<IndexResponse, ContextError>
    where
        F: FnMut(IndexProgress) + Send,
    {
        self.index_codebase_with_cancel(request, None, on_progress)
            .await
    }

    /// Index a codebase; cancelling `cancel` aborts the run as a failure
    pub async fn index_codebase_with_cancel<F>(
        &self,
        request: IndexRequest,
        cancel: Option<CancellationToken>,
        on_progress: F,
    ) -> Result<IndexResponse, ContextError>
    where
        F: FnMut(IndexProgress) + Send,
    {
        request.validate()?;
        let start = Instant::now();
        let identity = CodebaseIdentity::resolve(&request.path)?;

        let options = IndexOptions {
            force: request.force,
            splitter: request.splitter,
            custom_extensions: request.custom_extensions,
            ignore_patterns: request.ignore_patterns,
            cancel,
        };
        let stats = self
            .lifecycle
            .run_resolved(&identity, options, on_progress)
            .await?;

        Ok(IndexResponse {
            path: identity.to_string(),
            indexed_files: stats.indexed_files,
            total_chunks: stats.total_chunks,
            status: stats.status,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Report the indexing state of a codebase
    ///
    /// Works for codebases whose directory has since been deleted.
    pub async fn get_indexing_status(
        &self,
        request: StatusRequest,
    ) -> Result<StatusResponse, ContextError> {
        let identity = identity_for_lookup(&request.path)?;
        let snapshot = self.snapshot.read().await;
        let status = snapshot.get_status(&identity);
        let record = snapshot.get_record(&identity);

        Ok(StatusResponse {
            path: identity.to_string(),
            status,
            progress_percentage: record.map(|r| r.progress_percentage),
            last_indexed_stats: record.and_then(|r| r.last_indexed_stats.clone()),
            last_error: record.and_then(|r| r.last_error.clone()),
            updated_at: record.map(|r| r.updated_at.to_rfc3339()),
            message: status_message(&identity, record),
        })
    }

    /// Drop a codebase's collection and forget its state
    ///
    /// Clearing something that was never indexed is not an error.
    pub async fn clear_index(
        &self,
        request: ClearRequest,
    ) -> Result<ClearResponse, ContextError> {
        let identity = identity_for_lookup(&request.path)?;
        let collection = identity.collection_name();

        let collection_dropped = if self
            .storage
            .has_collection(&collection)
            .await
            .map_err(|e| ContextError::Storage(format!("{:#}", e)))?
        {
            self.storage
                .drop_collection(&collection)
                .await
                .map_err(|e| ContextError::Storage(format!("{:#}", e)))?;
            true
        } else {
            false
        };

        let (had_record, pending) = {
            let mut snapshot = self.snapshot.write().await;
            if snapshot.get_status(&identity) == IndexStatus::Indexing {
                tracing::warn!("Clearing {} while a run is recorded as active", identity);
            }
            let had_record = snapshot.clear(&identity);
            let pending = if had_record {
                Some(snapshot.prepare_save()?)
            } else {
                None
            };
            (had_record, pending)
        };
        if let Some(pending) = pending {
            pending.write_async().await?;
        }

        tracing::info!(
            "Cleared {} (record: {}, collection dropped: {})",
            identity,
            had_record,
            collection_dropped
        );

        Ok(ClearResponse {
            path: identity.to_string(),
            existed: had_record || collection_dropped,
            collection_dropped,
        })
    }

    /// Semantic search over an indexed (or still indexing) codebase
    pub async fn search_code(
        &self,
        request: SearchRequest,
    ) -> Result<SearchResponse, ContextError> {
        request.validate()?;
        let start = Instant::now();
        let identity = CodebaseIdentity::resolve(&request.path)?;

        let indexing_in_progress = match self.snapshot.read().await.get_status(&identity) {
            IndexStatus::Indexed => false,
            IndexStatus::Indexing => true,
            IndexStatus::NotIndexed | IndexStatus::IndexFailed => {
                return Err(ContextError::NotIndexed {
                    path: identity.to_string(),
                });
            }
        };

        let query = self.embedding.embed(&request.query).await?;
        let expected = self.embedding.dimension();
        if query.dimension() != expected {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: query.dimension(),
            }
            .into());
        }

        let filter = extension_filter(&request.extension_filter);
        let results = self
            .storage
            .search(
                &identity.collection_name(),
                query.values(),
                request.limit,
                filter,
            )
            .await
            .map_err(|e| ContextError::Storage(format!("{:#}", e)))?;

        Ok(SearchResponse {
            results,
            indexing_in_progress,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Build a search request using the configured default limit
    pub fn search_request(
        &self,
        path: impl Into<String>,
        query: impl Into<String>,
    ) -> SearchRequest {
        SearchRequest {
            path: path.into(),
            query: query.into(),
            limit: self.config.search.limit,
            extension_filter: Vec::new(),
        }
    }

    /// Check that the backend really produces the configured dimension
    pub async fn verify_embedding_dimension(&self) -> Result<usize, ContextError> {
        let expected = self.embedding.dimension();
        let detected = self.embedding.detect_dimension().await?;
        if detected != expected {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: detected,
            }
            .into());
        }
        Ok(detected)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the embedding dimension
    pub fn embedding_dimension(&self) -> usize {
        self.embedding.dimension()
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding
    }
}

/// Identity for read-only lookups: canonical if the directory exists, lexical otherwise
fn identity_for_lookup(path: &str) -> Result<CodebaseIdentity, ContextError> {
    if path.trim().is_empty() {
        return Err(ValidationError::Empty("path".to_string()).into());
    }
    Ok(CodebaseIdentity::resolve(path).unwrap_or_else(|_| CodebaseIdentity::from_lexical(path)))
}

fn status_message(identity: &CodebaseIdentity, record: Option<&IndexRecord>) -> String {
    let Some(record) = record else {
        return format!("Codebase '{}' is not indexed", identity);
    };

    match record.status {
        IndexStatus::NotIndexed => format!("Codebase '{}' is not indexed", identity),
        IndexStatus::Indexing => format!(
            "Codebase '{}' is being indexed ({:.1}%)",
            identity, record.progress_percentage
        ),
        IndexStatus::Indexed => match &record.last_indexed_stats {
            Some(stats) => format!(
                "Codebase '{}' is indexed: {} files, {} chunks ({})",
                identity, stats.indexed_files, stats.total_chunks, stats.status
            ),
            None => format!("Codebase '{}' is indexed", identity),
        },
        IndexStatus::IndexFailed => format!(
            "Indexing of '{}' failed at {:.1}%: {}",
            identity,
            record.progress_percentage,
            record.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Vector storage filter for an extension allow-list
fn extension_filter(extensions: &[String]) -> Option<String> {
    let mut normalized: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = normalize_extension(ext);
        if ext.len() > 1 && !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }
    if normalized.is_empty() {
        return None;
    }

    let quoted: Vec<String> = normalized.iter().map(|ext| format!("\"{}\"", ext)).collect();
    Some(format!("fileExtension in [{}]", quoted.join(", ")))
}

#[cfg(test)]
mod tests;
