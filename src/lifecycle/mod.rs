//! Orchestration of a single indexing run per codebase
//!
//! [`IndexLifecycleManager::run_index`] owns the state transitions of a run
//! (`not_indexed`/`indexed`/`index_failed` → `indexing` → `indexed` or
//! `index_failed`). Chunking, embedding and storage are delegated to the
//! [`IndexingPipeline`] and [`VectorStorage`] collaborators.

use crate::config::{EmbeddingConfig, IndexingConfig};
use crate::error::ContextError;
use crate::paths::CodebaseIdentity;
use crate::snapshot::{IndexStats, IndexStatus, SnapshotStore};
use crate::types::{SearchHit, SplitterKind, normalize_extension};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

/// Message recorded when a run is aborted through its cancellation token
pub const CANCELLED_MESSAGE: &str = "Indexing was cancelled";

/// One progress event emitted by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct IndexProgress {
    /// Percentage in [0, 100]
    pub percentage: f64,
    /// Short description of the current phase
    pub phase: String,
}

impl IndexProgress {
    pub fn new(percentage: f64, phase: impl Into<String>) -> Self {
        Self {
            percentage,
            phase: phase.into(),
        }
    }
}

/// Channel the pipeline reports progress on
pub type ProgressSender = mpsc::UnboundedSender<IndexProgress>;

/// Effective options handed to the pipeline for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub force: bool,
    pub splitter: SplitterKind,
    /// Texts per `embed_batch` call
    pub batch_size: usize,
    /// Extensions to index in addition to the pipeline's built-in set, dotted
    pub custom_extensions: Vec<String>,
    /// Glob patterns to skip in addition to the pipeline's built-in set
    pub ignore_patterns: Vec<String>,
}

/// Caller-facing options for [`IndexLifecycleManager::run_index`]
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub force: bool,
    pub splitter: Option<SplitterKind>,
    pub custom_extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Aborts the run when cancelled
    pub cancel: Option<CancellationToken>,
}

/// Walks, chunks, embeds and stores a codebase
#[async_trait]
pub trait IndexingPipeline: Send + Sync {
    /// Whether the storage backend already holds an index for `path`
    async fn has_index(&self, path: &Path) -> Result<bool>;

    /// Index `path`, reporting non-decreasing progress on `progress`
    async fn index_codebase(
        &self,
        path: &Path,
        options: &PipelineOptions,
        progress: ProgressSender,
    ) -> Result<IndexStats>;
}

/// Vector database operations the core needs outside of a run
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// True when another collection can still be created
    async fn check_collection_limit(&self) -> Result<bool>;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Nearest-neighbour search; `filter` is a backend filter expression
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<String>,
    ) -> Result<Vec<SearchHit>>;
}

/// Drives indexing runs and keeps the snapshot consistent with them
pub struct IndexLifecycleManager {
    snapshot: Arc<RwLock<SnapshotStore>>,
    pipeline: Arc<dyn IndexingPipeline>,
    storage: Arc<dyn VectorStorage>,
    defaults: IndexingConfig,
    batch_size: usize,
}

/// Latest progress seen during a run, kept non-decreasing
#[derive(Debug, Default)]
struct ProgressTracker {
    last: f64,
}

impl ProgressTracker {
    fn observe(&mut self, raw: f64) -> f64 {
        let clamped = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };
        if clamped < self.last {
            tracing::debug!(
                "Progress went backwards ({:.1} < {:.1}), holding at {:.1}",
                clamped,
                self.last,
                self.last
            );
            return self.last;
        }
        self.last = clamped;
        clamped
    }
}

impl IndexLifecycleManager {
    pub fn new(
        snapshot: Arc<RwLock<SnapshotStore>>,
        pipeline: Arc<dyn IndexingPipeline>,
        storage: Arc<dyn VectorStorage>,
        defaults: IndexingConfig,
    ) -> Self {
        Self {
            snapshot,
            pipeline,
            storage,
            defaults,
            batch_size: EmbeddingConfig::default().batch_size,
        }
    }

    /// Set the embedding batch size handed to the pipeline
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn snapshot(&self) -> &Arc<RwLock<SnapshotStore>> {
        &self.snapshot
    }

    /// Run one indexing pass over `path`
    ///
    /// Pre-flight failures (bad path, run already active, existing index
    /// without `force`, storage at capacity) leave the snapshot untouched.
    /// A pipeline failure is recorded as `index_failed` before the error is
    /// returned.
    pub async fn run_index<F>(
        &self,
        path: &str,
        options: IndexOptions,
        on_progress: F,
    ) -> Result<IndexStats, ContextError>
    where
        F: FnMut(IndexProgress) + Send,
    {
        let identity = CodebaseIdentity::resolve(path)?;
        self.run_resolved(&identity, options, on_progress).await
    }

    /// [`run_index`](Self::run_index) for an already resolved codebase
    pub async fn run_resolved<F>(
        &self,
        identity: &CodebaseIdentity,
        options: IndexOptions,
        mut on_progress: F,
    ) -> Result<IndexStats, ContextError>
    where
        F: FnMut(IndexProgress) + Send,
    {
        if self.snapshot.read().await.get_status(identity) == IndexStatus::Indexing {
            return Err(ContextError::Concurrency {
                path: identity.to_string(),
            });
        }

        let has_index = self
            .pipeline
            .has_index(identity.as_path())
            .await
            .map_err(|e| ContextError::Storage(format!("{:#}", e)))?;
        if has_index && !options.force {
            return Err(ContextError::AlreadyIndexed {
                path: identity.to_string(),
            });
        }

        let has_capacity = self
            .storage
            .check_collection_limit()
            .await
            .map_err(|e| ContextError::Storage(format!("{:#}", e)))?;
        if !has_capacity {
            return Err(ContextError::Capacity(format!(
                "cannot create a collection for '{}'",
                identity
            )));
        }

        let pipeline_options = merge_options(&self.defaults, self.batch_size, &options);
        self.begin(identity).await?;

        tracing::info!(
            "Indexing {} (force={}, splitter={:?})",
            identity,
            pipeline_options.force,
            pipeline_options.splitter
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = ProgressTracker::default();
        let cancel = options.cancel.clone();

        let outcome = {
            let run = self
                .pipeline
                .index_codebase(identity.as_path(), &pipeline_options, tx);
            tokio::pin!(run);

            let cancelled = async {
                match &cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(cancelled);

            let outcome = loop {
                tokio::select! {
                    result = &mut run => break result,
                    Some(event) = rx.recv() => {
                        self.forward(identity, &mut tracker, event, &mut on_progress).await;
                    }
                    _ = &mut cancelled => {
                        tracing::info!("Indexing of {} cancelled", identity);
                        break Err(anyhow::anyhow!(CANCELLED_MESSAGE));
                    }
                }
            };

            while let Ok(event) = rx.try_recv() {
                self.forward(identity, &mut tracker, event, &mut on_progress)
                    .await;
            }
            outcome
        };

        match outcome {
            Ok(stats) => {
                let pending = {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.set_indexed(identity, stats.clone());
                    snapshot.prepare_save()?
                };
                pending.write_async().await?;
                tracing::info!(
                    "Indexed {}: {} files, {} chunks ({})",
                    identity,
                    stats.indexed_files,
                    stats.total_chunks,
                    stats.status
                );
                Ok(stats)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(
                    "Indexing {} failed at {:.1}%: {}",
                    identity,
                    tracker.last,
                    message
                );

                let pending = {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.set_index_failed(identity, message.clone(), tracker.last);
                    snapshot.prepare_save()
                };
                let saved = match pending {
                    Ok(pending) => pending.write_async().await,
                    Err(e) => Err(e),
                };
                if let Err(save_err) = saved {
                    tracing::warn!("Failed to persist failure of {}: {}", identity, save_err);
                }

                Err(ContextError::IndexFailed {
                    path: identity.to_string(),
                    message,
                })
            }
        }
    }

    /// Transition to `indexing` and persist, undoing the transition if the save fails
    ///
    /// The store lock is released while the file is written; the record stays
    /// `indexing` meanwhile, so no other run can start.
    async fn begin(&self, identity: &CodebaseIdentity) -> Result<(), ContextError> {
        let (previous, pending) = {
            let mut snapshot = self.snapshot.write().await;
            let previous = snapshot.get_record(identity).cloned();

            if !snapshot.try_begin_indexing(identity) {
                return Err(ContextError::Concurrency {
                    path: identity.to_string(),
                });
            }
            (previous, snapshot.prepare_save())
        };

        let saved = match pending {
            Ok(pending) => pending.write_async().await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            let mut snapshot = self.snapshot.write().await;
            if snapshot.get_status(identity) == IndexStatus::Indexing {
                snapshot.restore(identity, previous);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn forward<F>(
        &self,
        identity: &CodebaseIdentity,
        tracker: &mut ProgressTracker,
        event: IndexProgress,
        on_progress: &mut F,
    ) where
        F: FnMut(IndexProgress) + Send,
    {
        let percentage = tracker.observe(event.percentage);
        tracing::debug!("{}: {:.1}% {}", identity, percentage, event.phase);

        on_progress(IndexProgress {
            percentage,
            phase: event.phase,
        });
        self.snapshot
            .write()
            .await
            .update_progress(identity, percentage);
    }
}

/// Merge request options over the configured defaults
///
/// Extensions are dotted and de-duplicated; request values follow the defaults.
fn merge_options(
    defaults: &IndexingConfig,
    batch_size: usize,
    options: &IndexOptions,
) -> PipelineOptions {
    let mut custom_extensions: Vec<String> = Vec::new();
    for ext in defaults
        .custom_extensions
        .iter()
        .chain(options.custom_extensions.iter())
    {
        let ext = normalize_extension(ext);
        if ext.len() > 1 && !custom_extensions.contains(&ext) {
            custom_extensions.push(ext);
        }
    }

    let mut ignore_patterns: Vec<String> = Vec::new();
    for pattern in defaults
        .ignore_patterns
        .iter()
        .chain(options.ignore_patterns.iter())
    {
        let pattern = pattern.trim();
        if !pattern.is_empty() && !ignore_patterns.iter().any(|p| p == pattern) {
            ignore_patterns.push(pattern.to_string());
        }
    }

    PipelineOptions {
        force: options.force,
        splitter: options.splitter.unwrap_or(defaults.splitter),
        batch_size,
        custom_extensions,
        ignore_patterns,
    }
}
