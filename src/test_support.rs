//! In-memory collaborators shared by unit tests

use crate::embedding::{EmbeddingProvider, EmbeddingVector};
use crate::error::ProviderError;
use crate::lifecycle::{
    IndexProgress, IndexingPipeline, PipelineOptions, ProgressSender, VectorStorage,
};
use crate::snapshot::IndexStats;
use crate::types::SearchHit;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Scripted pipeline: emits `events`, then finishes with `result`
pub(crate) struct MockPipeline {
    pub has_index: bool,
    pub events: Vec<f64>,
    pub result: std::result::Result<IndexStats, String>,
    /// Wait for a notification before finishing
    pub gate: Option<Arc<Notify>>,
    /// Never finish after emitting events
    pub hang: bool,
    /// Replace this file with a directory mid-run so snapshot saves fail
    pub break_snapshot_at: Option<PathBuf>,
    /// Delete the codebase directory before finishing
    pub remove_codebase: bool,
    pub calls: AtomicUsize,
    pub last_options: Mutex<Option<PipelineOptions>>,
}

impl MockPipeline {
    pub fn succeeding(indexed_files: usize, total_chunks: usize) -> Self {
        Self {
            has_index: false,
            events: vec![0.0, 50.0, 100.0],
            result: Ok(IndexStats::completed(indexed_files, total_chunks)),
            gate: None,
            hang: false,
            break_snapshot_at: None,
            remove_codebase: false,
            calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn failing(events: Vec<f64>, message: &str) -> Self {
        Self {
            events,
            result: Err(message.to_string()),
            ..Self::succeeding(0, 0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexingPipeline for MockPipeline {
    async fn has_index(&self, _path: &Path) -> Result<bool> {
        Ok(self.has_index)
    }

    async fn index_codebase(
        &self,
        path: &Path,
        options: &PipelineOptions,
        progress: ProgressSender,
    ) -> Result<IndexStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());

        for pct in &self.events {
            let _ = progress.send(IndexProgress::new(*pct, "embedding"));
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(path) = &self.break_snapshot_at {
            let _ = std::fs::remove_file(path);
            std::fs::create_dir_all(path)?;
        }
        if self.remove_codebase {
            std::fs::remove_dir_all(path)?;
        }

        self.result.clone().map_err(|msg| anyhow::anyhow!(msg))
    }
}

/// Vector storage backed by a set of collection names
pub(crate) struct MockStorage {
    pub capacity_available: bool,
    pub collections: Mutex<HashSet<String>>,
    pub hits: Vec<SearchHit>,
    pub last_search: Mutex<Option<(String, usize, usize, Option<String>)>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            capacity_available: true,
            collections: Mutex::new(HashSet::new()),
            hits: Vec::new(),
            last_search: Mutex::new(None),
        }
    }

    pub fn with_collection(self, name: String) -> Self {
        self.collections.lock().unwrap().insert(name);
        self
    }
}

#[async_trait]
impl VectorStorage for MockStorage {
    async fn check_collection_limit(&self) -> Result<bool> {
        Ok(self.capacity_available)
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().unwrap().contains(name))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<String>,
    ) -> Result<Vec<SearchHit>> {
        *self.last_search.lock().unwrap() =
            Some((name.to_string(), vector.len(), limit, filter));
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Embedder returning constant vectors of a fixed length
pub(crate) struct FixedEmbedder {
    /// Dimension the provider claims
    pub dimension: usize,
    /// Length of the vectors it actually returns
    pub produced: usize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            produced: dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> std::result::Result<EmbeddingVector, ProviderError> {
        Ok(EmbeddingVector::new(vec![0.5; self.produced]))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<EmbeddingVector>, ProviderError> {
        Ok(texts
            .iter()
            .map(|_| EmbeddingVector::new(vec![0.5; self.produced]))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn detect_dimension(&self) -> std::result::Result<usize, ProviderError> {
        Ok(self.produced)
    }

    fn supported_dimensions(&self) -> BTreeSet<usize> {
        BTreeSet::from([self.dimension])
    }

    fn max_input_tokens(&self) -> usize {
        512
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn provider_name(&self) -> &'static str {
        "Fixed"
    }
}
