//! Durable record of per-codebase indexing state
//!
//! The store keeps the whole mapping in memory and writes it out only when
//! [`SnapshotStore::save`] is called, so callers decide when a transition has
//! to survive a restart.

mod fs_lock;

use crate::error::SnapshotError;
use crate::paths::{CodebaseIdentity, normalize_identity_str};
use chrono::{DateTime, Utc};
use fs_lock::FsLockGuard;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const FORMAT_VERSION: &str = "v2";

/// How long a save waits for another process to finish its write
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of a codebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Indexing,
    Indexed,
    IndexFailed,
}

/// Outcome of a successful indexing run
///
/// Serializes with snake_case fields like the rest of the request/response
/// types; the snapshot file stores it in camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IndexStats {
    pub indexed_files: usize,
    pub total_chunks: usize,
    /// "completed" or "limit_reached"
    pub status: String,
}

impl IndexStats {
    pub fn completed(indexed_files: usize, total_chunks: usize) -> Self {
        Self {
            indexed_files,
            total_chunks,
            status: "completed".to_string(),
        }
    }
}

/// Persisted state for one codebase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub status: IndexStatus,
    pub progress_percentage: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "stored_stats"
    )]
    pub last_indexed_stats: Option<IndexStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// `IndexStats` as laid out in the snapshot file
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredStats {
    indexed_files: usize,
    total_chunks: usize,
    status: String,
}

mod stored_stats {
    use super::{IndexStats, StoredStats};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        stats: &Option<IndexStats>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        stats
            .as_ref()
            .map(|stats| StoredStats {
                indexed_files: stats.indexed_files,
                total_chunks: stats.total_chunks,
                status: stats.status.clone(),
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<IndexStats>, D::Error> {
        Ok(Option::<StoredStats>::deserialize(deserializer)?.map(|stored| IndexStats {
            indexed_files: stored.indexed_files,
            total_chunks: stored.total_chunks,
            status: stored.status,
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    format_version: String,
    codebases: BTreeMap<String, IndexRecord>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Layout written before per-codebase records existed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySnapshotFile {
    indexed_codebases: Vec<String>,
    #[serde(default)]
    indexing_codebases: HashMap<String, f64>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersistedSnapshot {
    Current(SnapshotFile),
    Legacy(LegacySnapshotFile),
}

/// In-memory mapping of codebase identity to indexing state, backed by a JSON file
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    records: HashMap<CodebaseIdentity, IndexRecord>,
    saves: Arc<SaveSequence>,
}

impl SnapshotStore {
    /// Create an empty store that will persist to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: HashMap::new(),
            saves: Arc::default(),
        }
    }

    /// Load persisted state
    ///
    /// A missing, unreadable or corrupt file yields an empty store. This never
    /// fails; problems are logged and the store starts fresh.
    pub fn load(path: &Path) -> Self {
        let mut store = Self::new(path);

        if !path.exists() {
            tracing::debug!("Snapshot file not found, starting with empty state");
            return store;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read snapshot {:?}: {}, starting fresh", path, e);
                return store;
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&content) {
            Ok(PersistedSnapshot::Current(file)) => {
                if file.format_version != FORMAT_VERSION {
                    tracing::warn!(
                        "Snapshot {:?} has format version '{}', reading as {}",
                        path,
                        file.format_version,
                        FORMAT_VERSION
                    );
                }
                store.records = file
                    .codebases
                    .into_iter()
                    .map(|(identity, record)| {
                        (CodebaseIdentity::from_normalized(identity), record)
                    })
                    .collect();
            }
            Ok(PersistedSnapshot::Legacy(legacy)) => {
                tracing::info!("Migrating legacy snapshot format at {:?}", path);
                store.records = migrate_legacy(legacy);
            }
            Err(e) => {
                tracing::warn!("Failed to parse snapshot {:?}: {}, starting fresh", path, e);
                return store;
            }
        }

        tracing::info!("Loaded snapshot with {} codebases", store.records.len());
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Status of a codebase; `NotIndexed` when no record exists
    pub fn get_status(&self, identity: &CodebaseIdentity) -> IndexStatus {
        self.records
            .get(identity)
            .map(|record| record.status)
            .unwrap_or(IndexStatus::NotIndexed)
    }

    pub fn get_record(&self, identity: &CodebaseIdentity) -> Option<&IndexRecord> {
        self.records.get(identity)
    }

    /// Mark a codebase as indexing, creating the record if needed
    ///
    /// Stats from an earlier successful run are kept; any earlier error is cleared.
    pub fn set_indexing(&mut self, identity: &CodebaseIdentity, initial_progress: f64) {
        let last_indexed_stats = self
            .records
            .get(identity)
            .and_then(|record| record.last_indexed_stats.clone());

        self.records.insert(
            identity.clone(),
            IndexRecord {
                status: IndexStatus::Indexing,
                progress_percentage: clamp_progress(initial_progress),
                last_indexed_stats,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
    }

    /// Transition to indexing unless a run is already recorded as in progress
    ///
    /// Returns false, leaving the record untouched, when the status is already
    /// `Indexing`.
    pub fn try_begin_indexing(&mut self, identity: &CodebaseIdentity) -> bool {
        if self.get_status(identity) == IndexStatus::Indexing {
            return false;
        }
        self.set_indexing(identity, 0.0);
        true
    }

    /// Update live progress of an indexing run (in memory only)
    pub fn update_progress(&mut self, identity: &CodebaseIdentity, percentage: f64) {
        if let Some(record) = self.records.get_mut(identity)
            && record.status == IndexStatus::Indexing
        {
            record.progress_percentage = clamp_progress(percentage);
        }
    }

    pub fn set_indexed(&mut self, identity: &CodebaseIdentity, stats: IndexStats) {
        self.records.insert(
            identity.clone(),
            IndexRecord {
                status: IndexStatus::Indexed,
                progress_percentage: 100.0,
                last_indexed_stats: Some(stats),
                last_error: None,
                updated_at: Utc::now(),
            },
        );
    }

    /// Record a failed run, keeping the last progress and any earlier stats
    pub fn set_index_failed(
        &mut self,
        identity: &CodebaseIdentity,
        message: impl Into<String>,
        last_progress: f64,
    ) {
        let last_indexed_stats = self
            .records
            .get(identity)
            .and_then(|record| record.last_indexed_stats.clone());

        self.records.insert(
            identity.clone(),
            IndexRecord {
                status: IndexStatus::IndexFailed,
                progress_percentage: clamp_progress(last_progress),
                last_indexed_stats,
                last_error: Some(message.into()),
                updated_at: Utc::now(),
            },
        );
    }

    /// Remove a codebase's record. Returns whether one existed.
    pub fn clear(&mut self, identity: &CodebaseIdentity) -> bool {
        self.records.remove(identity).is_some()
    }

    /// Put back a record captured before a failed transition
    pub(crate) fn restore(&mut self, identity: &CodebaseIdentity, previous: Option<IndexRecord>) {
        match previous {
            Some(record) => {
                self.records.insert(identity.clone(), record);
            }
            None => {
                self.records.remove(identity);
            }
        }
    }

    /// Drop records whose directory no longer exists
    pub fn prune_missing(&mut self) -> Vec<CodebaseIdentity> {
        let missing: Vec<CodebaseIdentity> = self
            .records
            .keys()
            .filter(|identity| !identity.as_path().is_dir())
            .cloned()
            .collect();

        for identity in &missing {
            tracing::info!("Removing snapshot record for missing codebase {}", identity);
            self.records.remove(identity);
        }
        missing
    }

    pub fn identities(&self) -> impl Iterator<Item = &CodebaseIdentity> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the full mapping to disk
    ///
    /// Blocks while another writer holds the snapshot lock. Async callers use
    /// [`SnapshotStore::prepare_save`] and [`PendingSave::write_async`] instead.
    pub fn save(&self) -> Result<(), SnapshotError> {
        self.prepare_save()?.write()
    }

    /// Serialize the current mapping into a write that can run after the
    /// caller has released its lock on the store
    ///
    /// Writes prepared by one store are ordered: once a later one has reached
    /// disk, an earlier one that arrives afterwards is dropped.
    pub fn prepare_save(&self) -> Result<PendingSave, SnapshotError> {
        let file = SnapshotFile {
            format_version: FORMAT_VERSION.to_string(),
            codebases: self
                .records
                .iter()
                .map(|(identity, record)| (identity.as_str().to_string(), record.clone()))
                .collect(),
            last_updated: Some(Utc::now()),
        };
        let content =
            serde_json::to_string_pretty(&file).map_err(|e| SnapshotError::SaveFailed {
                path: self.path.display().to_string(),
                reason: format!("failed to serialize: {}", e),
            })?;

        Ok(PendingSave {
            path: self.path.clone(),
            content,
            codebases: self.records.len(),
            sequence: self.saves.issued.fetch_add(1, Ordering::SeqCst) + 1,
            saves: Arc::clone(&self.saves),
        })
    }
}

/// Issued and last-written sequence numbers of a store's saves
#[derive(Debug, Default)]
struct SaveSequence {
    issued: AtomicU64,
    written: AtomicU64,
}

/// A serialized snapshot waiting to be written
#[derive(Debug)]
#[must_use = "a pending save does nothing until it is written"]
pub struct PendingSave {
    path: PathBuf,
    content: String,
    codebases: usize,
    sequence: u64,
    saves: Arc<SaveSequence>,
}

impl PendingSave {
    /// Write to disk on the current thread
    ///
    /// The write goes to a temp file that is renamed over the snapshot while an
    /// exclusive lock is held, so readers never observe a partial file.
    pub fn write(self) -> Result<(), SnapshotError> {
        let save_err = |reason: String| SnapshotError::SaveFailed {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| save_err(format!("failed to create directory: {}", e)))?;
        }

        let _lock = FsLockGuard::acquire_blocking(&self.path, LOCK_TIMEOUT)?;

        if self.saves.written.load(Ordering::SeqCst) > self.sequence {
            tracing::debug!(
                "Skipping snapshot write #{} to {:?}, a newer one is on disk",
                self.sequence,
                self.path
            );
            return Ok(());
        }

        let tmp_path = temp_path(&self.path);
        fs::write(&tmp_path, &self.content)
            .map_err(|e| save_err(format!("failed to write temp file: {}", e)))?;

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(save_err(format!("failed to replace snapshot: {}", e)));
        }
        self.saves.written.fetch_max(self.sequence, Ordering::SeqCst);

        tracing::debug!(
            "Saved snapshot with {} codebases to {:?}",
            self.codebases,
            self.path
        );
        Ok(())
    }

    /// Write to disk on tokio's blocking pool
    ///
    /// Waiting for a contended snapshot lock never occupies a runtime worker.
    pub async fn write_async(self) -> Result<(), SnapshotError> {
        let path = self.path.display().to_string();
        tokio::task::spawn_blocking(move || self.write())
            .await
            .map_err(|e| SnapshotError::SaveFailed {
                path,
                reason: format!("snapshot write task failed: {}", e),
            })?
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn clamp_progress(percentage: f64) -> f64 {
    if percentage.is_nan() {
        0.0
    } else {
        percentage.clamp(0.0, 100.0)
    }
}

fn migrate_legacy(legacy: LegacySnapshotFile) -> HashMap<CodebaseIdentity, IndexRecord> {
    let updated_at = legacy.last_updated.unwrap_or_else(Utc::now);
    let mut records = HashMap::new();

    for path in legacy.indexed_codebases {
        records.insert(
            CodebaseIdentity::from_normalized(normalize_identity_str(&path)),
            IndexRecord {
                status: IndexStatus::Indexed,
                progress_percentage: 100.0,
                last_indexed_stats: None,
                last_error: None,
                updated_at,
            },
        );
    }

    for (path, progress) in legacy.indexing_codebases {
        records.insert(
            CodebaseIdentity::from_normalized(normalize_identity_str(&path)),
            IndexRecord {
                status: IndexStatus::Indexing,
                progress_percentage: clamp_progress(progress),
                last_indexed_stats: None,
                last_error: None,
                updated_at,
            },
        );
    }

    records
}
