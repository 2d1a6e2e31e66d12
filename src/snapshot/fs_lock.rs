//! Filesystem-based locking for cross-process snapshot writes
//!
//! Uses flock() on a sibling `.lock` file so that two processes sharing one
//! snapshot never interleave their temp-file-and-rename sequences. The lock
//! covers a single `save()`; it does not merge concurrent writers' state.

use crate::error::SnapshotError;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Get the lock file path for a given snapshot file
pub(crate) fn lock_file_path(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".lock");
    snapshot_path.with_file_name(name)
}

/// Guard that holds an exclusive filesystem lock
///
/// The lock is released when this guard is dropped. If the process crashes,
/// the OS releases the flock.
pub(crate) struct FsLockGuard {
    file: File,
    path: PathBuf,
}

impl FsLockGuard {
    /// Try to acquire an exclusive lock, non-blocking
    ///
    /// Returns:
    /// - `Ok(Some(guard))` if the lock was acquired
    /// - `Ok(None)` if another holder has it
    /// - `Err(...)` on IO errors
    pub(crate) fn try_acquire(snapshot_path: &Path) -> Result<Option<Self>, SnapshotError> {
        let lock_path = lock_file_path(snapshot_path);
        let lock_err = |reason: String| SnapshotError::LockFailed {
            path: lock_path.display().to_string(),
            reason,
        };

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| lock_err(format!("failed to create lock directory: {}", e)))?;
        }

        let file = File::create(&lock_path)
            .map_err(|e| lock_err(format!("failed to create lock file: {}", e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired snapshot lock {:?}", lock_path);
                Ok(Some(Self {
                    file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Snapshot lock {:?} held by another writer", lock_path);
                Ok(None)
            }
            Err(e) => Err(lock_err(e.to_string())),
        }
    }

    /// Acquire the lock, polling until `timeout` expires
    pub(crate) fn acquire_blocking(
        snapshot_path: &Path,
        timeout: Duration,
    ) -> Result<Self, SnapshotError> {
        let start = Instant::now();
        let sleep_interval = Duration::from_millis(25);

        loop {
            if let Some(guard) = Self::try_acquire(snapshot_path)? {
                return Ok(guard);
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timeout waiting for snapshot lock on {:?} after {:?}",
                    snapshot_path,
                    timeout
                );
                return Err(SnapshotError::LockFailed {
                    path: lock_file_path(snapshot_path).display().to_string(),
                    reason: format!("timed out after {:?}", timeout),
                });
            }
            std::thread::sleep(sleep_interval);
        }
    }
}

impl Drop for FsLockGuard {
    fn drop(&mut self) {
        // The lock file itself is left in place for reuse
        let _ = FileExt::unlock(&self.file);
        tracing::debug!("Released snapshot lock {:?}", self.path);
    }
}
