/// Platform-specific directories and codebase identity normalization
///
/// Data and config locations follow the XDG Base Directory specification on
/// Unix-like systems. Codebase paths are reduced to a [`CodebaseIdentity`], the
/// only key the snapshot store accepts.
use crate::error::PathError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

const PROJECT_DIR_NAME: &str = "codebase-context";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
                })
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Returns: {data_dir}/codebase-context
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(PROJECT_DIR_NAME)
    }

    /// Returns: {config_dir}/codebase-context
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR_NAME)
    }

    /// Returns: {data_dir}/codebase-context/snapshot.json
    pub fn default_snapshot_path() -> PathBuf {
        Self::project_data_dir().join("snapshot.json")
    }

    /// Returns: {config_dir}/codebase-context/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}

/// Normalized, canonical path string used as the key for indexing state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodebaseIdentity(String);

impl CodebaseIdentity {
    /// Resolve an on-disk directory to its identity
    ///
    /// Symlinks, `.` and `..` are resolved through the filesystem, so two spellings
    /// of the same directory yield the same identity.
    pub fn resolve(path: &str) -> Result<Self, PathError> {
        if path.trim().is_empty() {
            return Err(PathError::NotFound(path.to_string()));
        }

        let candidate = Path::new(path);
        let metadata = std::fs::metadata(candidate).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PathError::NotFound(path.to_string()),
            _ => PathError::Unresolvable {
                path: path.to_string(),
                reason: e.to_string(),
            },
        })?;
        if !metadata.is_dir() {
            return Err(PathError::NotADirectory(path.to_string()));
        }

        let canonical = std::fs::canonicalize(candidate).map_err(|e| PathError::Unresolvable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(normalize_identity_str(&canonical.to_string_lossy())))
    }

    /// Build an identity without touching the filesystem
    ///
    /// Used when the directory may no longer exist (status and clear of a
    /// deleted codebase). Relative paths are made absolute against the
    /// current directory.
    pub fn from_lexical(path: &str) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));
        Self(normalize_identity_str(&absolute.to_string_lossy()))
    }

    /// Wrap an already-normalized identity string
    pub(crate) fn from_normalized(identity: String) -> Self {
        Self(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Name of the vector collection holding this codebase's chunks
    pub fn collection_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("code_chunks_{}", &hash[..8])
    }
}

impl fmt::Display for CodebaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CodebaseIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a path string: unified separators, no trailing slash, case-folded
/// on case-insensitive filesystems. Idempotent.
pub fn normalize_identity_str(path: &str) -> String {
    let stripped = path
        .strip_prefix(r"\\?\")
        .or_else(|| path.strip_prefix("//?/"))
        .unwrap_or(path);

    let unified = stripped.replace('\\', "/");

    let mut collapsed = String::with_capacity(unified.len());
    let mut prev_slash = false;
    for c in unified.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }

    while collapsed.len() > 1 && collapsed.ends_with('/') && !is_drive_root(&collapsed) {
        collapsed.pop();
    }

    if cfg!(any(target_os = "windows", target_os = "macos")) {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

fn is_drive_root(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}
