//! Incremental sync cache.
//!
//! One JSON document per vendor+ref at
//! `<root>/.gvendor/cache/<vendor>@<ref>.json`, recording the revision last
//! synced and the content hash of every destination file it produced.
//! An entry is usable only when the revision still matches and every file
//! on disk still hashes to what was recorded. Entries are advisory: a
//! missing, unreadable, or corrupt entry is a miss, never an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gvendor_core::config::cache_dir_at;

use crate::error::{io_err, SyncError};
use crate::extract::content_hash;

/// Entries listing more files than this are stored truncated and never
/// allow a skip.
pub const MAX_CACHED_FILES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub path: String,
    pub hash: String,
}

/// On-disk cache payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub vendor: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub revision: String,
    pub synced_at: DateTime<Utc>,
    pub files: Vec<FileChecksum>,
    #[serde(default)]
    pub truncated: bool,
}

impl CacheEntry {
    /// Build an entry from destination hashes, capping at
    /// [`MAX_CACHED_FILES`].
    pub fn new(
        vendor: &str,
        git_ref: &str,
        revision: &str,
        file_hashes: &BTreeMap<String, String>,
    ) -> Self {
        let truncated = file_hashes.len() > MAX_CACHED_FILES;
        let files = file_hashes
            .iter()
            .take(MAX_CACHED_FILES)
            .map(|(path, hash)| FileChecksum {
                path: path.clone(),
                hash: hash.clone(),
            })
            .collect();
        Self {
            vendor: vendor.to_string(),
            git_ref: git_ref.to_string(),
            revision: revision.to_string(),
            synced_at: Utc::now(),
            files,
            truncated,
        }
    }
}

/// File name for a vendor+ref; anything outside `[A-Za-z0-9._-]` becomes
/// `_` so refs like `feature/x` stay a single path component.
pub fn entry_path_at(root: &Path, vendor: &str, git_ref: &str) -> PathBuf {
    cache_dir_at(root).join(format!("{}@{}.json", file_safe(vendor), file_safe(git_ref)))
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Cache rooted at a project directory.
#[derive(Debug, Clone)]
pub struct IncrementalCache {
    root: PathBuf,
}

impl IncrementalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the entry for vendor+ref; `None` when absent or unusable.
    pub fn load(&self, vendor: &str, git_ref: &str) -> Option<CacheEntry> {
        let path = entry_path_at(&self.root, vendor, git_ref);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("ignoring unreadable cache entry {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&contents) {
            // Sanitised file names can collide; the stored key decides.
            Ok(entry) if entry.vendor == vendor && entry.git_ref == git_ref => Some(entry),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("ignoring corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// True only when the stored revision equals `revision`, the entry is
    /// complete, and every recorded file still hashes the same on disk.
    pub fn can_skip(&self, vendor: &str, git_ref: &str, revision: &str) -> bool {
        let Some(entry) = self.load(vendor, git_ref) else {
            return false;
        };
        if entry.revision != revision || entry.truncated || entry.files.is_empty() {
            return false;
        }
        entry.files.iter().all(|f| {
            std::fs::read(self.root.join(&f.path))
                .map(|bytes| content_hash(&bytes) == f.hash)
                .unwrap_or(false)
        })
    }

    /// Persist `entry`, replacing any previous one (temp file + rename).
    pub fn save(&self, entry: &CacheEntry) -> Result<(), SyncError> {
        let path = entry_path_at(&self.root, &entry.vendor, &entry.git_ref);
        let dir = cache_dir_at(&self.root);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| io_err(&path, std::io::Error::other(e)))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    /// Record a fresh sync result for vendor+ref.
    pub fn update(
        &self,
        vendor: &str,
        git_ref: &str,
        revision: &str,
        file_hashes: &BTreeMap<String, String>,
    ) -> Result<(), SyncError> {
        self.save(&CacheEntry::new(vendor, git_ref, revision, file_hashes))
    }
}
