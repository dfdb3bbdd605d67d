//! Drift detection between the lockfile and the project tree.
//!
//! Signal precedence for each vendor+ref:
//! 1. `NeverSynced` (no lock entry)
//! 2. `Stale` (configured destinations differ from what was locked)
//! 3. `Missing` (locked files absent on disk)
//! 4. `Modified` (locked files hash differently on disk)
//! 5. `Current`
//!
//! A destination written only by range placements is not `Modified` while
//! every placed range still hashes to its recorded `source_hash`; edits
//! elsewhere in such a file belong to the project.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};

use gvendor_core::{LockEntry, Lockfile, RefSpec, VendorConfig};

use crate::error::{io_err, SyncError};
use crate::extract::{content_hash, extract};
use crate::paths::{normalize, resolve_mapping};
use crate::position::PathSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftSignal {
    NeverSynced,
    Current,
    Stale { reason: String },
    Missing { files: Vec<String> },
    Modified { files: Vec<String> },
}

impl DriftSignal {
    pub fn is_current(&self) -> bool {
        matches!(self, DriftSignal::Current)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DriftSignal::NeverSynced => "never synced",
            DriftSignal::Current => "current",
            DriftSignal::Stale { .. } => "stale",
            DriftSignal::Missing { .. } => "missing",
            DriftSignal::Modified { .. } => "modified",
        }
    }
}

/// Status of one configured vendor+ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorStatus {
    pub vendor: String,
    pub git_ref: String,
    pub commit: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub signal: DriftSignal,
}

/// Check every configured vendor+ref, in declaration order.
pub fn check(root: &Path, config: &VendorConfig, lock: &Lockfile) -> Result<Vec<VendorStatus>, SyncError> {
    let mut statuses = Vec::new();
    for vendor in &config.vendors {
        for spec in &vendor.specs {
            let entry = lock.find(&vendor.name.0, &spec.git_ref);
            statuses.push(VendorStatus {
                vendor: vendor.name.0.clone(),
                git_ref: spec.git_ref.clone(),
                commit: entry.map(|e| e.commit_hash.clone()),
                updated: entry.map(|e| e.updated),
                signal: check_entry(root, spec, entry)?,
            });
        }
    }
    Ok(statuses)
}

/// Classify one vendor+ref.
pub fn check_entry(root: &Path, spec: &RefSpec, entry: Option<&LockEntry>) -> Result<DriftSignal, SyncError> {
    let Some(entry) = entry else {
        return Ok(DriftSignal::NeverSynced);
    };

    let mut unlocked = Vec::new();
    for mapping in &spec.mapping {
        let Ok(resolved) = resolve_mapping(spec, mapping) else {
            continue;
        };
        let dest = resolved.dest.path;
        let dir_prefix = format!("{dest}/");
        let covered = entry
            .file_hashes
            .keys()
            .any(|k| *k == dest || k.starts_with(&dir_prefix));
        if !covered {
            unlocked.push(dest);
        }
    }
    if !unlocked.is_empty() {
        unlocked.sort();
        unlocked.dedup();
        return Ok(DriftSignal::Stale {
            reason: format!(
                "{} destination(s) not in the lockfile: {}",
                unlocked.len(),
                preview_files(&unlocked)
            ),
        });
    }

    let mut missing = Vec::new();
    let mut modified = Vec::new();
    for (rel, expected) in &entry.file_hashes {
        let path = root.join(rel);
        match std::fs::read(&path) {
            Ok(bytes) => {
                if &content_hash(&bytes) != expected && !placed_ranges_intact(spec, entry, rel, &bytes) {
                    modified.push(rel.clone());
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => missing.push(rel.clone()),
            Err(err) => return Err(io_err(&path, err)),
        }
    }

    if !missing.is_empty() {
        return Ok(DriftSignal::Missing { files: missing });
    }
    if !modified.is_empty() {
        return Ok(DriftSignal::Modified { files: modified });
    }
    Ok(DriftSignal::Current)
}

/// True when `rel` is written only through destination positions and each
/// recorded placement re-extracts to its locked hash.
fn placed_ranges_intact(spec: &RefSpec, entry: &LockEntry, rel: &str, bytes: &[u8]) -> bool {
    let whole_file_write = spec.mapping.iter().any(|mapping| {
        resolve_mapping(spec, mapping).is_ok_and(|m| {
            m.dest.position.is_none()
                && (m.dest.path == rel || rel.starts_with(&format!("{}/", m.dest.path)))
        })
    });
    if whole_file_write {
        return false;
    }

    let mut placements = entry
        .positions
        .iter()
        .filter_map(|lock| {
            let to = PathSpec::parse(&lock.to).ok()?;
            (normalize(&to.path) == rel).then_some((to.position, &lock.source_hash))
        })
        .peekable();
    if placements.peek().is_none() {
        return false;
    }
    placements.all(|(position, hash)| {
        position.is_some_and(|pos| extract(bytes, &pos).is_ok_and(|e| &e.hash == hash))
    })
}

/// Format age from a chrono timestamp (lock entry `updated`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

fn preview_files(files: &[String]) -> String {
    let mut shown: Vec<&str> = files.iter().take(3).map(String::as_str).collect();
    let rest = files.len().saturating_sub(shown.len());
    let more = format!("+{rest} more");
    if rest > 0 {
        shown.push(more.as_str());
    }
    shown.join(", ")
}
