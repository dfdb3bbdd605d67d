//! Domain types for vendor configuration and the lockfile.
//!
//! Mapping paths stay as strings here: the `path[:L<n>...]` position syntax
//! is parsed by `gvendor-sync`, which owns extraction semantics.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed vendor name; the unique key of a [`VendorSpec`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VendorName(pub String);

impl fmt::Display for VendorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VendorName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VendorName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// A source path and a destination path, each optionally suffixed with a
/// position (`src/util.go:L5-L20`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub from: String,
    /// Empty means `<default_target>/<basename of from>`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
}

impl PathMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// One ref (branch, tag, or revision) of a vendor and what to copy from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_target: String,
    #[serde(default)]
    pub mapping: Vec<PathMapping>,
}

/// Shell commands executed around a vendor's sync.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HookSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_sync: Option<String>,
}

/// One tracked dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSpec {
    pub name: VendorName,
    pub url: String,
    #[serde(default)]
    pub license: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HookSpec>,
    pub specs: Vec<RefSpec>,
}

impl VendorSpec {
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn pre_sync_hook(&self) -> Option<&str> {
        self.hooks.as_ref().and_then(|h| h.pre_sync.as_deref())
    }

    pub fn post_sync_hook(&self) -> Option<&str> {
        self.hooks.as_ref().and_then(|h| h.post_sync.as_deref())
    }
}

/// Root of `vendor.yml`. Vendor order is the declaration order and is the
/// iteration order for sequential syncs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub vendors: Vec<VendorSpec>,
}

impl VendorConfig {
    pub fn find(&self, name: &str) -> Option<&VendorSpec> {
        self.vendors.iter().find(|v| v.name.0 == name)
    }
}

// ---------------------------------------------------------------------------
// Lockfile
// ---------------------------------------------------------------------------

/// Current on-disk lockfile schema.
pub const LOCK_SCHEMA_VERSION: u32 = 1;

/// Hash of exactly the bytes extracted by a position-scoped mapping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionLock {
    /// Source path with its position suffix, e.g. `src/util.go:L5-L20`.
    pub from: String,
    /// Destination path, with a position suffix when one was given.
    pub to: String,
    /// `sha256:<hex>` of the extracted bytes.
    pub source_hash: String,
}

/// Outcome of a sync for one vendor+ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: VendorName,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    pub updated: DateTime<Utc>,
    /// Destination path → `sha256:<hex>` of the file as written.
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<PositionLock>,
}

impl LockEntry {
    /// Same revision and same recorded content; ignores `updated`.
    pub fn same_content(&self, other: &LockEntry) -> bool {
        self.commit_hash == other.commit_hash
            && self.file_hashes == other.file_hashes
            && self.positions == other.positions
            && self.license == other.license
    }
}

/// Root of `vendor.lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub schema_version: u32,
    #[serde(default)]
    pub vendors: Vec<LockEntry>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            schema_version: LOCK_SCHEMA_VERSION,
            vendors: Vec::new(),
        }
    }
}

impl Lockfile {
    pub fn find(&self, name: &str, git_ref: &str) -> Option<&LockEntry> {
        self.vendors
            .iter()
            .find(|e| e.name.0 == name && e.git_ref == git_ref)
    }

    /// Pinned revision for a vendor+ref, if locked.
    pub fn pinned(&self, name: &str, git_ref: &str) -> Option<&str> {
        self.find(name, git_ref).map(|e| e.commit_hash.as_str())
    }

    /// Insert or replace the entry keyed by (name, ref).
    ///
    /// When the replacement records the same content, the previous
    /// `updated` timestamp is kept so repeated syncs serialize identically.
    pub fn upsert(&mut self, mut entry: LockEntry) {
        match self
            .vendors
            .iter_mut()
            .find(|e| e.name == entry.name && e.git_ref == entry.git_ref)
        {
            Some(existing) => {
                if existing.same_content(&entry) {
                    entry.updated = existing.updated;
                }
                *existing = entry;
            }
            None => self.vendors.push(entry),
        }
    }

    /// Drop entries for vendors that are no longer configured.
    pub fn retain_configured(&mut self, config: &VendorConfig) {
        self.vendors.retain(|e| {
            config
                .find(&e.name.0)
                .is_some_and(|v| v.specs.iter().any(|s| s.git_ref == e.git_ref))
        });
    }

    /// Deterministic order: vendor name, then ref; positions sorted within.
    pub fn sort(&mut self) {
        for entry in &mut self.vendors {
            entry.positions.sort();
        }
        self.vendors
            .sort_by(|a, b| (&a.name, &a.git_ref).cmp(&(&b.name, &b.git_ref)));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, git_ref: &str, commit: &str) -> LockEntry {
        LockEntry {
            name: VendorName::from(name),
            git_ref: git_ref.to_string(),
            commit_hash: commit.to_string(),
            license: String::new(),
            updated: Utc::now(),
            file_hashes: BTreeMap::new(),
            positions: vec![],
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(VendorName::from("libfoo").to_string(), "libfoo");
    }

    #[test]
    fn ref_field_serializes_as_ref() {
        let spec = RefSpec {
            git_ref: "main".to_string(),
            default_target: String::new(),
            mapping: vec![PathMapping::new("src/a.go", "vendor/a.go")],
        };
        let yaml = serde_yaml::to_string(&spec).expect("serialize");
        assert!(yaml.contains("ref: main"), "got: {yaml}");
        assert!(!yaml.contains("default_target"));
    }

    #[test]
    fn upsert_keeps_timestamp_when_content_unchanged() {
        let mut lock = Lockfile::default();
        let first = entry("libfoo", "main", "abc123");
        let stamp = first.updated;
        lock.upsert(first);

        let mut again = entry("libfoo", "main", "abc123");
        again.updated = stamp + chrono::Duration::hours(1);
        lock.upsert(again);

        assert_eq!(lock.vendors.len(), 1);
        assert_eq!(lock.vendors[0].updated, stamp);
    }

    #[test]
    fn upsert_replaces_timestamp_when_revision_changes() {
        let mut lock = Lockfile::default();
        let first = entry("libfoo", "main", "abc123");
        let stamp = first.updated;
        lock.upsert(first);

        let mut moved = entry("libfoo", "main", "def456");
        moved.updated = stamp + chrono::Duration::hours(1);
        lock.upsert(moved);

        assert_eq!(lock.vendors[0].commit_hash, "def456");
        assert!(lock.vendors[0].updated > stamp);
    }

    #[test]
    fn sort_orders_by_name_then_ref() {
        let mut lock = Lockfile::default();
        lock.upsert(entry("zeta", "main", "1"));
        lock.upsert(entry("alpha", "v2", "2"));
        lock.upsert(entry("alpha", "v1", "3"));
        lock.sort();

        let keys: Vec<_> = lock
            .vendors
            .iter()
            .map(|e| format!("{}@{}", e.name, e.git_ref))
            .collect();
        assert_eq!(keys, vec!["alpha@v1", "alpha@v2", "zeta@main"]);
    }

    #[test]
    fn pinned_returns_commit_for_locked_ref() {
        let mut lock = Lockfile::default();
        lock.upsert(entry("libfoo", "main", "abc123"));
        assert_eq!(lock.pinned("libfoo", "main"), Some("abc123"));
        assert_eq!(lock.pinned("libfoo", "dev"), None);
    }
}
