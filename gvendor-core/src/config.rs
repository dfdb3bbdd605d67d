//! Project-local YAML persistence for `vendor.yml` and `vendor.lock`.
//!
//! # Storage layout
//!
//! ```text
//! <root>/.gvendor/
//!   vendor.yml     (VendorSpec list: edited by humans)
//!   vendor.lock    (LockEntry list: written only by sync)
//!   cache/         (incremental cache, owned by gvendor-sync)
//! ```
//!
//! # API pattern
//!
//! Every function takes the project root explicitly (`fn_at(root, …)`);
//! tests always pass a `TempDir`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::{Lockfile, VendorConfig};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".gvendor";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.gvendor/`: pure, no I/O.
pub fn state_dir_at(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

/// `<root>/.gvendor/vendor.yml`: pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    state_dir_at(root).join("vendor.yml")
}

/// `<root>/.gvendor/vendor.lock`: pure, no I/O.
pub fn lock_path_at(root: &Path) -> PathBuf {
    state_dir_at(root).join("vendor.lock")
}

/// `<root>/.gvendor/cache/`: pure, no I/O.
pub fn cache_dir_at(root: &Path) -> PathBuf {
    state_dir_at(root).join("cache")
}

// ---------------------------------------------------------------------------
// 2. vendor.yml
// ---------------------------------------------------------------------------

/// Load and validate `vendor.yml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML, and
/// `ConfigError::Invalid` if the document breaks a structural rule.
pub fn load_config_at(root: &Path) -> Result<VendorConfig, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: VendorConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    validate(&config)?;
    Ok(config)
}

/// Atomically save `vendor.yml`.
pub fn save_config_at(root: &Path, config: &VendorConfig) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(&config_path_at(root), &yaml)
}

/// Structural checks that serde cannot express.
pub fn validate(config: &VendorConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for vendor in &config.vendors {
        if vendor.name.0.trim().is_empty() {
            return Err(invalid("vendor with empty name"));
        }
        if !seen.insert(vendor.name.0.as_str()) {
            return Err(invalid(format!("duplicate vendor name '{}'", vendor.name)));
        }
        if vendor.url.trim().is_empty() {
            return Err(invalid(format!("vendor '{}' has no url", vendor.name)));
        }
        if vendor.specs.is_empty() {
            return Err(invalid(format!("vendor '{}' has no refs", vendor.name)));
        }
        for spec in &vendor.specs {
            if spec.git_ref.trim().is_empty() {
                return Err(invalid(format!("vendor '{}' has an empty ref", vendor.name)));
            }
            if spec.mapping.iter().any(|m| m.from.trim().is_empty()) {
                return Err(invalid(format!(
                    "vendor '{}' ref '{}' has a mapping without a source path",
                    vendor.name, spec.git_ref
                )));
            }
        }
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// 3. vendor.lock
// ---------------------------------------------------------------------------

/// Load `vendor.lock`.
///
/// A missing lockfile is a valid empty state, never an error.
pub fn load_lock_at(root: &Path) -> Result<Lockfile, ConfigError> {
    let path = lock_path_at(root);
    if !path.exists() {
        return Ok(Lockfile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Lockfile::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Sort and atomically save `vendor.lock`.
///
/// Output is byte-stable for identical content regardless of the order in
/// which entries were produced.
pub fn save_lock_at(root: &Path, lock: &Lockfile) -> Result<(), ConfigError> {
    let mut sorted = lock.clone();
    sorted.sort();
    let yaml = serde_yaml::to_string(&sorted)?;
    write_atomic(&lock_path_at(root), &yaml)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Write flow: serialize → `.tmp` sibling → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PathMapping, RefSpec, VendorName, VendorSpec};
    use tempfile::TempDir;

    fn vendor(name: &str) -> VendorSpec {
        VendorSpec {
            name: VendorName::from(name),
            url: format!("https://example.com/{name}.git"),
            license: "MIT".to_string(),
            groups: vec![],
            hooks: None,
            specs: vec![RefSpec {
                git_ref: "main".to_string(),
                default_target: String::new(),
                mapping: vec![PathMapping::new("src/util.go", "vendor/util.go")],
            }],
        }
    }

    #[test]
    fn config_roundtrip() {
        let root = TempDir::new().unwrap();
        let config = VendorConfig {
            vendors: vec![vendor("libfoo"), vendor("libbar")],
        };
        save_config_at(root.path(), &config).unwrap();
        let loaded = load_config_at(root.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn duplicate_vendor_names_are_rejected() {
        let config = VendorConfig {
            vendors: vec![vendor("libfoo"), vendor("libfoo")],
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate vendor name 'libfoo'"));
    }

    #[test]
    fn vendor_without_refs_is_rejected() {
        let mut v = vendor("libfoo");
        v.specs.clear();
        let err = validate(&VendorConfig { vendors: vec![v] }).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_lock_is_empty() {
        let root = TempDir::new().unwrap();
        let lock = load_lock_at(root.path()).unwrap();
        assert!(lock.vendors.is_empty());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let root = TempDir::new().unwrap();
        save_lock_at(root.path(), &Lockfile::default()).unwrap();
        let tmp = state_dir_at(root.path()).join("vendor.lock.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after atomic rename");
        assert!(lock_path_at(root.path()).exists());
    }
}
