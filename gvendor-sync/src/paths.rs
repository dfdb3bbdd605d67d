//! Mapping path resolution and lexical normalisation.

use std::path::{Path, PathBuf};

use gvendor_core::{PathMapping, RefSpec, VendorConfig};

use crate::error::{position_err, SyncError};
use crate::position::PathSpec;

/// A mapping with both sides parsed and the destination resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub source: PathSpec,
    /// Destination with its path normalised relative to the project root.
    pub dest: PathSpec,
}

impl ResolvedMapping {
    /// `from → to` as written in the lockfile.
    pub fn label(&self) -> String {
        format!("{} → {}", self.source, self.dest)
    }
}

/// Parse both sides of `mapping` and fill in an empty destination.
///
/// An empty `to` becomes `<default_target>/<basename of from>`, or the
/// source path itself when the ref has no default target.
pub fn resolve_mapping(spec: &RefSpec, mapping: &PathMapping) -> Result<ResolvedMapping, SyncError> {
    let source = PathSpec::parse(&mapping.from).map_err(|e| position_err(&mapping.from, e))?;

    let mut dest = if mapping.to.trim().is_empty() {
        let path = if spec.default_target.is_empty() {
            source.path.clone()
        } else {
            let base = normalize(&source.path);
            let base = base.rsplit('/').next().unwrap_or(&base).to_string();
            format!("{}/{}", spec.default_target.trim_end_matches('/'), base)
        };
        PathSpec {
            path,
            position: None,
        }
    } else {
        PathSpec::parse(&mapping.to).map_err(|e| position_err(&mapping.to, e))?
    };

    dest.path = normalize(&dest.path);
    if dest.path.is_empty() {
        return Err(SyncError::UnsafePath {
            path: mapping.to.clone(),
            reason: "destination resolves to the project root".to_string(),
        });
    }
    Ok(ResolvedMapping { source, dest })
}

/// A mapping that passed every check that needs no fetched content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMapping {
    pub resolved: ResolvedMapping,
    /// Source path relative to the vendored repository root.
    pub source_rel: String,
    /// Absolute destination under the project root.
    pub dest: PathBuf,
}

/// Resolve every mapping of `spec` against `root`.
///
/// Runs before hooks, fetches and writes: a bad mapping anywhere in the
/// ref fails it with nothing touched.
pub fn resolve_ref(root: &Path, spec: &RefSpec) -> Result<Vec<PlannedMapping>, SyncError> {
    spec.mapping
        .iter()
        .map(|mapping| {
            let resolved = resolve_mapping(spec, mapping)?;
            let source_rel = safe_source(&resolved.source.path)?;
            let dest = safe_join(root, &resolved.dest.path)?;
            Ok(PlannedMapping {
                resolved,
                source_rel,
                dest,
            })
        })
        .collect()
}

/// Every mapping in `config` that [`resolve_ref`] would reject, labelled
/// `vendor@ref`.
pub fn invalid_mappings(root: &Path, config: &VendorConfig) -> Vec<(String, SyncError)> {
    let mut out = Vec::new();
    for vendor in &config.vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                let checked = resolve_mapping(spec, mapping).and_then(|resolved| {
                    safe_source(&resolved.source.path)?;
                    safe_join(root, &resolved.dest.path)
                });
                if let Err(e) = checked {
                    out.push((format!("{}@{}", vendor.name.0, spec.git_ref), e));
                }
            }
        }
    }
    out
}

/// Normalised source path, refusing anything outside the repository.
pub fn safe_source(path: &str) -> Result<String, SyncError> {
    let rel = normalize(path);
    if rel.is_empty() || rel.starts_with('/') || rel == ".." || rel.starts_with("../") || has_drive_prefix(&rel) {
        return Err(SyncError::UnsafePath {
            path: path.to_string(),
            reason: "source must be a path inside the vendored repository".to_string(),
        });
    }
    Ok(rel)
}

/// Lexically normalise a relative path: `\` → `/`, drop `.` and empty
/// segments, fold `..` where possible. Leading `..` segments are kept so
/// [`safe_join`] can reject them.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Join a normalised relative destination onto `root`, refusing absolute
/// paths and anything that climbs out of the root.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, SyncError> {
    let unsafe_path = |reason: &str| SyncError::UnsafePath {
        path: rel.to_string(),
        reason: reason.to_string(),
    };
    if rel.starts_with('/') || Path::new(rel).is_absolute() || has_drive_prefix(rel) {
        return Err(unsafe_path("destination must be relative to the project root"));
    }
    let normalized = normalize(rel);
    if normalized == ".." || normalized.starts_with("../") {
        return Err(unsafe_path("destination escapes the project root"));
    }
    Ok(root.join(normalized))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
