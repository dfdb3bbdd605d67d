//! Destination conflict detection.
//!
//! Two vendors writing the same destination file have no ordering guarantee
//! under parallel sync, so every such pair is reported before any job runs.
//! Multiple mappings of one vendor into the same file are sequential
//! placements and are not conflicts.

use std::collections::BTreeMap;
use std::fmt;

use gvendor_core::VendorSpec;

use crate::paths::resolve_mapping;

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MappingRef {
    pub vendor: String,
    pub git_ref: String,
    pub from: String,
    pub to: String,
}

impl fmt::Display for MappingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({} → {})", self.vendor, self.git_ref, self.from, self.to)
    }
}

/// Two mappings that resolve to the same normalised destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub path: String,
    /// Always ordered so `first <= second`.
    pub first: MappingRef,
    pub second: MappingRef,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} vs {}", self.path, self.first, self.second)
    }
}

/// Every cross-vendor pair of mappings with an identical destination path.
///
/// Pure function. Mappings whose syntax does not parse are skipped here;
/// sync reports them as input errors.
pub fn detect_conflicts(vendors: &[VendorSpec]) -> Vec<ConflictRecord> {
    let mut by_path: BTreeMap<String, Vec<MappingRef>> = BTreeMap::new();
    for vendor in vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                let Ok(resolved) = resolve_mapping(spec, mapping) else {
                    continue;
                };
                by_path
                    .entry(resolved.dest.path.clone())
                    .or_default()
                    .push(MappingRef {
                        vendor: vendor.name.0.clone(),
                        git_ref: spec.git_ref.clone(),
                        from: resolved.source.to_string(),
                        to: resolved.dest.to_string(),
                    });
            }
        }
    }

    let mut conflicts = Vec::new();
    for (path, mut refs) in by_path {
        if refs.len() < 2 {
            continue;
        }
        refs.sort();
        for i in 0..refs.len() {
            for j in (i + 1)..refs.len() {
                if refs[i].vendor == refs[j].vendor {
                    continue;
                }
                conflicts.push(ConflictRecord {
                    path: path.clone(),
                    first: refs[i].clone(),
                    second: refs[j].clone(),
                });
            }
        }
    }
    conflicts
}
