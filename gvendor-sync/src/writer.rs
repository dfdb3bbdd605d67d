//! Applying mappings from a fetched tree onto the project.
//!
//! ## Write protocol
//!
//! 1. Compute the new destination bytes (copy or placement).
//! 2. Compare with what is on disk; identical bytes are left untouched so
//!    mtimes stay stable across no-op syncs.
//! 3. Write to `<path>.gvendor.tmp`.
//! 4. Rename over the final path (atomic on POSIX).
//!
//! Mappings are applied in declaration order and each placement reads the
//! destination as it is at that moment, so a later position addresses the
//! file after earlier mappings of the same run have changed it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use gvendor_core::{LockEntry, PositionLock};

use crate::error::{io_err, position_err, SyncError};
use crate::extract::{content_hash, extract, place};
use crate::paths::{safe_join, PlannedMapping, ResolvedMapping};
use crate::position::PositionSpec;
use crate::process::CancelFlag;
use crate::reporter::SyncReporter;

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File already held exactly these bytes.
    Unchanged { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// atomic_write
// ---------------------------------------------------------------------------

/// Write `content` to `path` via a sibling temp file, creating parent
/// directories. Returns how many directories had to be created.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<(WriteResult, usize), SyncError> {
    let tmp = PathBuf::from(format!("{}.gvendor.tmp", path.display()));
    atomic_write_with_tmp(path, content, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &[u8],
    tmp: &Path,
) -> Result<(WriteResult, usize), SyncError> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == content {
            tracing::debug!("unchanged: {}", path.display());
            return Ok((
                WriteResult::Unchanged {
                    path: path.to_path_buf(),
                },
                0,
            ));
        }
    }

    let created = match path.parent() {
        Some(parent) => ensure_dir(parent)?,
        None => 0,
    };
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!("wrote: {}", path.display());
    Ok((
        WriteResult::Written {
            path: path.to_path_buf(),
        },
        created,
    ))
}

/// `create_dir_all`, counting the directories that did not exist before.
fn ensure_dir(dir: &Path) -> Result<usize, SyncError> {
    let missing = dir.ancestors().take_while(|d| !d.as_os_str().is_empty() && !d.exists()).count();
    if missing > 0 {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    Ok(missing)
}

// ---------------------------------------------------------------------------
// Mapping application
// ---------------------------------------------------------------------------

/// What applying one ref's mappings produced.
#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub writes: Vec<WriteResult>,
    pub files_copied: usize,
    pub dirs_created: usize,
    /// Destination path → content hash after every mapping ran.
    pub file_hashes: BTreeMap<String, String>,
    pub positions: Vec<PositionLock>,
}

/// Applies the mappings of one vendor+ref from a checked-out tree.
pub struct MappingWriter<'a> {
    root: &'a Path,
    source_root: &'a Path,
    revision: &'a str,
    vendor: &'a str,
    previous: Option<&'a LockEntry>,
    reporter: &'a dyn SyncReporter,
    cancel: &'a CancelFlag,
    touched: BTreeSet<String>,
    outcome: CopyOutcome,
}

impl<'a> MappingWriter<'a> {
    pub fn new(
        root: &'a Path,
        source_root: &'a Path,
        revision: &'a str,
        vendor: &'a str,
        reporter: &'a dyn SyncReporter,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            root,
            source_root,
            revision,
            vendor,
            previous: None,
            reporter,
            cancel,
            touched: BTreeSet::new(),
            outcome: CopyOutcome::default(),
        }
    }

    /// Lock entry from the previous sync, used to spot local edits.
    pub fn with_previous(mut self, previous: Option<&'a LockEntry>) -> Self {
        self.previous = previous;
        self
    }

    /// Apply mappings in order. They come from
    /// [`resolve_ref`](crate::paths::resolve_ref), so only failures that
    /// depend on the fetched content remain possible here.
    pub fn apply_all(mut self, mappings: &[PlannedMapping]) -> Result<CopyOutcome, SyncError> {
        for mapping in mappings {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.apply(mapping)?;
        }
        self.finish()
    }

    fn apply(&mut self, planned: &PlannedMapping) -> Result<(), SyncError> {
        let m = &planned.resolved;
        let source = self.source_root.join(&planned.source_rel);
        let dest = &planned.dest;

        let meta = std::fs::metadata(&source).map_err(|_| SyncError::SourceNotFound {
            path: m.source.path.clone(),
            revision: self.revision.to_string(),
        })?;

        if meta.is_dir() {
            if m.source.position.is_some() || m.dest.position.is_some() {
                return Err(position_err(
                    m.label(),
                    crate::position::PositionError::Malformed {
                        reason: "positions cannot be applied to a directory".to_string(),
                    },
                ));
            }
            return self.copy_dir(&source, &m.dest.path);
        }

        self.note_touch(&m.dest.path, dest);
        let content = std::fs::read(&source).map_err(|e| io_err(&source, e))?;

        let bytes = if m.source.position.is_none() && m.dest.position.is_none() {
            content
        } else {
            self.placed(m, &content, dest)?.into_bytes()
        };
        self.write(dest, &bytes)
    }

    /// Text to write for a mapping that uses a position on either side.
    fn placed(&mut self, m: &ResolvedMapping, content: &[u8], dest: &Path) -> Result<String, SyncError> {
        let source_pos = m.source.position.unwrap_or(PositionSpec::to_eof(1));
        let extracted = extract(content, &source_pos).map_err(|e| position_err(m.source.to_string(), e))?;
        self.outcome.positions.push(PositionLock {
            from: m.source.to_string(),
            to: m.dest.to_string(),
            source_hash: extracted.hash,
        });

        match &m.dest.position {
            None => Ok(extracted.text),
            Some(dest_pos) => {
                let existing = match std::fs::read(dest) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(io_err(dest, e)),
                };
                place(&existing, &extracted.text, dest_pos)
                    .map_err(|e| position_err(m.dest.to_string(), e))
            }
        }
    }

    fn copy_dir(&mut self, source: &Path, dest_rel: &str) -> Result<(), SyncError> {
        let mut entries: Vec<_> = std::fs::read_dir(source)
            .map_err(|e| io_err(source, e))?
            .collect::<Result<_, _>>()
            .map_err(|e| io_err(source, e))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let name = entry.file_name();
            if name == ".git" {
                continue;
            }
            let rel = format!("{dest_rel}/{}", name.to_string_lossy());
            let file_type = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if file_type.is_dir() {
                self.copy_dir(&entry.path(), &rel)?;
            } else if file_type.is_file() {
                let dest = safe_join(self.root, &rel)?;
                self.note_touch(&rel, &dest);
                let bytes = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
                self.write(&dest, &bytes)?;
            } else {
                tracing::debug!("skipping non-regular file {}", entry.path().display());
            }
        }
        Ok(())
    }

    /// Warn once per destination when it no longer matches the last sync.
    fn note_touch(&mut self, rel: &str, dest: &Path) {
        if !self.touched.insert(rel.to_string()) {
            return;
        }
        let Some(expected) = self.previous.and_then(|p| p.file_hashes.get(rel)) else {
            return;
        };
        if let Ok(bytes) = std::fs::read(dest) {
            if &content_hash(&bytes) != expected {
                self.reporter.warning(
                    self.vendor,
                    &format!("{rel} was modified locally; overwriting"),
                );
            }
        }
    }

    fn write(&mut self, dest: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        let (result, created) = atomic_write(dest, bytes)?;
        self.outcome.files_copied += 1;
        self.outcome.dirs_created += created;
        self.outcome.writes.push(result);
        Ok(())
    }

    fn finish(mut self) -> Result<CopyOutcome, SyncError> {
        for rel in &self.touched {
            let path = self.root.join(rel);
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            self.outcome.file_hashes.insert(rel.clone(), content_hash(&bytes));
        }
        Ok(self.outcome)
    }
}

/// Destinations a ref would write, without touching the network or disk.
pub fn plan_ref(mappings: &[PlannedMapping]) -> Vec<WriteResult> {
    let mut planned = Vec::new();
    let mut seen = BTreeSet::new();
    for mapping in mappings {
        if seen.insert(mapping.dest.clone()) {
            planned.push(WriteResult::WouldWrite {
                path: mapping.dest.clone(),
            });
        }
    }
    planned
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
