//! Error types for gvendor-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use gvendor_core::ConfigError;

use crate::conflict::ConflictRecord;
use crate::position::PositionError;

/// Broad classification used by callers to pick remediation advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or position syntax; nothing was written.
    Input,
    /// Network or VCS failure that survived the shallow→full retry.
    Transient,
    /// Content or revision does not match what was expected.
    Integrity,
    /// A pre/post-sync hook timed out or exited non-zero.
    Hook,
    /// The run was interrupted.
    Cancelled,
    /// Local filesystem failure.
    Io,
    /// A worker thread panicked or the runtime could not start.
    Internal,
}

/// Where in a vendor sync an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Mapping syntax and path checks, before anything runs.
    Planning,
    PreSync,
    CacheCheck,
    Fetching,
    Extracting,
    PostSync,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Planning => write!(f, "mapping check"),
            SyncPhase::PreSync => write!(f, "pre-sync hook"),
            SyncPhase::CacheCheck => write!(f, "cache check"),
            SyncPhase::Fetching => write!(f, "fetch"),
            SyncPhase::Extracting => write!(f, "extract"),
            SyncPhase::PostSync => write!(f, "post-sync hook"),
        }
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Config or lockfile persistence failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed position syntax, out-of-range lines, binary content.
    #[error("{spec}: {source}")]
    Position {
        spec: String,
        #[source]
        source: PositionError,
    },

    /// Two vendors write the same destination path.
    #[error("{} destination conflict(s): {}", .0.len(), summarize_conflicts(.0))]
    Conflicts(Vec<ConflictRecord>),

    #[error("unknown vendor '{name}'")]
    UnknownVendor { name: String },

    /// A mapping path that is absolute or climbs out of its root.
    #[error("unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },

    /// Mapping source is missing from the fetched tree.
    #[error("source path '{path}' not found at revision {revision}")]
    SourceNotFound { path: String, revision: String },

    /// Fetch failed after the shallow→full fallback.
    #[error("fetch of {url} at '{git_ref}' failed: {message}")]
    Fetch {
        url: String,
        git_ref: String,
        message: String,
    },

    /// The lockfile pins a revision that the remote no longer has.
    #[error("pinned revision {revision} is unreachable in {url} even after a full fetch; re-resolve the ref with `gvendor sync --update`")]
    StaleRevision { url: String, revision: String },

    #[error("{phase} `{command}` {failure}")]
    Hook {
        phase: SyncPhase,
        command: String,
        failure: HookFailure,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for '{vendor}' failed: {message}")]
    Worker { vendor: String, message: String },

    /// Context wrapper naming the vendor, ref, and phase of a failure.
    #[error("{vendor}@{git_ref} ({phase}): {source}")]
    Job {
        vendor: String,
        git_ref: String,
        phase: SyncPhase,
        #[source]
        source: Box<SyncError>,
    },
}

/// Why a hook counts as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFailure {
    TimedOut { secs: u64 },
    Exit { code: Option<i32>, stderr: String },
    Spawn { message: String },
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookFailure::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            HookFailure::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "exited with status {code}")?,
                    None => write!(f, "was terminated by a signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            HookFailure::Spawn { message } => write!(f, "could not start: {message}"),
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(ConfigError::Io { .. }) => ErrorKind::Io,
            SyncError::Config(_) => ErrorKind::Input,
            SyncError::Position { source, .. } if source.is_integrity() => ErrorKind::Integrity,
            SyncError::Position { .. }
            | SyncError::Conflicts(_)
            | SyncError::UnknownVendor { .. }
            | SyncError::UnsafePath { .. }
            | SyncError::SourceNotFound { .. } => ErrorKind::Input,
            SyncError::Fetch { .. } => ErrorKind::Transient,
            SyncError::StaleRevision { .. } => ErrorKind::Integrity,
            SyncError::Hook { .. } => ErrorKind::Hook,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Io { .. } => ErrorKind::Io,
            SyncError::Worker { .. } => ErrorKind::Internal,
            SyncError::Job { source, .. } => source.kind(),
        }
    }

    /// The innermost error, skipping [`SyncError::Job`] context wrappers.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Job { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_job(self, vendor: &str, git_ref: &str, phase: SyncPhase) -> SyncError {
        SyncError::Job {
            vendor: vendor.to_string(),
            git_ref: git_ref.to_string(),
            phase,
            source: Box::new(self),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Position`].
pub(crate) fn position_err(spec: impl Into<String>, source: PositionError) -> SyncError {
    SyncError::Position {
        spec: spec.into(),
        source,
    }
}

fn summarize_conflicts(conflicts: &[ConflictRecord]) -> String {
    let mut shown: Vec<String> = conflicts.iter().take(3).map(|c| c.to_string()).collect();
    if conflicts.len() > shown.len() {
        shown.push(format!("+{} more", conflicts.len() - shown.len()));
    }
    shown.join("; ")
}
