//! # gvendor-sync
//!
//! Position-precise vendoring engine.
//!
//! - [`position`] / [`extract`]: the `path:L<n>C<n>-L<n>C<n>` syntax and the
//!   byte arithmetic behind extraction and placement
//! - [`conflict`]: cross-vendor destination clashes
//! - [`vcs`] / [`fetch`]: git plumbing and the shallow-first fetch strategy
//! - [`orchestrator`]: the per-vendor state machine
//! - [`parallel`] / [`pipeline`]: running many vendors and folding their
//!   results into one lockfile write
//! - [`verify`]: drift between the lockfile and the tree
//!
//! Call [`pipeline::sync_at`] to run a full sync from a project root.

pub mod cache;
pub mod conflict;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod hooks;
pub mod orchestrator;
pub mod parallel;
pub mod paths;
pub mod pipeline;
pub mod position;
pub mod process;
pub mod reporter;
pub mod vcs;
pub mod verify;
pub mod writer;

pub use conflict::{detect_conflicts, ConflictRecord};
pub use error::{ErrorKind, HookFailure, SyncError, SyncPhase};
pub use hooks::HookRunner;
pub use orchestrator::{Engine, JobMode, SyncJob, SyncResult};
pub use parallel::ParallelExecutor;
pub use pipeline::{SyncOptions, SyncOutcome, SyncScope};
pub use position::{PathSpec, PositionError, PositionSpec};
pub use process::CancelFlag;
pub use reporter::{SyncReporter, TracingReporter};
pub use vcs::{GitCli, VcsClient, VcsError};
pub use writer::WriteResult;
