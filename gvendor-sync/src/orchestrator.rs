//! Per-vendor sync state machine.
//!
//! For every selected ref of a vendor:
//!
//! ```text
//! PreSync ─▶ CacheCheck ─┬─ hit ───────────────────────────▶ PostSync
//!                        └─ miss ─▶ Fetching ─▶ Extracting ─▶ PostSync
//! ```
//!
//! Before the first ref starts, every mapping of every selected ref is
//! resolved and checked, so malformed positions and unsafe paths fail the
//! vendor with no hook run and nothing fetched or written.
//!
//! Any failure stops the vendor and is wrapped with the vendor, ref and
//! phase it happened in. A job never touches the lockfile or cache on disk;
//! it returns what it would record and the pipeline applies it once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use gvendor_core::{LockEntry, Lockfile, RefSpec, VendorSpec};

use crate::cache::{CacheEntry, IncrementalCache};
use crate::error::{SyncError, SyncPhase};
use crate::fetch::fetch_revision;
use crate::hooks::{HookContext, HookRunner};
use crate::paths::{resolve_ref, PlannedMapping};
use crate::process::CancelFlag;
use crate::reporter::{SyncReporter, TracingReporter};
use crate::vcs::{VcsClient, VcsError};
use crate::writer::{plan_ref, MappingWriter, WriteResult};

/// Flags that shape a single vendor's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobMode {
    /// Skip the cache check and always fetch.
    pub force: bool,
    /// Neither read nor write cache entries.
    pub no_cache: bool,
    /// Report what would be written; no network, no writes, no hooks.
    pub dry_run: bool,
    /// Ignore lockfile pins and resolve each ref to its current tip.
    pub update: bool,
}

/// One unit of work: a vendor and the refs to sync, in declaration order.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub vendor: VendorSpec,
    pub mode: JobMode,
}

impl SyncJob {
    pub fn name(&self) -> &str {
        &self.vendor.name.0
    }
}

/// What one job produced. `error` set means the job failed; counts still
/// reflect files that reached disk before the failure.
#[derive(Debug)]
pub struct SyncResult {
    pub vendor: String,
    pub files_copied: usize,
    pub dirs_created: usize,
    /// Ref → revision synced (or reused from cache).
    pub revisions: BTreeMap<String, String>,
    pub writes: Vec<WriteResult>,
    pub lock_entries: Vec<LockEntry>,
    pub cache_updates: Vec<CacheEntry>,
    pub cache_hits: usize,
    pub error: Option<SyncError>,
}

impl SyncResult {
    pub fn new(vendor: &str) -> Self {
        Self {
            vendor: vendor.to_string(),
            files_copied: 0,
            dirs_created: 0,
            revisions: BTreeMap::new(),
            writes: Vec::new(),
            lock_entries: Vec::new(),
            cache_updates: Vec::new(),
            cache_hits: 0,
            error: None,
        }
    }

    pub fn failed(vendor: &str, error: SyncError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(vendor)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a job needs besides the job itself. Shared read-only across
/// workers.
pub struct Engine {
    root: PathBuf,
    vcs: Arc<dyn VcsClient>,
    hooks: HookRunner,
    reporter: Arc<dyn SyncReporter>,
    cancel: CancelFlag,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn VcsClient>) -> Self {
        Self {
            root: root.into(),
            vcs,
            hooks: HookRunner::default(),
            reporter: Arc::new(TracingReporter),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRunner) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SyncReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run one vendor to completion or first failure.
    pub fn run_job(&self, job: &SyncJob, lock: &Lockfile) -> SyncResult {
        let mut result = SyncResult::new(job.name());
        let plans = match self.resolve_all(job) {
            Ok(plans) => plans,
            Err(err) => {
                self.reporter.warning(job.name(), &err.to_string());
                result.error = Some(err);
                return result;
            }
        };
        for (spec, mappings) in job.vendor.specs.iter().zip(&plans) {
            if self.cancel.is_cancelled() {
                result.error = Some(SyncError::Cancelled.in_job(job.name(), &spec.git_ref, SyncPhase::PreSync));
                break;
            }
            let outcome = if job.mode.dry_run {
                self.plan(job, mappings, &mut result);
                Ok(())
            } else {
                self.sync_ref(job, spec, mappings, lock, &mut result)
            };
            if let Err(err) = outcome {
                self.reporter.warning(job.name(), &err.to_string());
                result.error = Some(err);
                break;
            }
        }
        result
    }

    /// Resolve every ref's mappings up front, in declaration order.
    fn resolve_all(&self, job: &SyncJob) -> Result<Vec<Vec<PlannedMapping>>, SyncError> {
        job.vendor
            .specs
            .iter()
            .map(|spec| {
                resolve_ref(&self.root, spec)
                    .map_err(|e| e.in_job(job.name(), &spec.git_ref, SyncPhase::Planning))
            })
            .collect()
    }

    fn plan(&self, job: &SyncJob, mappings: &[PlannedMapping], result: &mut SyncResult) {
        let planned = plan_ref(mappings);
        for write in &planned {
            self.reporter.progress(
                job.name(),
                &format!("[dry-run] would write {}", write.path().display()),
            );
        }
        result.writes.extend(planned);
    }

    fn sync_ref(
        &self,
        job: &SyncJob,
        spec: &RefSpec,
        mappings: &[PlannedMapping],
        lock: &Lockfile,
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        let vendor = &job.vendor;
        let name = job.name();
        let git_ref = spec.git_ref.as_str();
        let wrap = move |phase: SyncPhase| move |e: SyncError| e.in_job(name, git_ref, phase);

        let previous = lock.find(name, git_ref);
        let pinned = if job.mode.update {
            None
        } else {
            lock.pinned(name, git_ref)
        };

        let mut ctx = HookContext {
            vendor: name.to_string(),
            url: vendor.url.clone(),
            git_ref: git_ref.to_string(),
            commit: pinned.unwrap_or_default().to_string(),
            root: self.root.clone(),
            files_copied: 0,
        };

        if let Some(cmd) = vendor.pre_sync_hook() {
            self.hooks
                .run(SyncPhase::PreSync, cmd, &ctx, &self.cancel)
                .map_err(wrap(SyncPhase::PreSync))?;
        }

        let cache = IncrementalCache::new(&self.root);
        let hit = self
            .cache_hit(job, spec, pinned, previous, &cache)
            .map_err(wrap(SyncPhase::CacheCheck))?;
        if let Some(hit) = hit {
            self.reporter
                .success(name, &format!("{git_ref} up to date at {}", short(&hit.commit_hash)));
            result.cache_hits += 1;
            result.revisions.insert(git_ref.to_string(), hit.commit_hash.clone());
            ctx.commit = hit.commit_hash.clone();
            self.post_sync(vendor, &ctx).map_err(wrap(SyncPhase::PostSync))?;
            result
                .cache_updates
                .push(CacheEntry::new(name, git_ref, &hit.commit_hash, &hit.file_hashes));
            result.lock_entries.push(hit);
            return Ok(());
        }

        self.reporter.progress(name, &format!("fetching {git_ref}"));
        let checkout = fetch_revision(self.vcs.as_ref(), &vendor.url, git_ref, pinned, &self.cancel)
            .map_err(wrap(SyncPhase::Fetching))?;
        let revision = checkout.revision.clone();

        let copied = MappingWriter::new(
            &self.root,
            checkout.path(),
            &revision,
            name,
            self.reporter.as_ref(),
            &self.cancel,
        )
        .with_previous(previous)
        .apply_all(mappings)
        .map_err(wrap(SyncPhase::Extracting))?;
        drop(checkout);

        result.files_copied += copied.files_copied;
        result.dirs_created += copied.dirs_created;
        result.writes.extend(copied.writes);
        result.revisions.insert(git_ref.to_string(), revision.clone());

        ctx.commit = revision.clone();
        ctx.files_copied = copied.files_copied;
        self.post_sync(vendor, &ctx).map_err(wrap(SyncPhase::PostSync))?;

        if !job.mode.no_cache {
            result
                .cache_updates
                .push(CacheEntry::new(name, git_ref, &revision, &copied.file_hashes));
        }
        result.lock_entries.push(LockEntry {
            name: vendor.name.clone(),
            git_ref: git_ref.to_string(),
            commit_hash: revision.clone(),
            license: vendor.license.clone(),
            updated: Utc::now(),
            file_hashes: copied.file_hashes,
            positions: copied.positions,
        });
        self.reporter.success(
            name,
            &format!("{git_ref} synced at {} ({} file(s))", short(&revision), copied.files_copied),
        );
        Ok(())
    }

    /// Lock entry to carry forward when the cache proves nothing changed.
    ///
    /// The revision to compare against is the pin, or the remote tip when
    /// unpinned. A hit also needs a lock entry at that revision, since the
    /// cache alone does not record positions. A failed remote lookup is a
    /// miss; only cancellation is an error.
    fn cache_hit(
        &self,
        job: &SyncJob,
        spec: &RefSpec,
        pinned: Option<&str>,
        previous: Option<&LockEntry>,
        cache: &IncrementalCache,
    ) -> Result<Option<LockEntry>, SyncError> {
        if job.mode.force || job.mode.no_cache {
            return Ok(None);
        }
        let name = job.name();
        let current = match pinned {
            Some(rev) => rev.to_string(),
            None => match self.vcs.ls_remote(&job.vendor.url, &spec.git_ref, &self.cancel) {
                Ok(Some(rev)) => rev,
                Ok(None) => return Ok(None),
                Err(VcsError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::debug!("{name}: could not resolve {} remotely: {e}", spec.git_ref);
                    return Ok(None);
                }
            },
        };
        let Some(previous) = previous.filter(|e| e.commit_hash == current) else {
            return Ok(None);
        };
        if !cache.can_skip(name, &spec.git_ref, &current) {
            return Ok(None);
        }
        let mut entry = previous.clone();
        entry.license = job.vendor.license.clone();
        Ok(Some(entry))
    }

    fn post_sync(&self, vendor: &VendorSpec, ctx: &HookContext) -> Result<(), SyncError> {
        match vendor.post_sync_hook() {
            Some(cmd) => self.hooks.run(SyncPhase::PostSync, cmd, ctx, &self.cancel),
            None => Ok(()),
        }
    }
}

fn short(revision: &str) -> &str {
    revision.get(..12).unwrap_or(revision)
}
