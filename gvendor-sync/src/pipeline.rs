//! Sync pipeline entrypoint used by the CLI.
//!
//! One run: conflict gate → job selection → sequential or parallel
//! execution → a single aggregation pass that folds every result into the
//! lockfile and cache. Jobs never persist anything themselves.

use std::path::Path;
use std::sync::Arc;

use gvendor_core::{config, Lockfile, VendorConfig};

use crate::cache::IncrementalCache;
use crate::conflict::detect_conflicts;
use crate::error::{io_err, SyncError};
use crate::orchestrator::{Engine, JobMode, SyncJob, SyncResult};
use crate::parallel::ParallelExecutor;
use crate::process::InterruptGuard;

/// Which vendors a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncScope {
    /// Every configured vendor, in declaration order.
    #[default]
    All,
    /// Only the named vendors, in declaration order.
    Vendors(Vec<String>),
    /// Vendors tagged with this group.
    Group(String),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub scope: SyncScope,
    pub mode: JobMode,
    pub parallel: bool,
    pub workers: usize,
    /// Cancel the run on ctrl-c, killing in-flight git and hook processes.
    pub handle_interrupt: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            scope: SyncScope::All,
            mode: JobMode::default(),
            parallel: false,
            workers: 1,
            handle_interrupt: false,
        }
    }
}

/// Aggregated result of a run.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The lockfile to persist: the previous one with every successful
    /// vendor+ref replaced.
    pub lock: Lockfile,
    /// One result per job, in completion order.
    pub results: Vec<SyncResult>,
}

impl SyncOutcome {
    pub fn first_error(&self) -> Option<&SyncError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.first_error().is_none()
    }

    pub fn files_copied(&self) -> usize {
        self.results.iter().map(|r| r.files_copied).sum()
    }
}

/// Fail with every cross-vendor destination clash in `config`.
pub fn check_conflicts(config: &VendorConfig) -> Result<(), SyncError> {
    let conflicts = detect_conflicts(&config.vendors);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Conflicts(conflicts))
    }
}

/// Build jobs for the vendors `scope` selects, in declaration order.
pub fn select_jobs(
    config: &VendorConfig,
    scope: &SyncScope,
    mode: JobMode,
) -> Result<Vec<SyncJob>, SyncError> {
    let job = |vendor: &gvendor_core::VendorSpec| SyncJob {
        vendor: vendor.clone(),
        mode,
    };
    match scope {
        SyncScope::All => Ok(config.vendors.iter().map(job).collect()),
        SyncScope::Vendors(names) => {
            if let Some(missing) = names.iter().find(|n| config.find(n).is_none()) {
                return Err(SyncError::UnknownVendor {
                    name: missing.clone(),
                });
            }
            Ok(config
                .vendors
                .iter()
                .filter(|v| names.iter().any(|n| *n == v.name.0))
                .map(job)
                .collect())
        }
        SyncScope::Group(group) => Ok(config
            .vendors
            .iter()
            .filter(|v| v.in_group(group))
            .map(job)
            .collect()),
    }
}

/// Run a sync over `config` against the current `lock`.
///
/// Conflict validation runs before every sync, parallel or not. Individual
/// job failures do not abort the run; they are reported in the outcome.
pub fn run(
    engine: Arc<Engine>,
    config: &VendorConfig,
    lock: &Lockfile,
    options: &SyncOptions,
) -> Result<SyncOutcome, SyncError> {
    check_conflicts(config)?;
    let jobs = select_jobs(config, &options.scope, options.mode)?;
    if jobs.is_empty() {
        tracing::info!("no vendors selected");
    }

    // Children run in their own process groups, so a terminal ctrl-c only
    // reaches them through the cancel flag.
    let _interrupt = if options.handle_interrupt {
        let guard = InterruptGuard::install(engine.cancel_flag())
            .map_err(|e| io_err("ctrl-c handler", e))?;
        Some(guard)
    } else {
        None
    };

    let results = if options.parallel && !options.mode.dry_run && jobs.len() > 1 {
        let executor = ParallelExecutor::new(options.workers);
        tracing::debug!("syncing {} vendor(s) on {} worker(s)", jobs.len(), executor.workers());
        let cancel = engine.cancel_flag().clone();
        let shared_lock = Arc::new(lock.clone());
        let worker_engine = Arc::clone(&engine);
        executor.execute(jobs, &cancel, move |job| worker_engine.run_job(&job, &shared_lock))?
    } else {
        jobs.iter().map(|job| engine.run_job(job, lock)).collect()
    };

    Ok(aggregate(engine.root(), config, lock, results, options.mode))
}

/// Fold results into a new lockfile and persist cache updates.
fn aggregate(
    root: &Path,
    config: &VendorConfig,
    lock: &Lockfile,
    results: Vec<SyncResult>,
    mode: JobMode,
) -> SyncOutcome {
    let mut next = lock.clone();
    if mode.dry_run {
        return SyncOutcome {
            lock: next,
            results,
        };
    }

    let cache = IncrementalCache::new(root);
    for result in &results {
        for entry in &result.lock_entries {
            next.upsert(entry.clone());
        }
        if mode.no_cache {
            continue;
        }
        for entry in &result.cache_updates {
            if let Err(e) = cache.save(entry) {
                tracing::warn!("could not update cache for {}@{}: {e}", entry.vendor, entry.git_ref);
            }
        }
    }
    next.retain_configured(config);
    next.sort();
    SyncOutcome {
        lock: next,
        results,
    }
}

/// Load `vendor.yml` and `vendor.lock` under `root`, run, and write the
/// lockfile back once (skipped for dry runs).
pub fn sync_at(root: &Path, engine: Arc<Engine>, options: &SyncOptions) -> Result<SyncOutcome, SyncError> {
    let config = config::load_config_at(root)?;
    let lock = config::load_lock_at(root)?;
    let outcome = run(engine, &config, &lock, options)?;
    if !options.mode.dry_run && outcome.lock != lock {
        config::save_lock_at(root, &outcome.lock)?;
    }
    Ok(outcome)
}
