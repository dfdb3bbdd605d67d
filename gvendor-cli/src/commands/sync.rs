//! `gvendor sync`: fetch vendors and write their mapped files.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use gvendor_core::{settings, Settings};
use gvendor_sync::pipeline::{self, SyncOptions, SyncOutcome, SyncScope};
use gvendor_sync::reporter::SyncReporter;
use gvendor_sync::{
    ConflictRecord, Engine, ErrorKind, GitCli, HookRunner, JobMode, SyncError, SyncResult,
    WriteResult,
};

use crate::GlobalArgs;

/// Arguments for `gvendor sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Vendors to sync (default: every configured vendor).
    pub vendors: Vec<String>,

    /// Sync only vendors tagged with this group.
    #[arg(long, short = 'g', conflicts_with = "vendors")]
    pub group: Option<String>,

    /// Ignore the incremental cache and always fetch.
    #[arg(long)]
    pub force: bool,

    /// Neither read nor write the incremental cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Sync vendors concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for `--parallel` (default: available parallelism, max 8).
    #[arg(long, short = 'j', value_name = "N")]
    pub workers: Option<usize>,

    /// Show what would be written without fetching or writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore pinned revisions and re-resolve every ref.
    #[arg(long)]
    pub update: bool,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.project_root()?;
        let settings = settings::load().unwrap_or_else(|e| {
            tracing::warn!("ignoring user settings: {e}");
            Settings::default()
        });
        let verbose = global.verbose || settings.verbose;

        let engine = Engine::new(&root, Arc::new(GitCli::new().verbose(verbose)))
            .with_hooks(HookRunner::new(settings.hook_timeout()).verbose(verbose))
            .with_reporter(Arc::new(ConsoleReporter));
        let options = self.options(&settings);

        let outcome = match pipeline::sync_at(&root, Arc::new(engine), &options) {
            Ok(outcome) => outcome,
            Err(SyncError::Conflicts(records)) => {
                print_conflicts(&records);
                bail!("{} destination conflict(s); nothing was synced", records.len());
            }
            Err(e) => return Err(e).context("sync failed"),
        };

        print_summary(&outcome, self.dry_run);
        let failed = outcome.failures().count();
        if failed > 0 {
            bail!("{failed} vendor(s) failed to sync");
        }
        Ok(())
    }

    fn options(&self, settings: &Settings) -> SyncOptions {
        let scope = match (&self.group, self.vendors.is_empty()) {
            (Some(group), _) => SyncScope::Group(group.clone()),
            (None, false) => SyncScope::Vendors(self.vendors.clone()),
            (None, true) => SyncScope::All,
        };
        SyncOptions {
            scope,
            mode: JobMode {
                force: self.force,
                no_cache: self.no_cache,
                dry_run: self.dry_run,
                update: self.update,
            },
            parallel: self.parallel,
            workers: settings.worker_count(self.workers),
            handle_interrupt: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

/// Prints engine events as they happen; safe to call from worker threads.
struct ConsoleReporter;

impl SyncReporter for ConsoleReporter {
    fn progress(&self, vendor: &str, message: &str) {
        println!("{} {}: {message}", "·".bright_black(), vendor.bold());
    }

    fn success(&self, vendor: &str, message: &str) {
        println!("{} {}: {message}", "✓".green(), vendor.bold());
    }

    fn warning(&self, vendor: &str, message: &str) {
        eprintln!("{} {}: {message}", "!".yellow().bold(), vendor.bold());
    }
}

fn print_summary(outcome: &SyncOutcome, dry_run: bool) {
    let mut results: Vec<&SyncResult> = outcome.results.iter().collect();
    results.sort_by(|a, b| a.vendor.cmp(&b.vendor));

    for result in results.iter().filter(|r| !r.is_success()) {
        if let Some(err) = &result.error {
            eprintln!("{} {}: {err}", "✗".red().bold(), result.vendor.bold());
            if let Some(hint) = remedy(err.kind()) {
                eprintln!("  {}", hint.bright_black());
            }
        }
    }

    if dry_run {
        let planned = results
            .iter()
            .flat_map(|r| &r.writes)
            .filter(|w| matches!(w, WriteResult::WouldWrite { .. }))
            .count();
        println!("[dry-run] {planned} file(s) would be written; nothing fetched");
        return;
    }

    let hits: usize = results.iter().map(|r| r.cache_hits).sum();
    let dirs: usize = results.iter().map(|r| r.dirs_created).sum();
    println!(
        "{} vendor(s): {} file(s) copied, {dirs} dir(s) created, {hits} up to date",
        results.len(),
        outcome.files_copied(),
    );
}

fn print_conflicts(records: &[ConflictRecord]) {
    eprintln!("{}", "destination conflicts:".red().bold());
    for record in records {
        eprintln!("  {}", record.path.bold());
        eprintln!("    {}", record.first);
        eprintln!("    {}", record.second);
    }
}

fn remedy(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Input => Some("fix the mapping in .gvendor/vendor.yml and re-run"),
        ErrorKind::Transient => Some("check network access and credentials, then retry"),
        ErrorKind::Hook => Some("run the hook command by hand to see its full output"),
        ErrorKind::Integrity | ErrorKind::Cancelled | ErrorKind::Io | ErrorKind::Internal => None,
    }
}
