//! `gvendor status`: lockfile drift, without touching the network.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use gvendor_core::config;
use gvendor_sync::verify::{self, format_datetime_age, DriftSignal, VendorStatus};

use crate::GlobalArgs;

/// Arguments for `gvendor status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show these vendors.
    pub vendors: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.project_root()?;
        let config = config::load_config_at(&root).context("failed to load vendor config")?;
        let lock = config::load_lock_at(&root).context("failed to load lockfile")?;

        let mut statuses = verify::check(&root, &config, &lock).context("status check failed")?;
        if !self.vendors.is_empty() {
            statuses.retain(|s| self.vendors.contains(&s.vendor));
        }

        if self.json {
            return print_json(&statuses);
        }
        print_table(&statuses);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReportJson<'a> {
    summary: StatusSummaryJson,
    vendors: Vec<VendorStatusJson<'a>>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    refs: usize,
    current: usize,
    needs_sync: usize,
}

#[derive(Serialize)]
struct VendorStatusJson<'a> {
    vendor: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
    commit: Option<&'a str>,
    status: &'static str,
    detail: String,
    files: &'a [String],
    last_sync_at: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "vendor")]
    vendor: String,
    #[tabled(rename = "ref")]
    git_ref: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

fn print_json(statuses: &[VendorStatus]) -> Result<()> {
    let current = statuses.iter().filter(|s| s.signal.is_current()).count();
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            refs: statuses.len(),
            current,
            needs_sync: statuses.len() - current,
        },
        vendors: statuses
            .iter()
            .map(|s| VendorStatusJson {
                vendor: &s.vendor,
                git_ref: &s.git_ref,
                commit: s.commit.as_deref(),
                status: signal_key(&s.signal),
                detail: signal_detail(&s.signal),
                files: signal_files(&s.signal),
                last_sync_at: s.updated.map(|t| t.to_rfc3339()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(statuses: &[VendorStatus]) {
    let needs_sync = statuses.iter().filter(|s| !s.signal.is_current()).count();
    println!(
        "gvendor v{} | {} ref(s) | {} need sync",
        env!("CARGO_PKG_VERSION"),
        statuses.len(),
        needs_sync,
    );
    if statuses.is_empty() {
        println!("No vendors configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = statuses
        .iter()
        .map(|s| StatusTableRow {
            vendor: s.vendor.clone(),
            git_ref: s.git_ref.clone(),
            commit: s
                .commit
                .as_deref()
                .map(|c| c.get(..12).unwrap_or(c).to_string())
                .unwrap_or_else(|| "-".to_string()),
            status: signal_label(&s.signal),
            detail: signal_detail(&s.signal),
            last_sync: s
                .updated
                .map(format_datetime_age)
                .unwrap_or_else(|| "never".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_sync > 0 {
        println!("Run 'gvendor sync' to restore vendored files.");
    }
}

fn signal_key(signal: &DriftSignal) -> &'static str {
    match signal {
        DriftSignal::NeverSynced => "never_synced",
        DriftSignal::Current => "current",
        DriftSignal::Stale { .. } => "stale",
        DriftSignal::Missing { .. } => "missing",
        DriftSignal::Modified { .. } => "modified",
    }
}

fn signal_label(signal: &DriftSignal) -> String {
    let label = signal.label().to_uppercase();
    match signal {
        DriftSignal::NeverSynced => label.bright_black().bold().to_string(),
        DriftSignal::Current => label.green().bold().to_string(),
        DriftSignal::Stale { .. } => label.yellow().bold().to_string(),
        DriftSignal::Missing { .. } => label.magenta().bold().to_string(),
        DriftSignal::Modified { .. } => label.red().bold().to_string(),
    }
}

fn signal_detail(signal: &DriftSignal) -> String {
    match signal {
        DriftSignal::NeverSynced => "not in lockfile".to_string(),
        DriftSignal::Current => "up to date".to_string(),
        DriftSignal::Stale { reason } => reason.clone(),
        DriftSignal::Missing { files } => format!("{} missing", summarize_files(files)),
        DriftSignal::Modified { files } => format!("{} edited", summarize_files(files)),
    }
}

fn signal_files(signal: &DriftSignal) -> &[String] {
    match signal {
        DriftSignal::Missing { files } | DriftSignal::Modified { files } => files,
        _ => &[],
    }
}

fn summarize_files(files: &[String]) -> String {
    if files.is_empty() {
        return "unknown file".to_string();
    }
    let mut names: Vec<String> = files.iter().take(2).cloned().collect();
    if files.len() > names.len() {
        names.push(format!("+{} more", files.len() - names.len()));
    }
    names.join(", ")
}
