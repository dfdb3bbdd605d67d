//! `gvendor validate`: static checks on `vendor.yml`, no network.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gvendor_core::config;
use gvendor_sync::detect_conflicts;
use gvendor_sync::paths::invalid_mappings;

use crate::GlobalArgs;

/// Arguments for `gvendor validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "destination")]
    path: String,
    #[tabled(rename = "first")]
    first: String,
    #[tabled(rename = "second")]
    second: String,
}

impl ValidateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.project_root()?;
        let config = config::load_config_at(&root).context("failed to load vendor config")?;

        let invalid = invalid_mappings(&root, &config);
        for (vendor, message) in &invalid {
            eprintln!("{} {}: {message}", "✗".red().bold(), vendor.bold());
        }

        let conflicts = detect_conflicts(&config.vendors);
        if !conflicts.is_empty() {
            let rows: Vec<ConflictRow> = conflicts
                .iter()
                .map(|c| ConflictRow {
                    path: c.path.clone(),
                    first: c.first.to_string(),
                    second: c.second.to_string(),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            eprintln!("{}", "destination conflicts:".red().bold());
            eprintln!("{table}");
        }

        let problems = invalid.len() + conflicts.len();
        if problems > 0 {
            bail!("{problems} problem(s) found in vendor config");
        }
        println!(
            "{} {} vendor(s), no conflicts",
            "✓".green(),
            config.vendors.len()
        );
        Ok(())
    }
}
