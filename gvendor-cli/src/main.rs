//! gvendor: vendor files and line ranges from git repositories.
//!
//! # Usage
//!
//! ```text
//! gvendor sync [VENDOR...] [--group G] [--force] [--no-cache] [--parallel]
//!              [--workers N] [--dry-run] [--update]
//! gvendor validate
//! gvendor status [--json]
//! ```
//!
//! Every command accepts `-C <DIR>` (project root, default: current
//! directory) and `-v/--verbose`.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use commands::{status::StatusArgs, sync::SyncArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gvendor",
    version,
    about = "Vendor files and line ranges from git repositories",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch configured vendors and write their mapped files.
    Sync(SyncArgs),

    /// Check vendor.yml for destination conflicts and malformed mappings.
    Validate(ValidateArgs),

    /// Compare the lockfile against files on disk.
    Status(StatusArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project root containing `.gvendor/vendor.yml`.
    #[arg(short = 'C', long = "root", value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Log every git and hook command.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    pub fn project_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("could not determine current directory"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Validate(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
