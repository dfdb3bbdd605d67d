//! Version-control plumbing behind a trait so sync logic can be driven by
//! a fake in tests.
//!
//! [`GitCli`] shells out to the `git` binary. Credentials prompts are
//! disabled; a remote that needs interactive auth fails instead of hanging.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::process::{self, CancelFlag, ProcessError};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },

    #[error("cancelled")]
    Cancelled,
}

/// The five operations sync needs from a VCS.
///
/// `dir` is always an exclusive scratch directory owned by the caller.
pub trait VcsClient: Send + Sync {
    /// Create an empty repository in `dir`.
    fn init(&self, dir: &Path, cancel: &CancelFlag) -> Result<(), VcsError>;

    /// Fetch `git_ref` from `url` into the repository at `dir`. A shallow
    /// fetch retrieves only the tip; a full fetch retrieves history and tags.
    fn fetch(
        &self,
        dir: &Path,
        url: &str,
        git_ref: &str,
        shallow: bool,
        cancel: &CancelFlag,
    ) -> Result<(), VcsError>;

    /// Materialise `revision` (or `FETCH_HEAD`) as the working tree.
    fn checkout(&self, dir: &Path, revision: &str, cancel: &CancelFlag) -> Result<(), VcsError>;

    /// Full revision id `git_ref` points at inside `dir`.
    fn resolve(&self, dir: &Path, git_ref: &str, cancel: &CancelFlag) -> Result<String, VcsError>;

    /// Revision `git_ref` currently points at on the remote, without
    /// fetching. `None` when the remote does not advertise it.
    fn ls_remote(
        &self,
        url: &str,
        git_ref: &str,
        cancel: &CancelFlag,
    ) -> Result<Option<String>, VcsError>;
}

// ---------------------------------------------------------------------------
// git CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    verbose: bool,
    timeout: Option<Duration>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            verbose: false,
            timeout: None,
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every git command line at info instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Upper bound on any single git invocation.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when a `git` binary can be executed.
    pub fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    fn git(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        cancel: &CancelFlag,
    ) -> Result<String, VcsError> {
        let command = format!("git {}", args.join(" "));
        if self.verbose {
            tracing::info!("{command}");
        } else {
            tracing::debug!("{command}");
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let out = process::run(cmd, self.timeout, cancel).map_err(|e| match e {
            ProcessError::Spawn(source) | ProcessError::Wait(source) => VcsError::Spawn {
                program: self.program.display().to_string(),
                source,
            },
            ProcessError::TimedOut(after) => VcsError::TimedOut {
                command: command.clone(),
                after,
            },
            ProcessError::Cancelled => VcsError::Cancelled,
        })?;

        if out.status.success() {
            Ok(out.stdout)
        } else {
            Err(VcsError::Command {
                command,
                stderr: out.stderr.trim().to_string(),
            })
        }
    }
}

impl VcsClient for GitCli {
    fn init(&self, dir: &Path, cancel: &CancelFlag) -> Result<(), VcsError> {
        self.git(Some(dir), &["init", "--quiet"], cancel).map(|_| ())
    }

    fn fetch(
        &self,
        dir: &Path,
        url: &str,
        git_ref: &str,
        shallow: bool,
        cancel: &CancelFlag,
    ) -> Result<(), VcsError> {
        let mut args = vec!["fetch", "--quiet"];
        if shallow {
            args.extend(["--depth", "1"]);
        } else {
            if dir.join(".git").join("shallow").exists() {
                args.push("--unshallow");
            }
            args.push("--tags");
        }
        args.extend([url, git_ref]);
        self.git(Some(dir), &args, cancel).map(|_| ())
    }

    fn checkout(&self, dir: &Path, revision: &str, cancel: &CancelFlag) -> Result<(), VcsError> {
        self.git(
            Some(dir),
            &[
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--quiet",
                "--force",
                "--detach",
                revision,
            ],
            cancel,
        )
        .map(|_| ())
    }

    fn resolve(&self, dir: &Path, git_ref: &str, cancel: &CancelFlag) -> Result<String, VcsError> {
        let spec = format!("{git_ref}^{{commit}}");
        let out = self.git(Some(dir), &["rev-parse", "--verify", &spec], cancel)?;
        Ok(out.trim().to_string())
    }

    fn ls_remote(
        &self,
        url: &str,
        git_ref: &str,
        cancel: &CancelFlag,
    ) -> Result<Option<String>, VcsError> {
        if is_full_revision(git_ref) {
            return Ok(Some(git_ref.to_string()));
        }
        let out = self.git(None, &["ls-remote", url, git_ref], cancel)?;
        Ok(pick_advertised(&out, git_ref))
    }
}

/// A 40-character hex id names itself; no lookup needed.
fn is_full_revision(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Choose the revision for `git_ref` from `ls-remote` output.
///
/// Peeled annotated tags win over the tag object itself; branches win over
/// anything that merely ends with the same name.
fn pick_advertised(listing: &str, git_ref: &str) -> Option<String> {
    let entries: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .collect();

    let preferred = [
        format!("refs/tags/{git_ref}^{{}}"),
        format!("refs/heads/{git_ref}"),
        format!("refs/tags/{git_ref}"),
        git_ref.to_string(),
    ];
    for want in &preferred {
        if let Some((rev, _)) = entries.iter().find(|(_, name)| *name == want.as_str()) {
            return Some(rev.to_string());
        }
    }
    entries.first().map(|(rev, _)| rev.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
1111111111111111111111111111111111111111\trefs/heads/main
2222222222222222222222222222222222222222\trefs/tags/v1.0
3333333333333333333333333333333333333333\trefs/tags/v1.0^{}
4444444444444444444444444444444444444444\trefs/heads/feature/v1.0
";

    #[test]
    fn picks_branch_tip() {
        assert_eq!(
            pick_advertised(LISTING, "main").as_deref(),
            Some("1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn picks_peeled_tag() {
        assert_eq!(
            pick_advertised(LISTING, "v1.0").as_deref(),
            Some("3333333333333333333333333333333333333333")
        );
    }

    #[test]
    fn empty_listing_is_none() {
        assert_eq!(pick_advertised("", "main"), None);
    }

    #[test]
    fn full_revision_needs_no_lookup() {
        assert!(is_full_revision("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_full_revision("main"));
        assert!(!is_full_revision("abc123"));
    }
}
