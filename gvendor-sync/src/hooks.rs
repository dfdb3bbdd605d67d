//! Pre/post-sync shell hooks.
//!
//! Hooks run through the platform shell in the project root with a fixed
//! set of `GVENDOR_*` environment variables. Values are stripped of CR, LF,
//! and NUL so a hostile vendor name or URL cannot inject extra lines into a
//! hook's environment.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use gvendor_core::settings::DEFAULT_HOOK_TIMEOUT_SECS;

use crate::error::{HookFailure, SyncError, SyncPhase};
use crate::process::{self, CancelFlag, ProcessError};

/// Values exported to a hook.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub vendor: String,
    pub url: String,
    pub git_ref: String,
    /// Empty before the revision is known.
    pub commit: String,
    pub root: PathBuf,
    pub files_copied: usize,
}

impl HookContext {
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("GVENDOR_NAME", sanitize(&self.vendor)),
            ("GVENDOR_URL", sanitize(&self.url)),
            ("GVENDOR_REF", sanitize(&self.git_ref)),
            ("GVENDOR_COMMIT", sanitize(&self.commit)),
            ("GVENDOR_ROOT", sanitize(&self.root.to_string_lossy())),
            ("GVENDOR_FILES_COPIED", self.files_copied.to_string()),
        ]
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\0'))
        .collect()
}

#[derive(Debug, Clone)]
pub struct HookRunner {
    timeout: Duration,
    verbose: bool,
}

impl Default for HookRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HOOK_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

impl HookRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run `command` for `phase`. An empty command is a no-op.
    pub fn run(
        &self,
        phase: SyncPhase,
        command: &str,
        ctx: &HookContext,
        cancel: &CancelFlag,
    ) -> Result<(), SyncError> {
        if command.trim().is_empty() {
            return Ok(());
        }
        if self.verbose {
            tracing::info!("{} {phase}: {command}", ctx.vendor);
        } else {
            tracing::debug!("{} {phase}: {command}", ctx.vendor);
        }

        let hook_err = |failure| SyncError::Hook {
            phase,
            command: command.to_string(),
            failure,
        };

        let out = process::run(shell(command, &ctx.root, ctx), Some(self.timeout), cancel)
            .map_err(|e| match e {
                ProcessError::Cancelled => SyncError::Cancelled,
                ProcessError::TimedOut(after) => hook_err(HookFailure::TimedOut {
                    secs: after.as_secs(),
                }),
                ProcessError::Spawn(e) | ProcessError::Wait(e) => hook_err(HookFailure::Spawn {
                    message: e.to_string(),
                }),
            })?;

        for line in out.stdout.lines() {
            tracing::debug!("[{} hook] {line}", ctx.vendor);
        }
        if out.status.success() {
            Ok(())
        } else {
            Err(hook_err(HookFailure::Exit {
                code: out.status.code(),
                stderr: out.stderr,
            }))
        }
    }
}

fn shell(command: &str, root: &Path, ctx: &HookContext) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.current_dir(root).envs(ctx.env());
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn ctx(root: &Path) -> HookContext {
        HookContext {
            vendor: "libfoo".to_string(),
            url: "https://example.com/libfoo.git".to_string(),
            git_ref: "main".to_string(),
            commit: "abc123".to_string(),
            root: root.to_path_buf(),
            files_copied: 3,
        }
    }

    #[test]
    fn exports_environment_in_project_root() {
        let tmp = TempDir::new().unwrap();
        let runner = HookRunner::default();
        runner
            .run(
                SyncPhase::PostSync,
                "echo \"$GVENDOR_NAME $GVENDOR_REF $GVENDOR_COMMIT $GVENDOR_FILES_COPIED\" > out.txt",
                &ctx(tmp.path()),
                &CancelFlag::new(),
            )
            .unwrap();
        let out = std::fs::read_to_string(tmp.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "libfoo main abc123 3");
    }

    #[test]
    fn strips_control_characters_from_values() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = ctx(tmp.path());
        ctx.vendor = "evil\nINJECTED=1\r".to_string();
        let env = ctx.env();
        let (_, name) = env.iter().find(|(k, _)| *k == "GVENDOR_NAME").unwrap();
        assert_eq!(name, "evilINJECTED=1");
    }

    #[test]
    fn non_zero_exit_is_hook_error_with_stderr() {
        let tmp = TempDir::new().unwrap();
        let err = HookRunner::default()
            .run(
                SyncPhase::PreSync,
                "echo nope >&2; exit 7",
                &ctx(tmp.path()),
                &CancelFlag::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Hook);
        match err {
            SyncError::Hook {
                phase,
                failure: HookFailure::Exit { code, stderr },
                ..
            } => {
                assert_eq!(phase, SyncPhase::PreSync);
                assert_eq!(code, Some(7));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn slow_hook_times_out() {
        let tmp = TempDir::new().unwrap();
        let err = HookRunner::new(Duration::from_millis(200))
            .run(
                SyncPhase::PostSync,
                "sleep 30",
                &ctx(tmp.path()),
                &CancelFlag::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Hook {
                failure: HookFailure::TimedOut { .. },
                ..
            }
        ));
    }

    #[test]
    fn backgrounded_job_cannot_outlast_timeout() {
        let tmp = TempDir::new().unwrap();
        let started = std::time::Instant::now();
        let err = HookRunner::new(Duration::from_millis(300))
            .run(
                SyncPhase::PostSync,
                "sleep 4 &",
                &ctx(tmp.path()),
                &CancelFlag::new(),
            )
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(matches!(
            err,
            SyncError::Hook {
                failure: HookFailure::TimedOut { .. },
                ..
            }
        ));
    }

    #[test]
    fn blank_command_is_noop() {
        let tmp = TempDir::new().unwrap();
        HookRunner::default()
            .run(SyncPhase::PreSync, "  ", &ctx(tmp.path()), &CancelFlag::new())
            .unwrap();
    }
}
