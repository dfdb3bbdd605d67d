//! Subprocess execution with timeout and cancellation.
//!
//! Children are started in their own process group (Unix) so a timed-out or
//! cancelled shell wrapper is killed together with everything it spawned.
//! The deadline covers draining stdout/stderr as well as the exit of the
//! direct child, so a backgrounded grandchild that keeps a pipe open cannot
//! outlive it.

use std::future::Future;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Notify;

/// Shared cancellation signal, cheap to clone into workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Turns ctrl-c into [`CancelFlag::cancel`] for as long as it is alive.
pub struct InterruptGuard {
    _runtime: Runtime,
}

impl InterruptGuard {
    pub fn install(cancel: &CancelFlag) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let listener = {
            let _enter = runtime.enter();
            interrupt_listener()?
        };
        let cancel = cancel.clone();
        runtime.spawn(async move {
            if listener.await.is_ok() {
                tracing::warn!("received ctrl-c, cancelling in-flight syncs");
                cancel.cancel();
            }
        });
        Ok(Self { _runtime: runtime })
    }
}

/// Registers the signal handler immediately, so an interrupt that lands
/// before the listening task is first polled is not lost.
#[cfg(unix)]
fn interrupt_listener() -> std::io::Result<impl Future<Output = std::io::Result<()>> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        sigint.recv().await;
        Ok(())
    })
}

#[cfg(not(unix))]
fn interrupt_listener() -> std::io::Result<impl Future<Output = std::io::Result<()>> + Send> {
    Ok(tokio::signal::ctrl_c())
}

/// Captured result of a finished child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum ProcessError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
    Cancelled,
}

/// Run `cmd` to completion, killing its process group on timeout or when
/// `cancel` fires.
pub fn run(
    cmd: Command,
    timeout: Option<Duration>,
    cancel: &CancelFlag,
) -> Result<CommandOutput, ProcessError> {
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ProcessError::Spawn)?;
    runtime.block_on(run_async(cmd, timeout, cancel))
}

async fn run_async(
    mut cmd: Command,
    timeout: Option<Duration>,
    cancel: &CancelFlag,
) -> Result<CommandOutput, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;
    // The child leads its own group, so its pid is the pgid. Read it now:
    // tokio forgets the pid once the child is reaped.
    let pgid = child.id();

    let finished = tokio::select! {
        res = within(timeout, collect(&mut child)) => res,
        _ = cancel.cancelled() => Err(ProcessError::Cancelled),
    };
    if finished.is_err() {
        kill_group(pgid);
        let _ = child.kill().await;
    }
    finished
}

async fn within<F>(limit: Option<Duration>, work: F) -> Result<CommandOutput, ProcessError>
where
    F: Future<Output = Result<CommandOutput, ProcessError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| ProcessError::TimedOut(limit))?,
        None => work.await,
    }
}

/// Wait for the child and for both pipes to close.
async fn collect(child: &mut Child) -> Result<CommandOutput, ProcessError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
    Ok(CommandOutput {
        status: status.map_err(ProcessError::Wait)?,
        stdout,
        stderr,
    })
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pgid else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        if e != Errno::ESRCH {
            tracing::warn!(pgid, "failed to kill process group: {e}");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}
