//! Progress reporting seam between the sync engine and its front end.

/// Receives human-facing progress events. Implementations must tolerate
/// calls from several worker threads at once.
pub trait SyncReporter: Send + Sync {
    fn progress(&self, vendor: &str, message: &str) {
        tracing::info!("{vendor}: {message}");
    }

    fn success(&self, vendor: &str, message: &str) {
        tracing::info!("{vendor}: {message}");
    }

    fn warning(&self, vendor: &str, message: &str) {
        tracing::warn!("{vendor}: {message}");
    }
}

/// Routes every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl SyncReporter for TracingReporter {}
