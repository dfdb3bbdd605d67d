//! Bounded parallel execution of vendor jobs.
//!
//! Jobs are blocking (git subprocesses, file I/O), so each runs on tokio's
//! blocking pool behind a semaphore that caps concurrency at the worker
//! count. Results come back in completion order, one per job.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{io_err, SyncError};
use crate::orchestrator::{SyncJob, SyncResult};
use crate::process::CancelFlag;

#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job and block until all have finished. Jobs not yet
    /// started when `cancel` fires are reported as cancelled.
    pub fn execute<F>(
        &self,
        jobs: Vec<SyncJob>,
        cancel: &CancelFlag,
        run: F,
    ) -> Result<Vec<SyncResult>, SyncError>
    where
        F: Fn(SyncJob) -> SyncResult + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.workers)
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;
        runtime.block_on(self.dispatch(jobs, cancel.clone(), Arc::new(run)))
    }

    async fn dispatch<F>(
        &self,
        jobs: Vec<SyncJob>,
        cancel: CancelFlag,
        run: Arc<F>,
    ) -> Result<Vec<SyncResult>, SyncError>
    where
        F: Fn(SyncJob) -> SyncResult + Send + Sync + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut results = Vec::with_capacity(jobs.len());

        for job in jobs {
            let name = job.name().to_string();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Worker {
                    vendor: name.clone(),
                    message: e.to_string(),
                })?;
            if cancel.is_cancelled() {
                results.push(SyncResult::failed(&name, SyncError::Cancelled));
                continue;
            }
            let run = Arc::clone(&run);
            set.spawn(async move {
                let joined = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    run(job)
                })
                .await;
                (name, joined)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(result))) => results.push(result),
                Ok((name, Err(err))) => {
                    tracing::error!("sync worker for {name} panicked: {err}");
                    results.push(SyncResult::failed(
                        &name,
                        SyncError::Worker {
                            vendor: name.clone(),
                            message: err.to_string(),
                        },
                    ));
                }
                Err(err) => {
                    return Err(SyncError::Worker {
                        vendor: String::new(),
                        message: err.to_string(),
                    })
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::JobMode;
    use gvendor_core::{VendorName, VendorSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn job(name: &str) -> SyncJob {
        SyncJob {
            vendor: VendorSpec {
                name: VendorName::from(name),
                url: format!("https://example.com/{name}.git"),
                license: String::new(),
                groups: vec![],
                hooks: None,
                specs: vec![],
            },
            mode: JobMode::default(),
        }
    }

    #[test]
    fn every_job_yields_one_result() {
        let jobs: Vec<_> = (0..10).map(|i| job(&format!("v{i}"))).collect();
        let results = ParallelExecutor::new(3)
            .execute(jobs, &CancelFlag::new(), |job| {
                let mut r = SyncResult::new(job.name());
                r.files_copied = 2;
                r
            })
            .unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().map(|r| r.files_copied).sum::<usize>(), 20);
        let mut names: Vec<_> = results.iter().map(|r| r.vendor.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<_> = (0..8).map(|i| job(&format!("v{i}"))).collect();

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        ParallelExecutor::new(2)
            .execute(jobs, &CancelFlag::new(), move |job| {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                a.fetch_sub(1, Ordering::SeqCst);
                SyncResult::new(job.name())
            })
            .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {peak}");
        assert!(peak >= 1);
    }

    #[test]
    fn failures_do_not_stop_other_jobs() {
        let jobs: Vec<_> = ["ok1", "bad", "ok2"].iter().map(|n| job(n)).collect();
        let results = ParallelExecutor::new(2)
            .execute(jobs, &CancelFlag::new(), |job| {
                if job.name() == "bad" {
                    SyncResult::failed(job.name(), SyncError::Cancelled)
                } else {
                    SyncResult::new(job.name())
                }
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
    }

    #[test]
    fn panicking_job_becomes_failed_result() {
        let jobs = vec![job("boom"), job("fine")];
        let results = ParallelExecutor::new(2)
            .execute(jobs, &CancelFlag::new(), |job| {
                if job.name() == "boom" {
                    panic!("worker exploded");
                }
                SyncResult::new(job.name())
            })
            .unwrap();
        let boom = results.iter().find(|r| r.vendor == "boom").unwrap();
        assert!(matches!(boom.error, Some(SyncError::Worker { .. })));
    }

    #[test]
    fn cancelled_before_start_reports_every_job_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let results = ParallelExecutor::new(2)
            .execute(vec![job("a"), job("b")], &cancel, move |job| {
                counter.fetch_add(1, Ordering::SeqCst);
                SyncResult::new(job.name())
            })
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(results
            .iter()
            .all(|r| matches!(r.error, Some(SyncError::Cancelled))));
    }
}
