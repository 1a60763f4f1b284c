//! Recurring execution of sync jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_model::Provider;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::lock::{run_guarded, SyncLock};
use crate::orchestrator::SyncOrchestrator;
use crate::summary::{RunStatus, RunSummary};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// One registered provider sync and when it next runs.
struct SyncJob {
    orchestrator: SyncOrchestrator,
    next_run: DateTime<Utc>,
}

/// Polls registered sync jobs and runs the ones that are due.
///
/// Every run goes through [`run_guarded`], so overlapping schedules
/// across service instances degrade to skipped ticks instead of
/// concurrent runs.
pub struct SyncScheduler {
    jobs: tokio::sync::Mutex<Vec<SyncJob>>,
    lock: Arc<dyn SyncLock>,
    poll_interval: Duration,
    shutdown: AtomicBool,
}

impl SyncScheduler {
    pub fn new(lock: Arc<dyn SyncLock>) -> Self {
        Self {
            jobs: tokio::sync::Mutex::new(Vec::new()),
            lock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Set how often due jobs are checked for.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Register a provider sync according to its configured schedule.
    pub async fn register(&self, orchestrator: SyncOrchestrator) {
        let provider = orchestrator.provider();
        match orchestrator.config().schedule.next_run_after(Utc::now()) {
            Some(next_run) => {
                info!(%provider, %next_run, "registered sync job");
                let mut jobs = self.jobs.lock().await;
                jobs.push(SyncJob {
                    orchestrator,
                    next_run,
                });
            }
            None => {
                error!(%provider, "could not compute a next run, job not registered");
            }
        }
    }

    /// Poll until [`SyncScheduler::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "starting sync scheduler"
        );

        let mut poll = interval(self.poll_interval);
        loop {
            poll.tick().await;
            if self.is_shutdown() {
                info!("sync scheduler stopping");
                break;
            }
            self.run_due_jobs(Utc::now()).await;
        }
    }

    /// Ask the scheduler to stop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Trigger one provider's job immediately, regardless of its
    /// schedule. Returns `None` when no job is registered for it.
    pub async fn run_job_now(&self, provider: Provider) -> Option<RunSummary> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|job| job.orchestrator.provider() == provider)?;

        let summary = run_guarded(self.lock.as_ref(), &job.orchestrator).await;
        if let Some(next_run) = job.orchestrator.config().schedule.next_run_after(Utc::now()) {
            job.next_run = next_run;
        }
        Some(summary)
    }

    async fn run_due_jobs(&self, now: DateTime<Utc>) {
        let mut jobs = self.jobs.lock().await;
        for job in jobs.iter_mut() {
            if now < job.next_run {
                continue;
            }

            let summary = run_guarded(self.lock.as_ref(), &job.orchestrator).await;
            log_summary(&summary);

            match job.orchestrator.config().schedule.next_run_after(now) {
                Some(next_run) => {
                    debug!(provider = %summary.provider, %next_run, "rescheduled sync job");
                    job.next_run = next_run;
                }
                None => {
                    error!(provider = %summary.provider, "could not compute a next run");
                }
            }
        }
    }
}

fn log_summary(summary: &RunSummary) {
    match summary.status {
        RunStatus::Succeeded => info!(
            provider = %summary.provider,
            created = summary.created,
            updated = summary.updated,
            touched = summary.touched,
            deleted = summary.deleted,
            "scheduled sync run completed"
        ),
        RunStatus::Failed => error!(
            provider = %summary.provider,
            errors = summary.errors.len(),
            "scheduled sync run failed"
        ),
        RunStatus::Skipped => debug!(provider = %summary.provider, "scheduled sync run skipped"),
    }
}
