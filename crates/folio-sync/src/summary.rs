//! Run outcome reporting.

use chrono::{DateTime, Utc};
use folio_model::Provider;
use serde::Serialize;

/// Terminal status of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All phases completed.
    Succeeded,
    /// The run aborted part-way; pages committed before the abort
    /// stand.
    Failed,
    /// The run never started (provider disabled or lock busy).
    Skipped,
}

/// One failure recorded during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub external_id: Option<String>,
    pub username: Option<String>,
    pub message: String,
}

/// What one synchronization run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub provider: Provider,
    pub status: RunStatus,
    /// Run start, also the watermark stamped on every visited record.
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Directory pages fetched.
    pub pages: u32,
    /// Identities returned by the directory.
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
    /// Unchanged records whose watermark was advanced.
    pub touched: u64,
    pub deleted: u64,
    pub role_grants: u64,
    pub role_revocations: u64,
    /// Records dropped without a write (blank ids, conflict skips).
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<RunError>,
}

impl RunSummary {
    /// Summary for a run beginning now-ish; status flips on
    /// [`RunSummary::fail`].
    pub fn started(provider: Provider, started_at: DateTime<Utc>) -> Self {
        Self {
            provider,
            status: RunStatus::Succeeded,
            started_at,
            completed_at: None,
            pages: 0,
            fetched: 0,
            created: 0,
            updated: 0,
            touched: 0,
            deleted: 0,
            role_grants: 0,
            role_revocations: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Summary for a run that never started.
    pub fn skipped(provider: Provider) -> Self {
        let now = Utc::now();
        let mut summary = Self::started(provider, now);
        summary.status = RunStatus::Skipped;
        summary.completed_at = Some(now);
        summary
    }

    pub fn record_page(&mut self, fetched: usize) {
        self.pages += 1;
        self.fetched += fetched as u64;
    }

    pub fn record_created(&mut self, count: usize) {
        self.created += count as u64;
    }

    pub fn record_updated(&mut self) {
        self.updated += 1;
    }

    pub fn record_touched(&mut self, count: usize) {
        self.touched += count as u64;
    }

    pub fn record_deleted(&mut self, count: usize) {
        self.deleted += count as u64;
    }

    pub fn record_role_grants(&mut self, count: usize) {
        self.role_grants += count as u64;
    }

    pub fn record_role_revocations(&mut self, count: usize) {
        self.role_revocations += count as u64;
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.skipped += count as u64;
    }

    pub fn record_failure(
        &mut self,
        external_id: Option<String>,
        username: Option<String>,
        message: impl Into<String>,
    ) {
        self.failed += 1;
        self.errors.push(RunError {
            external_id,
            username,
            message: message.into(),
        });
    }

    /// Close the run as succeeded.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Close the run as failed, recording the cause.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.errors.push(RunError {
            external_id: None,
            username: None,
            message: message.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
