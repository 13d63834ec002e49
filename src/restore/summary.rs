//! Per-job reports and the aggregate outcome of a restore run.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::job::JobState;
use crate::error::{JobError, RestoreError, Result};
use crate::model::batch::RestoreBatch;

/// Final record of one restore job.
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub sequence: usize,
    pub archive: String,
    pub user: String,
    pub mailbox: String,
    pub files: usize,
    pub size: u64,
    pub state: JobState,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<JobError>,
    pub elapsed_ms: u64,
}

impl JobReport {
    /// A report for `batch` in the given terminal state.
    pub fn for_batch(batch: &RestoreBatch, state: JobState, error: Option<JobError>) -> Self {
        Self {
            sequence: batch.sequence,
            archive: batch.archive.clone(),
            user: batch.user.clone(),
            mailbox: batch.mailbox.clone(),
            files: batch.files.len(),
            size: batch.total_size,
            state,
            error,
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Short human label: `#3 alice/Sent`.
    pub fn label(&self) -> String {
        format!("#{} {}/{}", self.sequence, self.user, self.mailbox)
    }
}

/// Outcome of a whole run. `succeeded + failed == total` always holds.
#[derive(Debug, Serialize)]
pub struct RestoreSummary {
    /// Jobs submitted to the pool.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Every job report, in plan order.
    pub jobs: Vec<JobReport>,
    /// Highest number of jobs seen running at once.
    pub peak_running: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// The run hit its timeout; unstarted jobs are reported as failed.
    pub timed_out: bool,
    /// Nothing was executed.
    pub dry_run: bool,
}

impl RestoreSummary {
    /// Assemble a summary from job reports in any order.
    pub fn from_reports(
        mut jobs: Vec<JobReport>,
        peak_running: usize,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        timed_out: bool,
    ) -> Self {
        jobs.sort_by_key(|j| j.sequence);
        let succeeded = jobs.iter().filter(|j| j.succeeded()).count();
        Self {
            total: jobs.len(),
            succeeded,
            failed: jobs.len() - succeeded,
            jobs,
            peak_running,
            started_at,
            elapsed_ms,
            timed_out,
            dry_run: false,
        }
    }

    /// Summary of a run that only planned.
    pub fn dry_run() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            jobs: Vec::new(),
            peak_running: 0,
            started_at: Utc::now(),
            elapsed_ms: 0,
            timed_out: false,
            dry_run: true,
        }
    }

    /// Failed jobs in plan order.
    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| !j.succeeded())
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Turn a summary with failures into [`RestoreError::JobsFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RestoreError::JobsFailed {
                summary: Box::new(self),
            })
        }
    }
}

fn serialize_error<S: Serializer>(error: &Option<JobError>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}
