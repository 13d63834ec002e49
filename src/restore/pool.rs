//! Bounded-concurrency execution of restore jobs.
//!
//! A dispatch task walks the plan in order and takes a semaphore permit
//! before spawning each job task. Job tasks own their permit for the whole
//! subprocess lifetime and report to a single aggregator over a channel.
//! The pool waits for every job task before returning; one failed job never
//! cancels another.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::job::{JobState, RestoreJob};
use super::summary::{JobReport, RestoreSummary};
use super::{JobEvent, JobObserver};
use crate::archive::tool::ArchiveTool;
use crate::config::{expand_path, Config};
use crate::error::{JobError, RestoreError, Result};
use crate::model::batch::RestoreBatch;

/// Runs restore batches as subprocesses, at most `concurrency` at a time.
pub struct JobPool {
    tool: Arc<ArchiveTool>,
    dest: Arc<PathBuf>,
    concurrency: usize,
    timeout: Option<Duration>,
    observer: Option<JobObserver>,
}

impl JobPool {
    pub fn new(tool: ArchiveTool, dest: impl Into<PathBuf>, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(RestoreError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            tool: Arc::new(tool),
            dest: Arc::new(dest.into()),
            concurrency,
            timeout: None,
            observer: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = Self::new(
            ArchiveTool::from_config(config)?,
            expand_path(&config.restore.output_dir),
            config.restore.concurrency,
        )?;
        Ok(pool.with_timeout(config.restore.timeout_secs.map(Duration::from_secs)))
    }

    /// Stop starting new jobs once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Called by the aggregator for every job event.
    pub fn with_observer(mut self, observer: JobObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every batch and wait until all of them are terminal.
    ///
    /// Returns [`RestoreError::JobsFailed`] carrying the full summary when
    /// at least one job failed.
    pub async fn run(&self, batches: Vec<RestoreBatch>) -> Result<RestoreSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            jobs = batches.len(),
            concurrency = self.concurrency,
            dest = %self.dest.display(),
            "Starting restore jobs"
        );

        let (events, receiver) = mpsc::unbounded_channel();
        let aggregator = tokio::spawn(aggregate(receiver, self.observer.clone()));

        let dispatch = tokio::spawn(dispatch(
            batches,
            Arc::new(Semaphore::new(self.concurrency)),
            Arc::clone(&self.tool),
            Arc::clone(&self.dest),
            events.clone(),
            self.timeout.map(|t| tokio::time::Instant::now() + t),
        ));

        let (tasks, timed_out) = match dispatch.await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                // Job tasks already spawned keep running detached and reap
                // their own children.
                error!(error = %e, "Dispatch task failed");
                return Err(RestoreError::Config(format!("dispatch task failed: {e}")));
            }
        };

        for (placeholder, task) in tasks {
            if let Err(e) = task.await {
                error!(job = %placeholder.label(), error = %e, "Job task panicked");
                let mut report = placeholder;
                report.error = Some(JobError::Exit {
                    code: None,
                    stderr: format!("job task panicked: {e}"),
                });
                let _ = events.send(JobEvent::Finished(report));
            }
        }
        drop(events);

        let (reports, peak_running) = aggregator.await.map_err(|e| {
            RestoreError::Config(format!("aggregator task failed: {e}"))
        })?;

        let summary = RestoreSummary::from_reports(
            reports,
            peak_running,
            started_at,
            clock.elapsed().as_millis() as u64,
            timed_out,
        );
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Restore jobs finished"
        );
        summary.into_result()
    }
}

type DispatchedTask = (JobReport, JoinHandle<()>);

/// Start jobs in plan order as permits become available.
async fn dispatch(
    batches: Vec<RestoreBatch>,
    semaphore: Arc<Semaphore>,
    tool: Arc<ArchiveTool>,
    dest: Arc<PathBuf>,
    events: UnboundedSender<JobEvent>,
    deadline: Option<tokio::time::Instant>,
) -> (Vec<DispatchedTask>, bool) {
    let mut tasks = Vec::with_capacity(batches.len());
    let mut timed_out = false;

    for batch in batches {
        let permit = if timed_out {
            None
        } else {
            match deadline {
                Some(deadline) => tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                },
                None => Arc::clone(&semaphore).acquire_owned().await.ok(),
            }
        };

        let Some(permit) = permit else {
            if !timed_out {
                warn!("Restore timed out, no further jobs will be started");
                timed_out = true;
            }
            let report =
                JobReport::for_batch(&batch, JobState::Failed, Some(JobError::NotStarted));
            let _ = events.send(JobEvent::Finished(report));
            continue;
        };

        let placeholder = JobReport::for_batch(&batch, JobState::Failed, None);
        let tool = Arc::clone(&tool);
        let dest = Arc::clone(&dest);
        let events = events.clone();
        let task = tokio::spawn(async move {
            let report = RestoreJob::new(batch).execute(&tool, &dest, &events).await;
            let _ = events.send(JobEvent::Finished(report));
            drop(permit);
        });
        tasks.push((placeholder, task));
    }

    (tasks, timed_out)
}

/// Single consumer of job events: counts running jobs, collects reports,
/// and forwards every event to the observer.
async fn aggregate(
    mut receiver: UnboundedReceiver<JobEvent>,
    observer: Option<JobObserver>,
) -> (Vec<JobReport>, usize) {
    let mut running: HashSet<usize> = HashSet::new();
    let mut peak = 0usize;
    let mut reports = Vec::new();

    while let Some(event) = receiver.recv().await {
        if let Some(observer) = &observer {
            observer(&event);
        }
        match event {
            JobEvent::Started { sequence, .. } => {
                running.insert(sequence);
                peak = peak.max(running.len());
            }
            JobEvent::Finished(report) => {
                running.remove(&report.sequence);
                reports.push(report);
            }
        }
    }

    (reports, peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_concurrency_rejected() {
        let tool = ArchiveTool::new("tarsnap", "/dev/null");
        assert!(JobPool::new(tool, "/tmp", 0).is_err());
    }

    #[tokio::test]
    async fn test_empty_plan_succeeds() {
        let tool = ArchiveTool::new("/nonexistent/tool", "/dev/null");
        let pool = JobPool::new(tool, "/tmp", 4).unwrap();
        let summary = pool.run(Vec::new()).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.peak_running, 0);
    }

    #[tokio::test]
    async fn test_start_failures_are_collected() {
        let tool = ArchiveTool::new("/nonexistent/tool", "/dev/null");
        let pool = JobPool::new(tool, "/tmp", 2).unwrap();
        let batches: Vec<RestoreBatch> = (0..3)
            .map(|sequence| RestoreBatch {
                archive: "set.a.maildir".into(),
                user: "a".into(),
                mailbox: "INBOX".into(),
                files: vec![format!("./a/Maildir/cur/{sequence}")],
                total_size: 1,
                sequence,
            })
            .collect();
        match pool.run(batches).await {
            Err(RestoreError::JobsFailed { summary }) => {
                assert_eq!(summary.total, 3);
                assert_eq!(summary.failed, 3);
                assert!(summary.peak_running <= 2);
                assert!(summary
                    .jobs
                    .iter()
                    .all(|j| matches!(j.error, Some(JobError::Start { .. }))));
            }
            other => panic!("expected JobsFailed, got {other:?}"),
        }
    }
}
