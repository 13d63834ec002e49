//! Restore execution: job pool, per-job lifecycle, progress polling, and
//! the summary of a run.

pub mod job;
pub mod pool;
pub mod progress;
pub mod summary;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{expand_path, Config};
use crate::error::{RestoreError, Result};
use crate::index::MetadataIndex;
use crate::model::batch::RestoreBatch;

use self::pool::JobPool;
use self::progress::{ProgressMonitor, ProgressReporter};
use self::summary::{JobReport, RestoreSummary};

/// Event sent from a job task to the aggregator.
#[derive(Debug)]
pub enum JobEvent {
    /// The job's command exists and is being launched.
    Started { sequence: usize, label: String },
    /// The job reached a terminal state.
    Finished(JobReport),
}

/// Callback run by the aggregator for every [`JobEvent`].
pub type JobObserver = Arc<dyn Fn(&JobEvent) + Send + Sync>;

/// Optional hooks for user-visible output during a run.
#[derive(Default)]
pub struct RunHooks {
    pub on_event: Option<JobObserver>,
    pub on_progress: Option<ProgressReporter>,
}

/// Execute a planned restore.
///
/// The configuration is validated first. In dry-run mode nothing is
/// spawned and an empty dry-run summary is returned. Otherwise the
/// destination is created, the progress monitor is started if a reporter
/// was given, all batches run through the [`JobPool`], and the monitor is
/// stopped after every job is terminal. A failing monitor is logged and
/// never affects the restore result.
pub async fn execute(
    config: &Config,
    index: &MetadataIndex,
    batches: Vec<RestoreBatch>,
    hooks: RunHooks,
) -> Result<RestoreSummary> {
    config.validate()?;
    if config.restore.dry_run {
        info!(batches = batches.len(), "Dry run, no restore jobs started");
        return Ok(RestoreSummary::dry_run());
    }

    let mut pool = JobPool::from_config(config)?;
    if let Some(observer) = hooks.on_event {
        pool = pool.with_observer(observer);
    }

    let dest = expand_path(&config.restore.output_dir);
    std::fs::create_dir_all(&dest).map_err(|e| RestoreError::io(&dest, e))?;

    let monitor = hooks.on_progress.map(|reporter| {
        let planned = index
            .file_sizes()
            .into_iter()
            .map(|(path, size)| (path.to_string(), size))
            .collect();
        ProgressMonitor::new(
            dest.clone(),
            planned,
            Duration::from_millis(config.restore.progress_interval_ms),
        )
        .spawn(reporter)
    });

    let result = pool.run(batches).await;

    if let Some(monitor) = monitor {
        match monitor.finish().await {
            Ok(restored) => info!(restored, "Final progress sample"),
            Err(e) => warn!(error = %e, "Progress monitor stopped early"),
        }
    }

    result
}
