//! Restore progress estimated by polling the destination directory.
//!
//! The tool offers no progress callback, so the monitor periodically stats
//! every planned file under the destination and sums the sizes of regular
//! files found. A file caught mid-write counts with its current length, so
//! the estimate is approximate; it never decreases.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{RestoreError, Result};

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTick {
    /// Estimated bytes restored so far.
    pub restored: u64,
    /// Bytes planned for restore.
    pub total: u64,
}

impl ProgressTick {
    /// Completion in `0.0..=1.0` (an empty plan counts as complete).
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.restored as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Receives every progress tick.
pub type ProgressReporter = Box<dyn FnMut(ProgressTick) + Send>;

/// Polls the destination for the planned files.
pub struct ProgressMonitor {
    dest: PathBuf,
    files: Arc<Vec<String>>,
    total: u64,
    interval: Duration,
}

impl ProgressMonitor {
    /// `files` holds `(archive path, listed size)` pairs. The interval is
    /// at least one millisecond.
    pub fn new(dest: impl Into<PathBuf>, files: Vec<(String, u64)>, interval: Duration) -> Self {
        let total = files.iter().map(|(_, size)| size).sum();
        Self {
            dest: dest.into(),
            files: Arc::new(files.into_iter().map(|(path, _)| path).collect()),
            total,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes currently present for the planned files.
    pub async fn sample(&self) -> Result<u64> {
        let dest = self.dest.clone();
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || measure(&dest, &files))
            .await
            .map_err(|e| RestoreError::Progress {
                path: self.dest.clone(),
                source: std::io::Error::other(e.to_string()),
            })?
    }

    /// Start polling. The returned handle stops the monitor.
    pub fn spawn(self, mut reporter: ProgressReporter) -> MonitorHandle {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut restored = 0u64;

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        restored = restored.max(self.sample().await?);
                        reporter(ProgressTick { restored, total: self.total });
                    }
                }
            }

            // Final sample so the display can reach the real end state.
            restored = restored.max(self.sample().await?);
            reporter(ProgressTick {
                restored,
                total: self.total,
            });
            debug!(restored, total = self.total, "Progress monitor stopped");
            Ok::<u64, RestoreError>(restored)
        });
        MonitorHandle { stop, task }
    }
}

/// Handle to a running [`ProgressMonitor`].
pub struct MonitorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<u64>>,
}

impl MonitorHandle {
    /// Signal the monitor to stop, wait for its final sample, and return the
    /// last restored-bytes estimate.
    pub async fn finish(self) -> Result<u64> {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RestoreError::Progress {
                path: PathBuf::from("<monitor>"),
                source: std::io::Error::other(e.to_string()),
            }),
        }
    }
}

/// Sum the sizes of the regular files among `files` under `dest`.
///
/// Missing paths and directories count as zero; any other error is fatal
/// to the monitor.
fn measure(dest: &Path, files: &[String]) -> Result<u64> {
    let mut bytes = 0u64;
    for file in files {
        let path = dest.join(file.trim_start_matches('/'));
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => bytes += meta.len(),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(RestoreError::Progress { path, source }),
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        assert_eq!(ProgressTick { restored: 5, total: 10 }.fraction(), 0.5);
        assert_eq!(ProgressTick { restored: 0, total: 0 }.fraction(), 1.0);
        assert_eq!(ProgressTick { restored: 12, total: 10 }.fraction(), 1.0);
    }

    #[test]
    fn test_measure_counts_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let cur = dir.path().join("alice/Maildir/cur");
        std::fs::create_dir_all(&cur).unwrap();
        std::fs::write(cur.join("1"), vec![0u8; 100]).unwrap();

        let files = vec![
            "./alice/Maildir/cur/1".to_string(),
            "./alice/Maildir/cur".to_string(),
            "./alice/Maildir/cur/missing".to_string(),
        ];
        assert_eq!(measure(dir.path(), &files).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_final_sample_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = ProgressMonitor::new(
            dir.path(),
            vec![("./bob/Maildir/cur/1".to_string(), 40)],
            Duration::from_secs(3600),
        );
        assert_eq!(monitor.total(), 40);

        let ticks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        let handle = monitor.spawn(Box::new(move |tick| sink.lock().unwrap().push(tick)));

        let cur = dir.path().join("bob/Maildir/cur");
        std::fs::create_dir_all(&cur).unwrap();
        std::fs::write(cur.join("1"), vec![0u8; 40]).unwrap();

        assert_eq!(handle.finish().await.unwrap(), 40);
        let ticks = ticks.lock().unwrap();
        assert_eq!(ticks.last().unwrap().restored, 40);
        assert!(ticks.windows(2).all(|w| w[0].restored <= w[1].restored));
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = ProgressMonitor::new(dir.path(), Vec::new(), Duration::ZERO);
        assert_eq!(monitor.interval, Duration::from_millis(1));

        let handle = monitor.spawn(Box::new(|_| {}));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(handle.finish().await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_destination_ends_monitor_with_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the user's directory should be: stat fails
        // with ENOTDIR rather than NotFound.
        std::fs::write(dir.path().join("alice"), b"not a directory").unwrap();
        let monitor = ProgressMonitor::new(
            dir.path(),
            vec![("./alice/Maildir/cur/1".to_string(), 10)],
            Duration::from_secs(3600),
        );

        let handle = monitor.spawn(Box::new(|_| {}));
        match handle.finish().await {
            Err(RestoreError::Progress { path, .. }) => {
                assert!(path.ends_with("alice/Maildir/cur/1"));
            }
            other => panic!("expected progress error, got {other:?}"),
        }
    }
}
