//! One restore job: a single tool subprocess restoring one batch.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::summary::JobReport;
use super::JobEvent;
use crate::archive::tool::ArchiveTool;
use crate::error::JobError;
use crate::model::batch::RestoreBatch;

/// Bytes of standard error kept for the failure report.
const STDERR_TAIL_BYTES: usize = 4096;

/// Lifecycle of a job. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    /// The command has been prepared and is about to be spawned.
    Started,
    /// The subprocess is alive.
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A batch together with its execution state.
///
/// Owned by exactly one job task; nothing else mutates it.
#[derive(Debug)]
pub struct RestoreJob {
    batch: RestoreBatch,
    state: JobState,
    error: Option<JobError>,
}

impl RestoreJob {
    pub fn new(batch: RestoreBatch) -> Self {
        Self {
            batch,
            state: JobState::Pending,
            error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn batch(&self) -> &RestoreBatch {
        &self.batch
    }

    /// Move to `next`. Backward or repeated transitions are refused.
    pub fn advance(&mut self, next: JobState) -> bool {
        if next <= self.state || self.state.is_terminal() {
            warn!(
                job = %self.batch.label(),
                from = ?self.state,
                to = ?next,
                "Refusing job state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    fn fail(&mut self, error: JobError) {
        if self.advance(JobState::Failed) {
            self.error = Some(error);
        }
    }

    /// Run the subprocess to completion and return its report.
    ///
    /// Sends [`JobEvent::Started`] once the command exists. The caller is
    /// responsible for sending the final report.
    pub async fn execute(
        mut self,
        tool: &ArchiveTool,
        dest: &Path,
        events: &UnboundedSender<JobEvent>,
    ) -> JobReport {
        let clock = Instant::now();
        let mut command = tool.restore_command(&self.batch, dest);
        self.advance(JobState::Started);
        let _ = events.send(JobEvent::Started {
            sequence: self.batch.sequence,
            label: self.batch.label(),
        });

        match command.spawn() {
            Ok(mut child) => {
                self.advance(JobState::Running);
                debug!(job = %self.batch.label(), pid = ?child.id(), "Restore process running");

                let stderr = child.stderr.take();
                let collect = async {
                    let mut tail = StderrTail::default();
                    if let Some(stderr) = stderr {
                        // Raw bytes: the pipe must stay open until EOF even
                        // when the tool prints file names that are not UTF-8.
                        let mut reader = BufReader::new(stderr);
                        let mut buf = Vec::new();
                        loop {
                            buf.clear();
                            match reader.read_until(b'\n', &mut buf).await {
                                Ok(0) => break,
                                Ok(_) => tail.push_bytes(&buf),
                                Err(e) => {
                                    warn!(job = %self.batch.label(), error = %e, "Reading stderr failed");
                                    break;
                                }
                            }
                        }
                    }
                    tail
                };
                let (tail, status) = tokio::join!(collect, child.wait());

                match status {
                    Ok(status) if status.success() => {
                        self.advance(JobState::Succeeded);
                    }
                    Ok(status) => self.fail(JobError::Exit {
                        code: status.code(),
                        stderr: tail.into_string(),
                    }),
                    Err(e) => self.fail(JobError::Exit {
                        code: None,
                        stderr: format!("failed waiting for process: {e}"),
                    }),
                }
            }
            Err(source) => self.fail(JobError::Start {
                command: tool.program_name(),
                source,
            }),
        }

        let mut report = JobReport::for_batch(&self.batch, self.state, self.error.take());
        report.elapsed_ms = clock.elapsed().as_millis() as u64;
        report
    }
}

/// Last few kilobytes of a process's standard error.
#[derive(Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_bytes(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        self.push(String::from_utf8_lossy(raw).into_owned());
    }

    fn push(&mut self, mut line: String) {
        if line.len() > STDERR_TAIL_BYTES {
            let mut cut = line.len() - STDERR_TAIL_BYTES;
            while !line.is_char_boundary(cut) {
                cut += 1;
            }
            line.drain(..cut);
        }
        self.bytes += line.len() + 1;
        self.lines.push_back(line);
        while self.bytes > STDERR_TAIL_BYTES && self.lines.len() > 1 {
            if let Some(dropped) = self.lines.pop_front() {
                self.bytes -= dropped.len() + 1;
            }
        }
    }

    fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
