//! Centralized error types for maildir-restore.

use std::path::PathBuf;

use thiserror::Error;

use crate::restore::summary::RestoreSummary;

/// All errors produced by the maildir-restore library.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid or inconsistent configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A user or mailbox filter is not a valid regular expression.
    #[error("Invalid {field} filter pattern: {source}")]
    InvalidPattern {
        field: &'static str,
        source: regex::Error,
    },

    /// A single file does not fit into the command length budget.
    #[error("Command length limit {limit} cannot hold '{path}' ({cost} bytes)")]
    LengthLimit {
        path: String,
        cost: usize,
        limit: usize,
    },

    /// A metadata listing line could not be understood.
    #[error("Parse error in line '{line}': {reason}")]
    Parse { line: String, reason: String },

    /// The backup tool failed while extracting metadata or listing archives.
    #[error("'{command}' failed ({}): {stderr}", describe_code(*code))]
    Tool {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Polling the restore destination failed.
    #[error("Progress polling failed on '{path}': {source}")]
    Progress {
        path: PathBuf,
        source: std::io::Error,
    },

    /// One or more restore jobs failed. Raised only once every job is terminal.
    #[error("{} of {} restore jobs failed", summary.failed, summary.total)]
    JobsFailed { summary: Box<RestoreSummary> },
}

/// Failure of a single restore job. Recorded on the job, never propagated
/// to sibling jobs.
#[derive(Error, Debug)]
pub enum JobError {
    /// The subprocess could not be launched.
    #[error("failed to start '{command}': {source}")]
    Start {
        command: String,
        source: std::io::Error,
    },

    /// The subprocess ran but exited unsuccessfully or was killed.
    #[error("exited with {}: {stderr}", describe_code(*code))]
    Exit { code: Option<i32>, stderr: String },

    /// The job was never launched because the run timed out first.
    #[error("not started: restore timed out")]
    NotStarted,
}

/// Convenience alias for `Result<T, RestoreError>`.
pub type Result<T> = std::result::Result<T, RestoreError>;

impl RestoreError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Parse` variant for a listing line.
    pub fn parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any subprocess is started.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidPattern { .. } | Self::LengthLimit { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `RestoreError::io`).
impl From<std::io::Error> for RestoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_error_message() {
        let err = JobError::Exit {
            code: Some(1),
            stderr: "tarsnap: Error opening archive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "exited with status 1: tarsnap: Error opening archive"
        );

        let killed = JobError::Exit {
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("killed by signal"));
    }

    #[test]
    fn test_config_classification() {
        assert!(RestoreError::Config("bad".into()).is_config());
        assert!(RestoreError::LengthLimit {
            path: "./a".into(),
            cost: 4,
            limit: 2
        }
        .is_config());
        assert!(!RestoreError::parse("x", "y").is_config());
    }
}
