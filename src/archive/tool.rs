//! Invocation of the external backup tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{expand_path, Config};
use crate::error::{RestoreError, Result};
use crate::model::batch::{metadata_archive_name, RestoreBatch};

/// How to run `tarsnap` (or a compatible program).
#[derive(Debug, Clone)]
pub struct ArchiveTool {
    program: PathBuf,
    keyfile: PathBuf,
    extra_args: Vec<String>,
}

impl ArchiveTool {
    pub fn new(program: impl Into<PathBuf>, keyfile: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            keyfile: keyfile.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed right after the program name on every invocation.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let keyfile = expand_path(config.keyfile()?);
        Ok(Self::new(expand_path(&config.tarsnap.command), keyfile)
            .with_extra_args(config.tarsnap.extra_args.clone()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Display name of the program for messages.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Full argument vector restoring `batch` into `dest`.
    pub fn restore_args(&self, batch: &RestoreBatch, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("-x"),
            OsString::from("--fast-read"),
            OsString::from("--keyfile"),
            self.keyfile.clone().into_os_string(),
            OsString::from("-f"),
            OsString::from(&batch.archive),
            OsString::from("-C"),
            dest.as_os_str().to_owned(),
        ]);
        args.extend(batch.files.iter().map(OsString::from));
        args
    }

    /// A ready-to-spawn restore command with stderr piped for diagnostics.
    pub fn restore_command(&self, batch: &RestoreBatch, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.restore_args(batch, dest))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// Extract the `{base}.metadata` archive into `dir`.
    pub async fn extract_metadata(&self, base: &str, dir: &Path) -> Result<()> {
        let archive = metadata_archive_name(base);
        info!(archive = %archive, dir = %dir.display(), "Extracting metadata");
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("-x"),
            OsString::from("--keyfile"),
            self.keyfile.clone().into_os_string(),
            OsString::from("-f"),
            OsString::from(archive),
            OsString::from("-C"),
            dir.as_os_str().to_owned(),
        ]);
        self.run_captured(args).await.map(|_| ())
    }

    /// Names of all archives stored under the key.
    pub async fn list_archives(&self) -> Result<Vec<String>> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("--list-archives"),
            OsString::from("--keyfile"),
            self.keyfile.clone().into_os_string(),
        ]);
        let stdout = self.run_captured(args).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Run to completion, returning stdout or a `Tool` error with stderr.
    async fn run_captured(&self, args: Vec<OsString>) -> Result<String> {
        debug!(program = %self.program.display(), ?args, "Running tool");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RestoreError::io(&self.program, e))?;

        if !output.status.success() {
            return Err(RestoreError::Tool {
                command: self.program_name(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
