//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILDIR_RESTORE_CONFIG` (environment variable)
//! 2. `~/.config/maildir-restore/config.toml` (Linux/macOS)
//!    `%APPDATA%\maildir-restore\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags are applied on top by the binary. The resulting
//! [`Config`] is built once and handed by reference to every component.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, Result};

/// Traditional argument ceiling for a single tool invocation.
pub const DEFAULT_COMMAND_LENGTH_LIMIT: usize = 32767;

/// Default number of restore subprocesses running at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// How to invoke the backup tool.
    pub tarsnap: TarsnapConfig,
    /// Restore planning and execution.
    pub restore: RestoreConfig,
    /// User and mailbox selection.
    pub filter: FilterConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Backup tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TarsnapConfig {
    /// Program to run.
    pub command: PathBuf,
    /// Key file passed with `--keyfile`.
    pub keyfile: Option<PathBuf>,
    /// Arguments inserted right after the program name on every restore.
    pub extra_args: Vec<String>,
}

/// Restore planning and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Destination directory handed to the tool with `-C`.
    pub output_dir: PathBuf,
    /// Preloaded metadata directory; extracted from the archive when unset.
    pub metadata_dir: Option<PathBuf>,
    /// Maximum number of restore subprocesses alive at once.
    pub concurrency: usize,
    /// Byte budget for the file arguments of one invocation.
    pub command_length_limit: usize,
    /// Show the progress bar while restoring.
    pub progress: bool,
    /// Milliseconds between destination polls.
    pub progress_interval_ms: u64,
    /// Stop starting new jobs after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Plan only, never start a subprocess.
    pub dry_run: bool,
}

/// User and mailbox selection patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regex matched against the plain user name.
    pub user: String,
    /// Regex matched against the normalized mailbox name (`INBOX`, `Sent`, ...).
    pub mailbox: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for TarsnapConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("tarsnap"),
            keyfile: None,
            extra_args: Vec::new(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./restore"),
            metadata_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            command_length_limit: DEFAULT_COMMAND_LENGTH_LIMIT,
            progress: true,
            progress_interval_ms: 1000,
            timeout_secs: None,
            dry_run: false,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            user: ".*".to_string(),
            mailbox: ".*".to_string(),
        }
    }
}

impl Config {
    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.restore.concurrency == 0 {
            return Err(RestoreError::Config(
                "restore.concurrency must be at least 1".to_string(),
            ));
        }
        if self.restore.progress_interval_ms == 0 {
            return Err(RestoreError::Config(
                "restore.progress_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.restore.command_length_limit == 0 {
            return Err(RestoreError::Config(
                "restore.command_length_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The key file, required whenever the tool is invoked.
    pub fn keyfile(&self) -> Result<&Path> {
        self.tarsnap
            .keyfile
            .as_deref()
            .ok_or_else(|| RestoreError::Config("no tarsnap key file configured".to_string()))
    }
}

// ── Filters ─────────────────────────────────────────────────────

/// Compiled user and mailbox filters.
#[derive(Debug, Clone)]
pub struct Filters {
    user: Regex,
    mailbox: Regex,
}

impl Filters {
    /// Compile the configured patterns.
    pub fn compile(config: &FilterConfig) -> Result<Self> {
        let user = Regex::new(&config.user).map_err(|source| RestoreError::InvalidPattern {
            field: "user",
            source,
        })?;
        let mailbox =
            Regex::new(&config.mailbox).map_err(|source| RestoreError::InvalidPattern {
                field: "mailbox",
                source,
            })?;
        Ok(Self { user, mailbox })
    }

    /// Filters that admit everything.
    pub fn match_all() -> Self {
        Self::compile(&FilterConfig::default()).expect("default patterns are valid")
    }

    pub fn user_matches(&self, user: &str) -> bool {
        self.user.is_match(user)
    }

    pub fn mailbox_matches(&self, mailbox: &str) -> bool {
        self.mailbox.is_match(mailbox)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration from `explicit` or the standard locations.
///
/// A missing file yields the defaults. An explicitly named file that cannot
/// be read or parsed is an error; a broken file in the standard location is
/// logged and ignored.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let contents =
            std::fs::read_to_string(path).map_err(|e| RestoreError::io(path, e))?;
        let cfg = toml::from_str::<Config>(&contents).map_err(|e| {
            RestoreError::Config(format!("{}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(cfg);
    }

    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return Ok(cfg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Ok(Config::default())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILDIR_RESTORE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("maildir-restore").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maildir-restore")
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
