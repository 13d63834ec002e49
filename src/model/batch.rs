//! Restore batches handed from the planner to the job pool.

use serde::Serialize;

/// A group of files from one (user, mailbox) pair restored by one
/// tool invocation. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreBatch {
    /// Per-user archive to read from (`{base}.{user}.maildir`).
    pub archive: String,
    pub user: String,
    pub mailbox: String,
    /// Archive paths, in listing order.
    pub files: Vec<String>,
    /// Sum of the listed file sizes in bytes.
    pub total_size: u64,
    /// Position in the plan, starting at 0. Used for labels only.
    pub sequence: usize,
}

impl RestoreBatch {
    /// Bytes the file arguments occupy on the command line
    /// (path length plus one separator per file).
    pub fn argument_length(&self) -> usize {
        self.files.iter().map(|f| f.len() + 1).sum()
    }

    /// Short human label: `#3 alice/Sent`.
    pub fn label(&self) -> String {
        format!("#{} {}/{}", self.sequence, self.user, self.mailbox)
    }
}

/// Archive holding the Maildir of `user` within the backup set `base`.
pub fn user_archive_name(base: &str, user: &str) -> String {
    format!("{base}.{user}.maildir")
}

/// Archive holding the listings for the backup set `base`.
pub fn metadata_archive_name(base: &str) -> String {
    format!("{base}.metadata")
}
