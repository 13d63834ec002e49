//! Index querying utilities.

use serde::Serialize;

use super::builder::MetadataIndex;

/// File count and size of one mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct MailboxSummary {
    pub name: String,
    pub files: usize,
    /// Files under `cur/`, `new/` or `tmp/`.
    pub messages: usize,
    pub size: u64,
}

/// Per-user totals with a breakdown by mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub files: usize,
    pub size: u64,
    pub mailboxes: Vec<MailboxSummary>,
}

impl MetadataIndex {
    /// Every restorable file, in (user, mailbox, listing) order.
    ///
    /// Directory entries (trailing `/`) are never returned.
    pub fn files(&self) -> Vec<&str> {
        self.file_sizes().into_iter().map(|(name, _)| name).collect()
    }

    /// Restorable files together with their listed sizes.
    pub fn file_sizes(&self) -> Vec<(&str, u64)> {
        self.users
            .values()
            .flat_map(|user| user.mailboxes.values())
            .flat_map(|mailbox| mailbox.files.iter())
            .filter(|file| !file.name.ends_with('/'))
            .map(|file| (file.name.as_str(), file.size))
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.users.values().map(|u| u.file_count()).sum()
    }

    /// Total listed bytes of all retained files.
    pub fn total_size(&self) -> u64 {
        self.users.values().map(|u| u.size()).sum()
    }

    /// Totals per user and mailbox, sorted by name.
    pub fn user_summaries(&self) -> Vec<UserSummary> {
        self.users
            .values()
            .map(|user| UserSummary {
                name: user.name.clone(),
                files: user.file_count(),
                size: user.size(),
                mailboxes: user
                    .mailboxes
                    .values()
                    .map(|m| MailboxSummary {
                        name: m.name.clone(),
                        files: m.files.len(),
                        messages: m.message_count(),
                        size: m.size(),
                    })
                    .collect(),
            })
            .collect()
    }
}
