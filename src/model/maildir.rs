//! The user → mailbox → file hierarchy reconstructed from a listing.

use std::collections::BTreeMap;

use serde::Serialize;

/// Name given to the top-level Maildir folder.
pub const INBOX: &str = "INBOX";

/// A stored file inside one mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxFile {
    /// Path as it appears in the archive (`./alice/Maildir/cur/123`).
    pub name: String,
    /// Size in bytes reported by the listing (0 when unknown).
    pub size: u64,
    /// Stored under `cur/`, `new/` or `tmp/` rather than at the folder root.
    pub is_message: bool,
}

/// One mail folder of a user.
///
/// Files are kept in listing order. A mailbox only exists once it holds a file.
#[derive(Debug, Clone, Serialize)]
pub struct Mailbox {
    pub name: String,
    pub files: Vec<MailboxFile>,
}

impl Mailbox {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, size: u64, is_message: bool) {
        self.files.push(MailboxFile {
            name: name.into(),
            size,
            is_message,
        });
    }

    /// Files holding messages, as opposed to index and state files.
    pub fn message_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_message).count()
    }

    /// Sum of the file sizes.
    pub fn size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// A user and their mailboxes, keyed and sorted by mailbox name.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub name: String,
    pub mailboxes: BTreeMap<String, Mailbox>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mailboxes: BTreeMap::new(),
        }
    }

    /// Get or create the mailbox called `name`.
    pub fn mailbox_mut(&mut self, name: &str) -> &mut Mailbox {
        self.mailboxes
            .entry(name.to_string())
            .or_insert_with(|| Mailbox::new(name))
    }

    pub fn file_count(&self) -> usize {
        self.mailboxes.values().map(|m| m.files.len()).sum()
    }

    pub fn size(&self) -> u64 {
        self.mailboxes.values().map(Mailbox::size).sum()
    }
}
