//! Core data model: users, mailboxes, files, and restore batches.

pub mod batch;
pub mod maildir;
