//! The metadata index: users, mailboxes and files selected for restore.

pub mod builder;
pub mod reader;

pub use builder::{IndexBuilder, MetadataIndex};
