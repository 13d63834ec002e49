//! `maildir-restore`: plan and run restores of sharded tarsnap Maildir backups.
//!
//! This crate provides the core library for reading a backup set's metadata
//! listings, selecting users and mailboxes, splitting the selected files
//! into command-length-bounded batches, and running those batches as
//! concurrent tool invocations with progress reporting.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod planner;
pub mod restore;
