//! Metadata parsing: listing lines and archive path classification.

pub mod classify;
pub mod listing;
