//! Everything that talks to the backup tool or its stored metadata.

pub mod metadata;
pub mod name;
pub mod tool;
