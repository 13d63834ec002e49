//! Loading the per-user listings of a backup set into a [`MetadataIndex`].

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};

use super::tool::ArchiveTool;
use crate::config::{expand_path, Config, Filters};
use crate::error::{RestoreError, Result};
use crate::index::{IndexBuilder, MetadataIndex};
use crate::parser::listing::ListingParser;

/// Directory holding the listings, either preloaded or freshly extracted.
///
/// An extracted directory is removed when this value is dropped.
pub struct MetadataDir {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl MetadataDir {
    pub fn preloaded(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _scratch: None,
        }
    }

    /// Use `restore.metadata_dir` when configured, otherwise extract the
    /// `{base}.metadata` archive into a scratch directory.
    pub async fn acquire(config: &Config, base: &str) -> Result<Self> {
        if let Some(dir) = &config.restore.metadata_dir {
            let dir = expand_path(dir);
            info!(dir = %dir.display(), "Using preloaded metadata");
            return Ok(Self::preloaded(dir));
        }

        let tool = ArchiveTool::from_config(config)?;
        let scratch = tempfile::Builder::new()
            .prefix("maildir-restore.metadata.")
            .tempdir()
            .map_err(|e| RestoreError::io(std::env::temp_dir(), e))?;
        tool.extract_metadata(base, scratch.path()).await?;
        Ok(Self {
            path: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every listing file in `dir` (in name order) into one index.
///
/// Listings of users rejected by the user filter are not read at all.
/// Files whose names are not recognised listings are skipped with a warning.
pub fn load_index(dir: &Path, archive: &str, filters: &Filters) -> Result<MetadataIndex> {
    let parser = ListingParser::new();
    let mut builder = IndexBuilder::new(archive, filters);

    let mut names: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| RestoreError::io(dir, e))? {
        let entry = entry.map_err(|e| RestoreError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| RestoreError::io(entry.path(), e))?;
        if file_type.is_file() {
            names.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    names.sort();

    for (name, path) in names {
        let Some(listing) = parser.listing_file(&name) else {
            warn!(file = %name, "Skipping unrecognised metadata file");
            continue;
        };
        if !filters.user_matches(&listing.owner) {
            info!(user = %listing.owner, "Skipping filtered user");
            continue;
        }

        info!(file = %name, "Reading metadata file");
        let text = std::fs::read_to_string(&path).map_err(|e| RestoreError::io(&path, e))?;
        for line in text.lines() {
            if let Some(entry) = parser.parse_line(listing.format, line)? {
                builder.add(entry.with_owner(&listing.owner))?;
            }
        }
    }

    let index = builder.finish();
    info!(
        users = index.users().count(),
        files = index.file_count(),
        "Metadata loaded"
    );
    Ok(index)
}
