//! Parsing of the plain-text listings stored in the metadata archive.
//!
//! Three line shapes are understood:
//!
//! - **Paths**: one relative path per line, directories with a trailing `/`.
//! - **Sizes**: `du`-style `<blocks> <path> ...` lines, 512-byte blocks.
//! - **Details**: long-format lines, `<mode> <links> <owner> <group> <size>
//!   <date...> <path>`, where the path is everything from its leading `.`.

use regex::Regex;

use crate::error::{RestoreError, Result};

/// Block size used by size listings.
pub const BLOCK_SIZE: u64 = 512;

/// Shape of the lines in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFormat {
    Paths,
    Sizes,
    Details,
}

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Relative archive path (`./alice/Maildir/cur/1`).
    pub path: String,
    /// Size in bytes, when the listing carries one.
    pub size: Option<u64>,
    /// User named by the listing file this entry came from.
    pub owner: Option<String>,
}

impl ListingEntry {
    pub fn new(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// A metadata file recognised by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFile {
    pub owner: String,
    pub format: ListingFormat,
}

/// Line and file-name parser with its patterns compiled once.
#[derive(Debug, Clone)]
pub struct ListingParser {
    detail_line: Regex,
    size_line: Regex,
    file_name: Regex,
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingParser {
    pub fn new() -> Self {
        Self {
            detail_line: Regex::new(r"^(?:\S+\s+){4}(\d+)\s+[^.]+(\..+)$")
                .expect("valid detail pattern"),
            size_line: Regex::new(r"^(\d+)\s+(\S+)").expect("valid size pattern"),
            file_name: Regex::new(r"^\d{4}(?:-\d{2}){2}\.[^.]+\.([^.]+)\.(file_list|dir_list)$")
                .expect("valid file name pattern"),
        }
    }

    /// Parse one line. Blank lines yield `None`; lines that do not fit
    /// `format` are a parse error carrying the line.
    pub fn parse_line(&self, format: ListingFormat, line: &str) -> Result<Option<ListingEntry>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let entry = match format {
            ListingFormat::Paths => ListingEntry::new(line.trim(), None),
            ListingFormat::Sizes => {
                let caps = self
                    .size_line
                    .captures(line)
                    .ok_or_else(|| RestoreError::parse(line, "expected '<blocks> <path>'"))?;
                let blocks = parse_number(line, &caps[1])?;
                ListingEntry::new(&caps[2], Some(blocks.saturating_mul(BLOCK_SIZE)))
            }
            ListingFormat::Details => {
                let caps = self.detail_line.captures(line).ok_or_else(|| {
                    RestoreError::parse(line, "expected a long-format listing line")
                })?;
                let size = parse_number(line, &caps[1])?;
                ListingEntry::new(&caps[2], Some(size))
            }
        };
        Ok(Some(entry))
    }

    /// Parse every line of `text`, skipping blanks.
    pub fn parse_all(&self, format: ListingFormat, text: &str) -> Result<Vec<ListingEntry>> {
        let mut entries = Vec::new();
        for line in text.lines() {
            if let Some(entry) = self.parse_line(format, line)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Recognise `YYYY-MM-DD.<host>.<user>.file_list` / `.dir_list` names.
    pub fn listing_file(&self, file_name: &str) -> Option<ListingFile> {
        let caps = self.file_name.captures(file_name)?;
        let format = match &caps[2] {
            "file_list" => ListingFormat::Details,
            _ => ListingFormat::Sizes,
        };
        Some(ListingFile {
            owner: caps[1].to_string(),
            format,
        })
    }
}

fn parse_number(line: &str, digits: &str) -> Result<u64> {
    digits
        .parse::<u64>()
        .map_err(|e| RestoreError::parse(line, format!("bad size '{digits}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_line() {
        let parser = ListingParser::new();
        let entry = parser
            .parse_line(
                ListingFormat::Details,
                "-rw-------  1 alice  users  4242 Jan 15 03:12 ./alice/Maildir/cur/1700000000.M1:2,S",
            )
            .unwrap()
            .unwrap();
        assert_eq!(entry.path, "./alice/Maildir/cur/1700000000.M1:2,S");
        assert_eq!(entry.size, Some(4242));
        assert_eq!(entry.owner, None);
    }

    #[test]
    fn test_detail_line_directory() {
        let parser = ListingParser::new();
        let entry = parser
            .parse_line(
                ListingFormat::Details,
                "drwx------ 2 alice users 512 Jan 15 03:12 ./alice/Maildir/.Sent/",
            )
            .unwrap()
            .unwrap();
        assert_eq!(entry.path, "./alice/Maildir/.Sent/");
        assert_eq!(entry.size, Some(512));
    }

    #[test]
    fn test_detail_line_mismatch_is_parse_error() {
        let parser = ListingParser::new();
        let err = parser
            .parse_line(ListingFormat::Details, "garbage line")
            .unwrap_err();
        match err {
            RestoreError::Parse { line, .. } => assert_eq!(line, "garbage line"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_size_line() {
        let parser = ListingParser::new();
        let entry = parser
            .parse_line(ListingFormat::Sizes, "24\t./alice/Maildir/.Sent")
            .unwrap()
            .unwrap();
        assert_eq!(entry.path, "./alice/Maildir/.Sent");
        assert_eq!(entry.size, Some(24 * 512));
    }

    #[test]
    fn test_path_lines_and_blanks() {
        let parser = ListingParser::new();
        let entries = parser
            .parse_all(ListingFormat::Paths, "./alice/Maildir/\n\n./alice/Maildir/cur/1\r\n")
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "./alice/Maildir/cur/1");
        assert_eq!(entries[1].size, None);
    }

    #[test]
    fn test_listing_file_names() {
        let parser = ListingParser::new();
        assert_eq!(
            parser.listing_file("2025-01-15.mail.alice.file_list"),
            Some(ListingFile {
                owner: "alice".to_string(),
                format: ListingFormat::Details,
            })
        );
        assert_eq!(
            parser
                .listing_file("2025-01-15.mail.bob.dir_list")
                .map(|f| f.format),
            Some(ListingFormat::Sizes)
        );
        assert_eq!(parser.listing_file("README"), None);
        assert_eq!(parser.listing_file("2025-01-15.mail.alice.txt"), None);
    }
}
