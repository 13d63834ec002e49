//! Batch planning: split the indexed files into tool invocations that fit
//! the command length budget.

use tracing::debug;

use crate::error::{RestoreError, Result};
use crate::index::MetadataIndex;
use crate::model::batch::{user_archive_name, RestoreBatch};
use crate::model::maildir::Mailbox;

/// Bytes a file occupies on the command line: the path plus one separator.
pub fn argument_cost(path: &str) -> usize {
    path.len() + 1
}

/// Partition every (user, mailbox) of `index` into ordered batches whose
/// argument length stays within `length_limit`.
///
/// Users and mailboxes are visited in name order, files in listing order.
/// A batch never spans two mailboxes. Fails with a configuration error when
/// a single file cannot fit the budget on its own.
pub fn plan(index: &MetadataIndex, length_limit: usize) -> Result<Vec<RestoreBatch>> {
    if length_limit == 0 {
        return Err(RestoreError::Config(
            "command length limit must be positive".to_string(),
        ));
    }

    let mut batches = Vec::new();
    for user in index.users() {
        let archive = user_archive_name(index.archive(), &user.name);
        for mailbox in user.mailboxes.values() {
            plan_mailbox(&archive, &user.name, mailbox, length_limit, &mut batches)?;
        }
    }

    debug!(
        batches = batches.len(),
        limit = length_limit,
        "Restore plan ready"
    );
    Ok(batches)
}

fn plan_mailbox(
    archive: &str,
    user: &str,
    mailbox: &Mailbox,
    length_limit: usize,
    batches: &mut Vec<RestoreBatch>,
) -> Result<()> {
    let mut files: Vec<String> = Vec::new();
    let mut length = 0usize;
    let mut size = 0u64;

    for file in &mailbox.files {
        let cost = argument_cost(&file.name);
        if cost > length_limit {
            return Err(RestoreError::LengthLimit {
                path: file.name.clone(),
                cost,
                limit: length_limit,
            });
        }

        if length + cost > length_limit {
            push_batch(archive, user, &mailbox.name, &mut files, size, batches);
            length = 0;
            size = 0;
        }

        files.push(file.name.clone());
        length += cost;
        size += file.size;
    }

    if !files.is_empty() {
        push_batch(archive, user, &mailbox.name, &mut files, size, batches);
    }
    Ok(())
}

fn push_batch(
    archive: &str,
    user: &str,
    mailbox: &str,
    files: &mut Vec<String>,
    total_size: u64,
    batches: &mut Vec<RestoreBatch>,
) {
    let sequence = batches.len();
    batches.push(RestoreBatch {
        archive: archive.to_string(),
        user: user.to_string(),
        mailbox: mailbox.to_string(),
        files: std::mem::take(files),
        total_size,
        sequence,
    });
}

/// Totals of a plan, for reports.
pub fn plan_totals(batches: &[RestoreBatch]) -> (usize, u64) {
    batches
        .iter()
        .fold((0, 0), |(files, size), b| (files + b.files.len(), size + b.total_size))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::Filters;
    use crate::parser::listing::ListingEntry;

    fn index_of(paths: &[&str]) -> MetadataIndex {
        let entries = paths.iter().map(|p| ListingEntry::new(*p, Some(1)));
        MetadataIndex::build("set", entries, &Filters::match_all()).unwrap()
    }

    #[test]
    fn test_single_batch_when_limit_is_huge() {
        let index = index_of(&["./a/Maildir/cur/1", "./a/Maildir/cur/2"]);
        let batches = plan(&index, usize::MAX).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].archive, "set.a.maildir");
        assert_eq!(batches[0].total_size, 2);
    }

    #[test]
    fn test_batches_never_mix_mailboxes() {
        let index = index_of(&[
            "./a/Maildir/cur/1",
            "./a/Maildir/.Sent/cur/2",
            "./b/Maildir/cur/3",
        ]);
        let batches = plan(&index, usize::MAX).unwrap();
        let pairs: Vec<(&str, &str)> = batches
            .iter()
            .map(|b| (b.user.as_str(), b.mailbox.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "INBOX"), ("a", "Sent"), ("b", "INBOX")]);
        let sequences: Vec<usize> = batches.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_every_file_planned_exactly_once() {
        let paths: Vec<String> = (0..250)
            .map(|i| format!("./u{}/Maildir/cur/{i:05}", i % 3))
            .collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let index = index_of(&refs);
        let batches = plan(&index, 200).unwrap();

        let mut seen = HashSet::new();
        for batch in &batches {
            assert!(batch.argument_length() <= 200);
            for file in &batch.files {
                assert!(seen.insert(file.clone()), "duplicate {file}");
            }
        }
        let expected: HashSet<String> = index.files().into_iter().map(String::from).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_file_longer_than_limit_is_config_error() {
        let index = index_of(&["./a/Maildir/cur/1"]);
        let err = plan(&index, 10).unwrap_err();
        assert!(err.is_config());
        assert!(matches!(err, RestoreError::LengthLimit { cost: 18, .. }));
    }

    #[test]
    fn test_zero_limit_is_config_error() {
        let index = index_of(&[]);
        assert!(plan(&index, 0).unwrap_err().is_config());
    }

    #[test]
    fn test_plan_totals() {
        let index = index_of(&["./a/Maildir/cur/1", "./a/Maildir/.Sent/cur/2"]);
        let batches = plan(&index, usize::MAX).unwrap();
        assert_eq!(plan_totals(&batches), (2, 2));
    }
}
