//! Index construction from listing entries.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::config::Filters;
use crate::error::{RestoreError, Result};
use crate::model::maildir::User;
use crate::parser::classify::{MaildirClassifier, PathClass, PathClassifier};
use crate::parser::listing::{ListingEntry, ListingFormat, ListingParser};

/// In-memory model of one backup set: users, their mailboxes, and the
/// files of each mailbox that passed the filters.
///
/// Built once per run and read-only afterwards.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    pub(crate) archive: String,
    pub(crate) users: BTreeMap<String, User>,
    pub(crate) filters: Filters,
}

impl MetadataIndex {
    /// Build an index with the standard Maildir classifier.
    pub fn build<I>(archive: &str, entries: I, filters: &Filters) -> Result<Self>
    where
        I: IntoIterator<Item = ListingEntry>,
    {
        Self::build_with(MaildirClassifier::new(), archive, entries, filters)
    }

    /// Build an index using a custom path classifier.
    pub fn build_with<C, I>(classifier: C, archive: &str, entries: I, filters: &Filters) -> Result<Self>
    where
        C: PathClassifier,
        I: IntoIterator<Item = ListingEntry>,
    {
        let mut builder = IndexBuilder::with_classifier(classifier, archive, filters);
        for entry in entries {
            builder.add(entry)?;
        }
        Ok(builder.finish())
    }

    /// Parse raw listing text of the given `format`, then build.
    ///
    /// A line that does not fit the format aborts with a parse error.
    pub fn from_lines(
        archive: &str,
        text: &str,
        format: ListingFormat,
        filters: &Filters,
    ) -> Result<Self> {
        let entries = ListingParser::new().parse_all(format, text)?;
        Self::build(archive, entries, filters)
    }

    /// Base name of the backup set (`2025-01-15.mail`).
    pub fn archive(&self) -> &str {
        &self.archive
    }

    /// Users in name order.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }
}

/// Incremental index construction, used when entries arrive from several
/// listing files.
pub struct IndexBuilder<C = MaildirClassifier> {
    classifier: C,
    index: MetadataIndex,
    skip_logged: HashSet<String>,
}

impl IndexBuilder<MaildirClassifier> {
    pub fn new(archive: &str, filters: &Filters) -> Self {
        Self::with_classifier(MaildirClassifier::new(), archive, filters)
    }
}

impl<C: PathClassifier> IndexBuilder<C> {
    pub fn with_classifier(classifier: C, archive: &str, filters: &Filters) -> Self {
        Self {
            classifier,
            index: MetadataIndex {
                archive: archive.to_string(),
                users: BTreeMap::new(),
                filters: filters.clone(),
            },
            skip_logged: HashSet::new(),
        }
    }

    /// Classify one entry and record it if the filters admit it.
    pub fn add(&mut self, entry: ListingEntry) -> Result<()> {
        let class = self.classifier.classify(&entry.path)?;

        let (user, mailbox) = match class {
            PathClass::Ignore => return Ok(()),
            PathClass::UserRoot { user } => (user, None),
            PathClass::MailboxFile {
                user,
                mailbox,
                is_message,
            } => (user, Some((mailbox, is_message))),
        };

        if let Some(owner) = entry.owner.as_deref() {
            if owner != user {
                return Err(RestoreError::parse(
                    &entry.path,
                    format!("unexpected user '{user}' in listing of '{owner}'"),
                ));
            }
        }

        if !self.index.filters.user_matches(&user) {
            return Ok(());
        }

        let user_entry = self
            .index
            .users
            .entry(user.clone())
            .or_insert_with(|| User::new(&user));

        let Some((mailbox, is_message)) = mailbox else {
            return Ok(());
        };

        if !self.index.filters.mailbox_matches(&mailbox) {
            if self.skip_logged.insert(mailbox.clone()) {
                info!(mailbox = %mailbox, "Skipping filtered mailbox");
            }
            return Ok(());
        }

        debug!(user = %user, mailbox = %mailbox, is_message, path = %entry.path, "add");
        user_entry
            .mailbox_mut(&mailbox)
            .add_file(entry.path, entry.size.unwrap_or(0), is_message);
        Ok(())
    }

    pub fn finish(self) -> MetadataIndex {
        self.index
    }
}
