//! Classification of archive paths into users, mailboxes, and stored files.
//!
//! All knowledge about the Maildir path layout lives here. The index only
//! talks to the [`PathClassifier`] trait, so the matching strategy can be
//! replaced without touching it.

use regex::Regex;

use crate::error::{RestoreError, Result};
use crate::model::maildir::INBOX;

/// Maildir state directories holding the actual messages.
const STATE_DIRS: [&str; 3] = ["cur", "new", "tmp"];

/// Leading marker of a hierarchical (non-INBOX) Maildir++ folder.
const FOLDER_MARKER: char = '.';

/// What a single listing path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// Root entry, control file, unrelated path, or a bare `cur`/`new`/`tmp`.
    Ignore,
    /// A directory owned by `user` that is not itself restorable content.
    UserRoot { user: String },
    /// A concrete file inside `mailbox`.
    MailboxFile {
        user: String,
        mailbox: String,
        /// Whether the file sits under `cur/`, `new/` or `tmp/`.
        is_message: bool,
    },
}

/// Turns a listing path into a [`PathClass`].
///
/// Implementations must return `Ok(PathClass::Ignore)` for anything they do
/// not recognise and reserve errors for paths that clearly belong to a user
/// but cannot be interpreted.
pub trait PathClassifier {
    fn classify(&self, path: &str) -> Result<PathClass>;
}

/// Regex-backed classifier for `./<user>/Maildir/...` listings.
#[derive(Debug, Clone)]
pub struct MaildirClassifier {
    user_pattern: Regex,
}

impl Default for MaildirClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MaildirClassifier {
    pub fn new() -> Self {
        Self {
            user_pattern: Regex::new(r"^\./([^/]+)/Maildir(?:/(.*))?$")
                .expect("valid user pattern"),
        }
    }
}

impl PathClassifier for MaildirClassifier {
    fn classify(&self, path: &str) -> Result<PathClass> {
        let Some(caps) = self.user_pattern.captures(path) else {
            return Ok(PathClass::Ignore);
        };
        let user = &caps[1];
        if user == "." || user == ".." {
            return Ok(PathClass::Ignore);
        }
        let user = user.to_string();

        let rest = caps.get(2).map_or("", |m| m.as_str());
        let is_dir = rest.ends_with('/');
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Ok(PathClass::UserRoot { user });
        }

        let segments: Vec<&str> = rest.split('/').collect();
        let first = segments[0];
        let (mailbox, tail) = if let Some(folder) = first.strip_prefix(FOLDER_MARKER) {
            if !is_valid_folder(folder) {
                return Err(RestoreError::parse(
                    path,
                    format!("unparseable mailbox segment '{first}'"),
                ));
            }
            (folder.to_string(), &segments[1..])
        } else if first.is_empty() {
            return Err(RestoreError::parse(path, "empty mailbox segment"));
        } else {
            (INBOX.to_string(), &segments[..])
        };

        let class = match tail {
            [] => PathClass::UserRoot { user },
            [state] if is_state_dir(state) => PathClass::Ignore,
            _ if is_dir => PathClass::UserRoot { user },
            [state, ..] if is_state_dir(state) => PathClass::MailboxFile {
                user,
                mailbox,
                is_message: true,
            },
            _ => PathClass::MailboxFile {
                user,
                mailbox,
                is_message: false,
            },
        };
        Ok(class)
    }
}

fn is_state_dir(segment: &str) -> bool {
    STATE_DIRS.contains(&segment)
}

/// Folder names are dot-separated components, none of them empty.
fn is_valid_folder(name: &str) -> bool {
    !name.is_empty() && name.split(FOLDER_MARKER).all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(path: &str) -> PathClass {
        MaildirClassifier::new().classify(path).unwrap()
    }

    fn file(user: &str, mailbox: &str, is_message: bool) -> PathClass {
        PathClass::MailboxFile {
            user: user.to_string(),
            mailbox: mailbox.to_string(),
            is_message,
        }
    }

    #[test]
    fn test_ignores_root_and_foreign_paths() {
        assert_eq!(classify("."), PathClass::Ignore);
        assert_eq!(classify("./"), PathClass::Ignore);
        assert_eq!(classify("./alice"), PathClass::Ignore);
        assert_eq!(classify("./alice/.profile"), PathClass::Ignore);
        assert_eq!(classify("etc/passwd"), PathClass::Ignore);
        assert_eq!(classify(""), PathClass::Ignore);
    }

    #[test]
    fn test_bare_state_dirs_are_ignored() {
        assert_eq!(classify("./alice/Maildir/cur"), PathClass::Ignore);
        assert_eq!(classify("./alice/Maildir/new/"), PathClass::Ignore);
        assert_eq!(classify("./alice/Maildir/.Sent/tmp"), PathClass::Ignore);
        assert_eq!(classify("./alice/Maildir/.Sent/cur/"), PathClass::Ignore);
    }

    #[test]
    fn test_user_roots() {
        let root = PathClass::UserRoot {
            user: "alice".to_string(),
        };
        assert_eq!(classify("./alice/Maildir"), root);
        assert_eq!(classify("./alice/Maildir/"), root);
        assert_eq!(classify("./alice/Maildir/.Sent"), root);
        assert_eq!(classify("./alice/Maildir/.Sent/"), root);
        assert_eq!(classify("./alice/Maildir/.Sent/cur/odd/"), root);
    }

    #[test]
    fn test_inbox_files() {
        assert_eq!(classify("./alice/Maildir/cur/1"), file("alice", "INBOX", true));
        assert_eq!(
            classify("./alice/Maildir/new/1700000000.M1.host"),
            file("alice", "INBOX", true)
        );
        assert_eq!(
            classify("./alice/Maildir/dovecot-uidlist"),
            file("alice", "INBOX", false)
        );
    }

    #[test]
    fn test_folder_files() {
        assert_eq!(
            classify("./alice/Maildir/.Sent/cur/12345"),
            file("alice", "Sent", true)
        );
        assert_eq!(
            classify("./bob/Maildir/.Lists.rust/tmp/9"),
            file("bob", "Lists.rust", true)
        );
        assert_eq!(
            classify("./bob/Maildir/.Drafts/maildirfolder"),
            file("bob", "Drafts", false)
        );
    }

    #[test]
    fn test_unparseable_mailbox_segment_is_an_error() {
        let classifier = MaildirClassifier::new();
        for path in [
            "./alice/Maildir/./cur/1",
            "./alice/Maildir/../cur/1",
            "./alice/Maildir//cur/1",
            "./alice/Maildir/.a..b/cur/1",
        ] {
            match classifier.classify(path) {
                Err(RestoreError::Parse { line, .. }) => assert_eq!(line, path),
                other => panic!("{path}: expected parse error, got {other:?}"),
            }
        }
    }
}
