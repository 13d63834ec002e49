//! Archive naming: `{date}.{host}.metadata` and `{date}.{host}.{user}.maildir`
//! grouped into backup sets.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

const METADATA_SUFFIX: &str = ".metadata";
const MAILDIR_SUFFIX: &str = ".maildir";

/// All archives sharing one `{date}.{host}` base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSet {
    pub base: String,
    pub date: NaiveDate,
    pub host: String,
    /// Users with a `.maildir` archive, in name order.
    pub users: Vec<String>,
    pub has_metadata: bool,
}

/// Split a base name `YYYY-MM-DD.host` into its date and host.
pub fn parse_base(base: &str) -> Option<(NaiveDate, String)> {
    let (date, host) = base.split_once('.')?;
    if host.is_empty() || host.contains('.') {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((date, host.to_string()))
}

/// Group archive names into backup sets, newest first.
///
/// Names that do not follow the naming scheme are ignored.
pub fn group_backup_sets<'a, I>(names: I) -> Vec<BackupSet>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sets: BTreeMap<String, BackupSet> = BTreeMap::new();

    for name in names {
        let (base, user) = if let Some(base) = name.strip_suffix(METADATA_SUFFIX) {
            (base, None)
        } else if let Some(rest) = name.strip_suffix(MAILDIR_SUFFIX) {
            match rest.rsplit_once('.') {
                Some((base, user)) if !user.is_empty() => (base, Some(user)),
                _ => continue,
            }
        } else {
            continue;
        };

        let Some((date, host)) = parse_base(base) else {
            continue;
        };
        let set = sets.entry(base.to_string()).or_insert_with(|| BackupSet {
            base: base.to_string(),
            date,
            host,
            users: Vec::new(),
            has_metadata: false,
        });
        match user {
            Some(user) => {
                if !set.users.iter().any(|u| u == user) {
                    set.users.push(user.to_string());
                }
            }
            None => set.has_metadata = true,
        }
    }

    let mut sets: Vec<BackupSet> = sets.into_values().collect();
    for set in &mut sets {
        set.users.sort();
    }
    sets.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.host.cmp(&b.host)));
    sets
}
