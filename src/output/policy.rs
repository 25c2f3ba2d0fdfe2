//! Redownload and conflict resolution policy
//!
//! Both policies are pure decision tables. The redownload policy decides
//! whether to fetch a remote file that already exists locally; the conflict
//! policy decides what happens when local and remote state disagree. Keeping
//! them free of IO makes the full matrix testable without a filesystem.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// When to fetch a remote file whose output path already exists locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Redownload {
    /// Never refetch an existing file
    Never,
    /// Refetch only when the heuristics say the local file is stale.
    /// Inconclusive heuristics mean no refetch.
    NeverSmart,
    /// Always refetch
    Always,
    /// Refetch unless the heuristics say the local file is current.
    /// Inconclusive heuristics mean refetch.
    AlwaysSmart,
}

impl Default for Redownload {
    fn default() -> Self {
        Redownload::NeverSmart
    }
}

impl FromStr for Redownload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Redownload::Never),
            "never-smart" => Ok(Redownload::NeverSmart),
            "always" => Ok(Redownload::Always),
            "always-smart" => Ok(Redownload::AlwaysSmart),
            _ => Err(format!("unknown redownload policy {s:?}")),
        }
    }
}

impl fmt::Display for Redownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Redownload::Never => "never",
            Redownload::NeverSmart => "never-smart",
            Redownload::Always => "always",
            Redownload::AlwaysSmart => "always-smart",
        };
        write!(f, "{name}")
    }
}

/// How to resolve disagreements between local and remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnConflict {
    /// Ask the user about every conflict
    Prompt,
    /// Local files win, nothing is overwritten or deleted
    LocalFirst,
    /// Remote wins, local files are overwritten and orphans deleted
    RemoteFirst,
    /// Remote content wins but orphans are kept
    NoDelete,
    /// Like `NoDelete`, but overwrites still ask first
    NoDeletePromptOverwrite,
}

impl Default for OnConflict {
    fn default() -> Self {
        OnConflict::Prompt
    }
}

impl FromStr for OnConflict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(OnConflict::Prompt),
            "local-first" => Ok(OnConflict::LocalFirst),
            "remote-first" => Ok(OnConflict::RemoteFirst),
            "no-delete" => Ok(OnConflict::NoDelete),
            "no-delete-prompt-overwrite" => Ok(OnConflict::NoDeletePromptOverwrite),
            _ => Err(format!("unknown conflict policy {s:?}")),
        }
    }
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OnConflict::Prompt => "prompt",
            OnConflict::LocalFirst => "local-first",
            OnConflict::RemoteFirst => "remote-first",
            OnConflict::NoDelete => "no-delete",
            OnConflict::NoDeletePromptOverwrite => "no-delete-prompt-overwrite",
        };
        write!(f, "{name}")
    }
}

/// The kind of disagreement that needs resolving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A remote file's output path exists locally but was not written by us
    NewRemote,
    /// A remote file changed and its local copy would be overwritten
    ChangedRemote,
    /// A local file exists that no remote entry claimed this run
    RemovedLocalOnly,
    /// A file where a directory is needed, or a directory where a file is
    NewRemoteType,
}

/// The outcome of the conflict table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remote wins: overwrite or delete the local side
    Remote,
    /// Local wins: leave the local side alone
    Local,
    /// Ask the user, with this answer meaning "remote wins" when empty
    Ask { default: bool },
}

/// Decides how a conflict of the given kind is resolved under a policy.
///
/// For [`ConflictKind::RemovedLocalOnly`] "remote wins" means deleting the
/// orphan; for everything else it means overwriting the local file.
pub fn resolve(kind: ConflictKind, mode: OnConflict) -> Resolution {
    use ConflictKind::*;
    use OnConflict::*;

    match (mode, kind) {
        (Prompt, NewRemote | ChangedRemote) => Resolution::Ask { default: true },
        (Prompt, RemovedLocalOnly) => Resolution::Ask { default: false },
        (Prompt, NewRemoteType) => Resolution::Ask { default: false },

        (LocalFirst, _) => Resolution::Local,

        (RemoteFirst, _) => Resolution::Remote,

        (NoDelete, NewRemote | ChangedRemote) => Resolution::Remote,
        (NoDelete, RemovedLocalOnly) => Resolution::Local,
        (NoDelete, NewRemoteType) => Resolution::Local,

        (NoDeletePromptOverwrite, NewRemote | ChangedRemote) => Resolution::Ask { default: true },
        (NoDeletePromptOverwrite, RemovedLocalOnly) => Resolution::Local,
        (NoDeletePromptOverwrite, NewRemoteType) => Resolution::Ask { default: false },
    }
}

/// Remote metadata available to the redownload heuristics
#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristics {
    pub mtime: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

/// Local metadata the heuristics compare against
#[derive(Debug, Clone, Copy)]
pub struct LocalFile {
    pub mtime: Option<DateTime<Utc>>,
    pub size: u64,
}

/// Decides whether an existing local file should be fetched again.
///
/// The modification time is the primary signal: a remote mtime newer than the
/// local one means stale, an older or equal one means current. The size is
/// only consulted when no mtime comparison is possible, and only a size
/// difference is conclusive (equal sizes say nothing about content).
pub fn should_download(policy: Redownload, local: &LocalFile, remote: &Heuristics) -> bool {
    match policy {
        Redownload::Never => false,
        Redownload::Always => true,
        Redownload::NeverSmart => matches!(compare(local, remote), Some(Freshness::Stale)),
        Redownload::AlwaysSmart => !matches!(compare(local, remote), Some(Freshness::Current)),
    }
}

enum Freshness {
    Current,
    Stale,
}

fn compare(local: &LocalFile, remote: &Heuristics) -> Option<Freshness> {
    if let (Some(local_mtime), Some(remote_mtime)) = (local.mtime, remote.mtime) {
        return if remote_mtime > local_mtime {
            Some(Freshness::Stale)
        } else {
            Some(Freshness::Current)
        };
    }

    if let Some(remote_size) = remote.size {
        if remote_size != local.size {
            return Some(Freshness::Stale);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn local(mtime: Option<i64>, size: u64) -> LocalFile {
        LocalFile {
            mtime: mtime.map(at),
            size,
        }
    }

    fn remote(mtime: Option<i64>, size: Option<u64>) -> Heuristics {
        Heuristics {
            mtime: mtime.map(at),
            size,
        }
    }

    #[test]
    fn test_never_and_always_ignore_heuristics() {
        let l = local(Some(10), 5);
        let newer = remote(Some(20), Some(99));
        assert!(!should_download(Redownload::Never, &l, &newer));
        assert!(should_download(Redownload::Always, &l, &remote(None, None)));
    }

    #[test]
    fn test_smart_uses_mtime_first() {
        let l = local(Some(10), 5);
        assert!(should_download(
            Redownload::NeverSmart,
            &l,
            &remote(Some(20), None)
        ));
        assert!(!should_download(
            Redownload::NeverSmart,
            &l,
            &remote(Some(10), None)
        ));
        assert!(!should_download(
            Redownload::AlwaysSmart,
            &l,
            &remote(Some(5), None)
        ));
    }

    #[test]
    fn test_mtime_overrides_size() {
        // Equal mtimes mean current even though sizes differ
        let l = local(Some(10), 5);
        assert!(!should_download(
            Redownload::NeverSmart,
            &l,
            &remote(Some(10), Some(99))
        ));
    }

    #[test]
    fn test_size_only_when_no_mtime() {
        let l = local(None, 5);
        assert!(should_download(
            Redownload::NeverSmart,
            &l,
            &remote(None, Some(6))
        ));
        // Equal sizes are inconclusive
        assert!(!should_download(
            Redownload::NeverSmart,
            &l,
            &remote(None, Some(5))
        ));
        assert!(should_download(
            Redownload::AlwaysSmart,
            &l,
            &remote(None, Some(5))
        ));
    }

    #[test]
    fn test_inconclusive_falls_to_policy_side() {
        let l = local(None, 5);
        let nothing = remote(None, None);
        assert!(!should_download(Redownload::NeverSmart, &l, &nothing));
        assert!(should_download(Redownload::AlwaysSmart, &l, &nothing));
    }

    #[test]
    fn test_prompt_defaults() {
        assert_eq!(
            resolve(ConflictKind::NewRemote, OnConflict::Prompt),
            Resolution::Ask { default: true }
        );
        assert_eq!(
            resolve(ConflictKind::ChangedRemote, OnConflict::Prompt),
            Resolution::Ask { default: true }
        );
        assert_eq!(
            resolve(ConflictKind::RemovedLocalOnly, OnConflict::Prompt),
            Resolution::Ask { default: false }
        );
        assert_eq!(
            resolve(ConflictKind::NewRemoteType, OnConflict::Prompt),
            Resolution::Ask { default: false }
        );
    }

    #[test]
    fn test_local_first_never_touches_local_state() {
        for kind in [
            ConflictKind::NewRemote,
            ConflictKind::ChangedRemote,
            ConflictKind::RemovedLocalOnly,
            ConflictKind::NewRemoteType,
        ] {
            assert_eq!(resolve(kind, OnConflict::LocalFirst), Resolution::Local);
        }
    }

    #[test]
    fn test_remote_first_always_wins() {
        for kind in [
            ConflictKind::NewRemote,
            ConflictKind::ChangedRemote,
            ConflictKind::RemovedLocalOnly,
            ConflictKind::NewRemoteType,
        ] {
            assert_eq!(resolve(kind, OnConflict::RemoteFirst), Resolution::Remote);
        }
    }

    #[test]
    fn test_no_delete_keeps_orphans_but_overwrites() {
        assert_eq!(
            resolve(ConflictKind::ChangedRemote, OnConflict::NoDelete),
            Resolution::Remote
        );
        assert_eq!(
            resolve(ConflictKind::RemovedLocalOnly, OnConflict::NoDelete),
            Resolution::Local
        );
    }

    #[test]
    fn test_no_delete_prompt_overwrite() {
        assert_eq!(
            resolve(ConflictKind::NewRemote, OnConflict::NoDeletePromptOverwrite),
            Resolution::Ask { default: true }
        );
        assert_eq!(
            resolve(
                ConflictKind::RemovedLocalOnly,
                OnConflict::NoDeletePromptOverwrite
            ),
            Resolution::Local
        );
    }

    #[test]
    fn test_policy_names_parse() {
        assert_eq!("never-smart".parse(), Ok(Redownload::NeverSmart));
        assert_eq!("prompt".parse(), Ok(OnConflict::Prompt));
        assert_eq!(
            "no-delete-prompt-overwrite".parse(),
            Ok(OnConflict::NoDeletePromptOverwrite)
        );
        assert!("sometimes".parse::<Redownload>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Redownload::default(), Redownload::NeverSmart);
        assert_eq!(OnConflict::default(), OnConflict::Prompt);
    }
}
