//! Conflict resolution between two competing metadata records.

use driftsync_core::{FileMetadata, Result, SyncError};

use crate::events::ConflictStrategy;

/// Outcome of resolving one conflict.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    /// The winning record.
    pub resolved: FileMetadata,
    /// The losing record, kept for auditing or recovery.
    pub other: FileMetadata,
    pub strategy: ConflictStrategy,
    /// Set when a human still has to look at the result.
    pub requires_manual: bool,
}

/// Picks a winner between a local and a remote record.
#[derive(Debug, Default, Clone)]
pub struct ConflictResolver;

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve `local` vs `remote` under `strategy`.
    ///
    /// `LastWriteWins` always resolves: the higher `modified_time` wins,
    /// ties go to the lexicographically higher hash, and a full tie keeps
    /// `local`. The result is deterministic for any input pair.
    ///
    /// # Errors
    /// `Manual` returns [`SyncError::ManualResolutionRequired`]; `Merge` is
    /// declared but unimplemented and returns [`SyncError::Unsupported`].
    pub fn resolve(
        &self,
        local: &FileMetadata,
        remote: &FileMetadata,
        strategy: ConflictStrategy,
    ) -> Result<ConflictResolution> {
        match strategy {
            ConflictStrategy::LastWriteWins => {
                let local_wins = match local.modified_time.cmp(&remote.modified_time) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => local.hash >= remote.hash,
                };
                let (resolved, other) = if local_wins {
                    (local.clone(), remote.clone())
                } else {
                    (remote.clone(), local.clone())
                };
                Ok(ConflictResolution {
                    resolved,
                    other,
                    strategy,
                    requires_manual: false,
                })
            }
            ConflictStrategy::Manual => Err(SyncError::ManualResolutionRequired(
                local.file_path.clone(),
            )),
            ConflictStrategy::Merge => Err(SyncError::Unsupported(
                "merge conflict strategy is not implemented".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, hash: &str, mtime: i64) -> FileMetadata {
        let mut m = FileMetadata::new(path);
        m.hash = hash.to_string();
        m.modified_time = mtime;
        m
    }

    #[test]
    fn newer_record_wins() {
        let resolver = ConflictResolver::new();
        let local = record("/f", "aaa", 200);
        let remote = record("/f", "bbb", 100);

        let resolution = resolver
            .resolve(&local, &remote, ConflictStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolution.resolved, local);
        assert_eq!(resolution.other, remote);
        assert!(!resolution.requires_manual);

        let resolution = resolver
            .resolve(&remote, &local, ConflictStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolution.resolved, local);
    }

    #[test]
    fn mtime_tie_breaks_on_hash() {
        let resolver = ConflictResolver::new();
        let low = record("/f", "aaa", 100);
        let high = record("/f", "zzz", 100);

        let resolution = resolver
            .resolve(&low, &high, ConflictStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolution.resolved, high);
    }

    #[test]
    fn full_tie_keeps_local() {
        let resolver = ConflictResolver::new();
        let mut local = record("/f", "same", 100);
        local.update_replica("laptop-1", 1, 100);
        let mut remote = record("/f", "same", 100);
        remote.update_replica("phone-1", 1, 100);

        let resolution = resolver
            .resolve(&local, &remote, ConflictStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(resolution.resolved, local);
    }

    #[test]
    fn manual_strategy_asks_for_a_human() {
        let resolver = ConflictResolver::new();
        let err = resolver
            .resolve(
                &record("/f", "a", 1),
                &record("/f", "b", 2),
                ConflictStrategy::Manual,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::ManualResolutionRequired(path) if path == "/f"));
    }

    #[test]
    fn merge_strategy_is_unsupported() {
        let resolver = ConflictResolver::new();
        let err = resolver
            .resolve(
                &record("/f", "a", 1),
                &record("/f", "b", 2),
                ConflictStrategy::Merge,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Unsupported(_)));
    }
}
