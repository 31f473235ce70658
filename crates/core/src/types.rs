//! Metadata model: the per-file record tracked by the engine.
//!
//! Metadata comparison is how change detection stays cheap: two sides
//! compare `(hash, size, modified_time)` instead of file contents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Where a file sits in the synchronization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Up to date on all replicas.
    Synced,
    /// Changed locally, needs sync.
    Modified,
    /// A sync operation is in progress.
    Syncing,
    /// Competing versions exist.
    Conflict,
    /// Deleted; the record is retained as a tombstone.
    Deleted,
}

impl SyncState {
    /// Wire byte for this state.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Synced => 0,
            Self::Modified => 1,
            Self::Syncing => 2,
            Self::Conflict => 3,
            Self::Deleted => 4,
        }
    }

    /// Parse a wire byte back into a state.
    ///
    /// # Errors
    /// Returns a decode error for bytes outside 0..=4.
    pub fn from_u8(value: u8) -> Result<Self, SyncError> {
        match value {
            0 => Ok(Self::Synced),
            1 => Ok(Self::Modified),
            2 => Ok(Self::Syncing),
            3 => Ok(Self::Conflict),
            4 => Ok(Self::Deleted),
            other => Err(SyncError::Decode(format!("unknown sync state byte {other}"))),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Synced => "SYNCED",
            Self::Modified => "MODIFIED",
            Self::Syncing => "SYNCING",
            Self::Conflict => "CONFLICT",
            Self::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

impl FromStr for SyncState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYNCED" => Ok(Self::Synced),
            "MODIFIED" => Ok(Self::Modified),
            "SYNCING" => Ok(Self::Syncing),
            "CONFLICT" => Ok(Self::Conflict),
            "DELETED" => Ok(Self::Deleted),
            other => Err(SyncError::InvalidInput(format!("unknown sync state: {other}"))),
        }
    }
}

/// One physical copy of a logical file on a particular device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    /// Device identity, e.g. `laptop-1`.
    pub replica_id: String,
    /// Starts at 1 on the first write by a replica, +1 per successful write.
    pub version: u32,
    /// Last modification on that replica, Unix epoch seconds.
    pub modified_time: i64,
}

impl ReplicaInfo {
    #[must_use]
    pub fn new(replica_id: impl Into<String>, version: u32, modified_time: i64) -> Self {
        Self {
            replica_id: replica_id.into(),
            version,
            modified_time,
        }
    }
}

/// The canonical per-file record, keyed by logical path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Logical POSIX-style path, unique across the store.
    pub file_path: String,
    /// Hex digest of the file contents.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification, Unix epoch seconds.
    pub modified_time: i64,
    /// Creation time, Unix epoch seconds.
    pub created_time: i64,
    pub sync_state: SyncState,
    /// At most one entry per `replica_id`.
    pub replicas: Vec<ReplicaInfo>,
}

impl FileMetadata {
    /// Empty record for the given path, state `Synced`.
    #[must_use]
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            hash: String::new(),
            size: 0,
            modified_time: 0,
            created_time: 0,
            sync_state: SyncState::Synced,
            replicas: Vec::new(),
        }
    }

    /// Whether this record was modified after `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.modified_time > other.modified_time
    }

    /// Whether the replicas disagree on the version number.
    #[must_use]
    pub fn has_conflict(&self) -> bool {
        match self.replicas.split_first() {
            Some((first, rest)) => rest.iter().any(|r| r.version != first.version),
            None => false,
        }
    }

    /// The replica with the most recent modification time, if any.
    #[must_use]
    pub fn latest_replica(&self) -> Option<&ReplicaInfo> {
        self.replicas.iter().max_by_key(|r| r.modified_time)
    }

    /// Look up the entry for a specific replica.
    #[must_use]
    pub fn replica(&self, replica_id: &str) -> Option<&ReplicaInfo> {
        self.replicas.iter().find(|r| r.replica_id == replica_id)
    }

    /// Insert or overwrite the entry for `replica_id`.
    pub fn update_replica(&mut self, replica_id: &str, version: u32, modified_time: i64) {
        if let Some(existing) = self.replicas.iter_mut().find(|r| r.replica_id == replica_id) {
            existing.version = version;
            existing.modified_time = modified_time;
            return;
        }
        self.replicas
            .push(ReplicaInfo::new(replica_id, version, modified_time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, mtime: i64) -> FileMetadata {
        let mut m = FileMetadata::new(path);
        m.modified_time = mtime;
        m
    }

    #[test]
    fn sync_state_round_trips_through_strings_and_bytes() {
        for state in [
            SyncState::Synced,
            SyncState::Modified,
            SyncState::Syncing,
            SyncState::Conflict,
            SyncState::Deleted,
        ] {
            assert_eq!(state.to_string().parse::<SyncState>().unwrap(), state);
            assert_eq!(SyncState::from_u8(state.as_u8()).unwrap(), state);
        }
        assert!(SyncState::from_u8(5).is_err());
        assert!("SHINY".parse::<SyncState>().is_err());
    }

    #[test]
    fn update_replica_keeps_one_entry_per_id() {
        let mut m = FileMetadata::new("/docs/a.txt");
        m.update_replica("laptop-1", 1, 100);
        m.update_replica("phone-1", 1, 90);
        m.update_replica("laptop-1", 2, 200);

        assert_eq!(m.replicas.len(), 2);
        let laptop = m.replica("laptop-1").unwrap();
        assert_eq!(laptop.version, 2);
        assert_eq!(laptop.modified_time, 200);
    }

    #[test]
    fn conflict_means_replicas_disagree() {
        let mut m = FileMetadata::new("/a");
        assert!(!m.has_conflict());
        m.update_replica("x", 3, 10);
        assert!(!m.has_conflict());
        m.update_replica("y", 3, 20);
        assert!(!m.has_conflict());
        m.update_replica("z", 2, 5);
        assert!(m.has_conflict());
    }

    #[test]
    fn latest_replica_by_mtime() {
        let mut m = FileMetadata::new("/a");
        m.update_replica("x", 1, 10);
        m.update_replica("y", 1, 30);
        m.update_replica("z", 1, 20);
        assert_eq!(m.latest_replica().unwrap().replica_id, "y");
    }

    #[test]
    fn newer_than_uses_modified_time() {
        assert!(record("/a", 20).is_newer_than(&record("/a", 10)));
        assert!(!record("/a", 10).is_newer_than(&record("/a", 10)));
    }
}
