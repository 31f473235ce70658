//! Event types for the synchronization engine.
//!
//! Events are past-tense records of things that happened. Each captures its
//! timestamp at construction and is passed to subscribers by reference;
//! anything a subscriber keeps must be cloned out.

pub mod bus;
pub mod queue;

pub use bus::{EventBus, SubscriptionId};
pub use queue::EventQueue;

use std::time::{Duration, SystemTime};

use driftsync_core::FileMetadata;

/// How a conflict between two competing records should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// The record with the higher modification time wins.
    LastWriteWins,
    /// A human decides.
    Manual,
    /// Three-way merge. Declared, not implemented.
    Merge,
}

/// A file's metadata entered the system for the first time.
#[derive(Debug, Clone)]
pub struct FileAdded {
    pub metadata: FileMetadata,
    /// Origin of the change: "sync", "watcher", ...
    pub source: String,
    pub timestamp: SystemTime,
}

impl FileAdded {
    #[must_use]
    pub fn new(metadata: FileMetadata, source: impl Into<String>) -> Self {
        Self {
            metadata,
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// An existing file's metadata changed.
#[derive(Debug, Clone)]
pub struct FileModified {
    pub file_path: String,
    pub old_hash: String,
    pub new_hash: String,
    pub old_size: u64,
    pub new_size: u64,
    pub source: String,
    pub timestamp: SystemTime,
}

impl FileModified {
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        old_hash: impl Into<String>,
        new_hash: impl Into<String>,
        old_size: u64,
        new_size: u64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            old_hash: old_hash.into(),
            new_hash: new_hash.into(),
            old_size,
            new_size,
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// A file's metadata was removed. Carries the last record for recovery.
#[derive(Debug, Clone)]
pub struct FileDeleted {
    pub file_path: String,
    pub last_metadata: FileMetadata,
    pub source: String,
    pub timestamp: SystemTime,
}

impl FileDeleted {
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        last_metadata: FileMetadata,
        source: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            last_metadata,
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// The server came up.
#[derive(Debug, Clone)]
pub struct ServerStarted {
    pub port: u16,
    pub timestamp: SystemTime,
}

impl ServerStarted {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timestamp: SystemTime::now(),
        }
    }
}

/// The server is going down.
#[derive(Debug, Clone)]
pub struct ServerShuttingDown {
    pub reason: String,
    pub timestamp: SystemTime,
}

impl ServerShuttingDown {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// A sync session opened.
#[derive(Debug, Clone)]
pub struct SyncStarted {
    pub client_id: String,
    /// Files tracked on the server at session start.
    pub file_count: usize,
    pub timestamp: SystemTime,
}

impl SyncStarted {
    #[must_use]
    pub fn new(client_id: impl Into<String>, file_count: usize) -> Self {
        Self {
            client_id: client_id.into(),
            file_count,
            timestamp: SystemTime::now(),
        }
    }
}

/// A sync session reached `Complete`.
#[derive(Debug, Clone)]
pub struct SyncCompleted {
    pub client_id: String,
    pub files_synced: usize,
    pub duration: Duration,
    pub timestamp: SystemTime,
}

impl SyncCompleted {
    #[must_use]
    pub fn new(client_id: impl Into<String>, files_synced: usize, duration: Duration) -> Self {
        Self {
            client_id: client_id.into(),
            files_synced,
            duration,
            timestamp: SystemTime::now(),
        }
    }
}

/// A sync session failed.
#[derive(Debug, Clone)]
pub struct SyncFailed {
    pub client_id: String,
    pub error: String,
    pub timestamp: SystemTime,
}

impl SyncFailed {
    #[must_use]
    pub fn new(client_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            error: error.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// First chunk for a file arrived.
#[derive(Debug, Clone)]
pub struct FileUploadStarted {
    pub session_id: String,
    pub file_path: String,
    /// Upper bound from `total_chunks * chunk_size`.
    pub total_bytes: u64,
    pub timestamp: SystemTime,
}

impl FileUploadStarted {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        file_path: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            total_bytes,
            timestamp: SystemTime::now(),
        }
    }
}

/// A chunk was verified and staged.
#[derive(Debug, Clone)]
pub struct FileChunkReceived {
    pub session_id: String,
    pub file_path: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub bytes_received: usize,
    pub timestamp: SystemTime,
}

impl FileChunkReceived {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        file_path: impl Into<String>,
        chunk_index: u32,
        total_chunks: u32,
        bytes_received: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            chunk_index,
            total_chunks,
            bytes_received,
            timestamp: SystemTime::now(),
        }
    }
}

/// A staged file was validated and promoted into the data root.
#[derive(Debug, Clone)]
pub struct FileUploadCompleted {
    pub session_id: String,
    pub file_path: String,
    pub hash: String,
    pub total_bytes: u64,
    pub duration: Duration,
    pub timestamp: SystemTime,
}

impl FileUploadCompleted {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        file_path: impl Into<String>,
        hash: impl Into<String>,
        total_bytes: u64,
        duration: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            hash: hash.into(),
            total_bytes,
            duration,
            timestamp: SystemTime::now(),
        }
    }
}

/// A server-side file was fully streamed to a client.
#[derive(Debug, Clone)]
pub struct FileDownloadCompleted {
    pub session_id: String,
    pub file_path: String,
    pub total_bytes: u64,
    pub timestamp: SystemTime,
}

impl FileDownloadCompleted {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        file_path: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            file_path: file_path.into(),
            total_bytes,
            timestamp: SystemTime::now(),
        }
    }
}

/// Two competing versions of the same path were observed.
#[derive(Debug, Clone)]
pub struct FileConflictDetected {
    pub local: FileMetadata,
    pub remote: FileMetadata,
    pub session_id: String,
    pub timestamp: SystemTime,
}

impl FileConflictDetected {
    #[must_use]
    pub fn new(local: FileMetadata, remote: FileMetadata, session_id: impl Into<String>) -> Self {
        Self {
            local,
            remote,
            session_id: session_id.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// A conflict was settled.
#[derive(Debug, Clone)]
pub struct FileConflictResolved {
    pub resolved: FileMetadata,
    pub other: FileMetadata,
    pub strategy: ConflictStrategy,
    pub session_id: String,
    pub timestamp: SystemTime,
}

impl FileConflictResolved {
    #[must_use]
    pub fn new(
        resolved: FileMetadata,
        other: FileMetadata,
        strategy: ConflictStrategy,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            resolved,
            other,
            strategy,
            session_id: session_id.into(),
            timestamp: SystemTime::now(),
        }
    }
}
