//! Ready-made observers over the event bus: structured logging, counters,
//! and a queue of paths needing sync.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::events::{
    EventBus, EventQueue, FileAdded, FileChunkReceived, FileConflictDetected, FileConflictResolved,
    FileDeleted, FileDownloadCompleted, FileModified, FileUploadCompleted, FileUploadStarted,
    ServerShuttingDown, ServerStarted, SyncCompleted, SyncFailed, SyncStarted,
};

/// Logs every event type as a structured record.
pub struct EventLogger;

impl EventLogger {
    /// Subscribe logging handlers for all event types.
    pub fn attach(bus: &EventBus) {
        bus.subscribe::<FileAdded, _>(|e| {
            info!(
                path = %e.metadata.file_path,
                hash = %e.metadata.hash,
                size = e.metadata.size,
                source = %e.source,
                "file added"
            );
        });
        bus.subscribe::<FileModified, _>(|e| {
            info!(
                path = %e.file_path,
                old_hash = %e.old_hash,
                new_hash = %e.new_hash,
                old_size = e.old_size,
                new_size = e.new_size,
                source = %e.source,
                "file modified"
            );
        });
        bus.subscribe::<FileDeleted, _>(|e| {
            info!(path = %e.file_path, source = %e.source, "file deleted");
        });
        bus.subscribe::<ServerStarted, _>(|e| {
            info!(port = e.port, "server started");
        });
        bus.subscribe::<ServerShuttingDown, _>(|e| {
            info!(reason = %e.reason, "server shutting down");
        });
        bus.subscribe::<SyncStarted, _>(|e| {
            info!(client = %e.client_id, files = e.file_count, "sync started");
        });
        bus.subscribe::<SyncCompleted, _>(|e| {
            info!(
                client = %e.client_id,
                files = e.files_synced,
                duration_ms = e.duration.as_millis() as u64,
                "sync completed"
            );
        });
        bus.subscribe::<SyncFailed, _>(|e| {
            warn!(client = %e.client_id, error = %e.error, "sync failed");
        });
        bus.subscribe::<FileUploadStarted, _>(|e| {
            info!(
                session = %e.session_id,
                path = %e.file_path,
                bytes = e.total_bytes,
                "upload started"
            );
        });
        bus.subscribe::<FileChunkReceived, _>(|e| {
            debug!(
                session = %e.session_id,
                path = %e.file_path,
                chunk = e.chunk_index + 1,
                total = e.total_chunks,
                bytes = e.bytes_received,
                "chunk received"
            );
        });
        bus.subscribe::<FileUploadCompleted, _>(|e| {
            info!(
                session = %e.session_id,
                path = %e.file_path,
                hash = %e.hash,
                bytes = e.total_bytes,
                duration_ms = e.duration.as_millis() as u64,
                "upload completed"
            );
        });
        bus.subscribe::<FileDownloadCompleted, _>(|e| {
            info!(
                session = %e.session_id,
                path = %e.file_path,
                bytes = e.total_bytes,
                "download completed"
            );
        });
        bus.subscribe::<FileConflictDetected, _>(|e| {
            warn!(
                session = %e.session_id,
                path = %e.local.file_path,
                local_hash = %e.local.hash,
                remote_hash = %e.remote.hash,
                "conflict detected"
            );
        });
        bus.subscribe::<FileConflictResolved, _>(|e| {
            info!(
                session = %e.session_id,
                path = %e.resolved.file_path,
                strategy = ?e.strategy,
                winner_hash = %e.resolved.hash,
                "conflict resolved"
            );
        });
    }
}

/// Plain-number view of [`SyncMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub files_added: u64,
    pub files_modified: u64,
    pub files_deleted: u64,
    pub bytes_added: u64,
    pub bytes_modified: u64,
    pub files_uploaded: u64,
    pub bytes_uploaded: u64,
    pub files_downloaded: u64,
    pub bytes_downloaded: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

/// Atomic counters fed by event handlers.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    files_added: AtomicU64,
    files_modified: AtomicU64,
    files_deleted: AtomicU64,
    bytes_added: AtomicU64,
    bytes_modified: AtomicU64,
    files_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    files_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl SyncMetrics {
    /// Subscribe counting handlers and return the shared counters.
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let metrics = Arc::new(Self::default());

        let m = Arc::clone(&metrics);
        bus.subscribe::<FileAdded, _>(move |e| {
            m.files_added.fetch_add(1, Ordering::Relaxed);
            m.bytes_added.fetch_add(e.metadata.size, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileModified, _>(move |e| {
            m.files_modified.fetch_add(1, Ordering::Relaxed);
            m.bytes_modified.fetch_add(e.new_size, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileDeleted, _>(move |_| {
            m.files_deleted.fetch_add(1, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileUploadCompleted, _>(move |e| {
            m.files_uploaded.fetch_add(1, Ordering::Relaxed);
            m.bytes_uploaded.fetch_add(e.total_bytes, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileDownloadCompleted, _>(move |e| {
            m.files_downloaded.fetch_add(1, Ordering::Relaxed);
            m.bytes_downloaded
                .fetch_add(e.total_bytes, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileConflictDetected, _>(move |_| {
            m.conflicts_detected.fetch_add(1, Ordering::Relaxed);
        });
        let m = Arc::clone(&metrics);
        bus.subscribe::<FileConflictResolved, _>(move |_| {
            m.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
        });

        metrics
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_added: self.files_added.load(Ordering::Relaxed),
            files_modified: self.files_modified.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            bytes_added: self.bytes_added.load(Ordering::Relaxed),
            bytes_modified: self.bytes_modified.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
        }
    }
}

/// Collects paths that need syncing for a downstream consumer to drain.
#[derive(Debug)]
pub struct SyncQueue {
    queue: Arc<EventQueue<String>>,
}

impl SyncQueue {
    /// Subscribe to add/modify events and return the shared queue handle.
    pub fn attach(bus: &EventBus) -> Self {
        let queue = Arc::new(EventQueue::new());

        let q = Arc::clone(&queue);
        bus.subscribe::<FileAdded, _>(move |e| {
            q.push(e.metadata.file_path.clone());
        });
        let q = Arc::clone(&queue);
        bus.subscribe::<FileModified, _>(move |e| {
            q.push(e.file_path.clone());
        });

        Self { queue }
    }

    /// Next queued path without blocking.
    pub fn try_next(&self) -> Option<String> {
        self.queue.try_pop()
    }

    /// Block up to `timeout` for the next queued path.
    pub fn next_timeout(&self, timeout: Duration) -> Option<String> {
        self.queue.pop_timeout(timeout)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Wake any blocked consumers; further blocking pops return `None`.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
