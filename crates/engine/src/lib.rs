//! driftsync-engine: the synchronization engine
//!
//! A library of thread-safe components: event bus and observers, session
//! state machine, chunked transfer with staging, the sync service that ties
//! them together, and the local change detector. The engine spawns no
//! threads; any driver (worker pool, event loop, single thread) satisfies
//! its contracts.

pub mod conflict;
pub mod detect;
pub mod events;
pub mod observers;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod transfer;

pub use conflict::{ConflictResolution, ConflictResolver};
pub use detect::{ChangeDetector, ChangeKind, ChangeSet, FileChange};
pub use events::{ConflictStrategy, EventBus, EventQueue};
pub use observers::{EventLogger, MetricsSnapshot, SyncMetrics, SyncQueue};
pub use service::{DiffResponse, SyncService};
pub use session::{SessionInfo, SessionState, SyncSession};
pub use transfer::{ChunkEnvelope, FileTransferService, DEFAULT_CHUNK_SIZE};
