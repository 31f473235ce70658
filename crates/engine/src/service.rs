//! The sync service: orchestrates store, sessions, transfer, and events
//! for a complete exchange with one client.
//!
//! The service owns the clients and sessions tables behind a single mutex.
//! Critical sections are short and writer-heavy, so one lock is enough;
//! chunk I/O happens with the lock released. The metadata store keeps its
//! own reader-writer lock, and the event bus its own.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use driftsync_core::hash::digest_file;
use driftsync_core::{FileMetadata, MerkleTree, MetadataStore, Result, SyncError, SyncState};

use crate::events::{
    EventBus, FileAdded, FileChunkReceived, FileDownloadCompleted, FileModified, FileUploadCompleted,
    FileUploadStarted, SyncCompleted, SyncFailed, SyncStarted,
};
use crate::session::{SessionInfo, SessionState, SyncSession};
use crate::transfer::{relative, ChunkEnvelope, FileTransferService, DEFAULT_CHUNK_SIZE};

/// Actions a client must take to converge with the server.
#[derive(Debug, Clone, Default)]
pub struct DiffResponse {
    /// Paths the client has and the server lacks, or where hashes differ.
    pub to_upload: Vec<String>,
    /// Paths the server has and the client does not list.
    pub to_download: Vec<String>,
    /// Reserved: tombstone propagation is declared but not implemented.
    pub to_delete_remote: Vec<String>,
}

struct SessionData {
    session: SyncSession,
    pending_uploads: HashSet<String>,
    started_uploads: HashSet<String>,
    total_upload_bytes: u64,
    uploaded_bytes: u64,
    started_at: Instant,
}

#[derive(Default)]
struct Registry {
    client_counter: u64,
    session_counter: u64,
    clients: HashSet<String>,
    sessions: HashMap<String, SessionData>,
}

/// Server-side synchronization engine for chunked uploads into a content
/// root, with session tracking and event fan-out.
pub struct SyncService {
    store: Arc<MetadataStore>,
    bus: Arc<EventBus>,
    transfer: FileTransferService,
    data_root: PathBuf,
    staging_root: PathBuf,
    registry: Mutex<Registry>,
}

impl SyncService {
    /// Create a service rooted at `data_root` with in-flight files staged
    /// under `staging_root`. Both directories are created if missing; they
    /// must live on the same filesystem for promotion to be atomic.
    ///
    /// # Errors
    /// Returns an I/O error if either directory cannot be created.
    pub fn new(
        data_root: impl Into<PathBuf>,
        staging_root: impl Into<PathBuf>,
        bus: Arc<EventBus>,
        store: Arc<MetadataStore>,
    ) -> Result<Self> {
        let data_root = data_root.into();
        let staging_root = staging_root.into();
        std::fs::create_dir_all(&data_root)?;
        std::fs::create_dir_all(&staging_root)?;

        Ok(Self {
            store,
            bus,
            transfer: FileTransferService::new(),
            data_root,
            staging_root,
            registry: Mutex::new(Registry::default()),
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a client and return its unique id.
    ///
    /// An empty `preferred_id` yields `client-<N>`. A taken id gets
    /// monotonic counter suffixes appended until it is unique.
    pub fn register_client(&self, preferred_id: &str) -> String {
        let mut registry = self.lock();
        registry.client_counter += 1;

        let mut candidate = if preferred_id.is_empty() {
            format!("client-{}", registry.client_counter)
        } else {
            preferred_id.to_string()
        };
        while registry.clients.contains(&candidate) {
            registry.client_counter += 1;
            candidate = format!("{candidate}-{}", registry.client_counter);
        }

        registry.clients.insert(candidate.clone());
        debug!(client_id = %candidate, "registered client");
        candidate
    }

    /// Open a session for a registered client and emit [`SyncStarted`].
    ///
    /// # Errors
    /// Returns not-found for an unregistered client.
    pub fn start_session(&self, client_id: &str) -> Result<SessionInfo> {
        let info = {
            let mut registry = self.lock();
            if !registry.clients.contains(client_id) {
                return Err(SyncError::NotFound(format!("unknown client: {client_id}")));
            }

            registry.session_counter += 1;
            let session_id = format!("session-{}", registry.session_counter);

            let mut session = SyncSession::new(&session_id, client_id);
            session.start(0, 0)?;
            let info = session.info().clone();

            registry.sessions.insert(
                session_id,
                SessionData {
                    session,
                    pending_uploads: HashSet::new(),
                    started_uploads: HashSet::new(),
                    total_upload_bytes: 0,
                    uploaded_bytes: 0,
                    started_at: Instant::now(),
                },
            );
            info
        };

        self.bus
            .emit(SyncStarted::new(client_id, self.store.size()));
        Ok(info)
    }

    /// Compare the client's snapshot against the server's records and
    /// return what each side must send. Moves the session to
    /// `TransferringFiles`; a diff with nothing to upload completes the
    /// session immediately.
    ///
    /// # Errors
    /// Returns not-found for an unknown session or a state error if the
    /// session cannot accept a diff.
    pub fn compute_diff(
        &self,
        session_id: &str,
        client_snapshot: &[FileMetadata],
    ) -> Result<DiffResponse> {
        {
            let mut registry = self.lock();
            find_session(&mut registry, session_id)?;
        }

        let server_snapshot = self.store.list_all();

        let mut client_tree = MerkleTree::new();
        client_tree.build(client_snapshot);
        let mut server_tree = MerkleTree::new();
        server_tree.build(&server_snapshot);
        let differences = client_tree.diff(&server_tree);

        let client_map = snapshot_map(client_snapshot);
        let server_map = snapshot_map(&server_snapshot);

        let mut response = DiffResponse::default();
        let mut downloads = BTreeSet::new();
        let mut total_upload_bytes = 0u64;

        for path in &differences {
            let client_has = client_map.get(path.as_str());
            let server_has = server_map.get(path.as_str());

            match (client_has, server_has) {
                (Some(client_meta), None) => {
                    response.to_upload.push(path.clone());
                    total_upload_bytes += client_meta.size;
                }
                (Some(client_meta), Some(server_meta)) if client_meta.hash != server_meta.hash => {
                    response.to_upload.push(path.clone());
                    total_upload_bytes += client_meta.size;
                }
                (None, Some(_)) => {
                    downloads.insert(path.clone());
                }
                _ => {}
            }
        }

        // Server-only paths the Merkle walk already covered end up here
        // too; the set keeps each path to a single entry.
        for path in server_map.keys() {
            if !client_map.contains_key(path) {
                downloads.insert((*path).to_string());
            }
        }
        response.to_download = downloads.into_iter().collect();

        let (completed, client_id, duration, files_synced) = {
            let mut registry = self.lock();
            let session_data = find_session(&mut registry, session_id)?;

            session_data.session.transition_to(SessionState::RequestingMetadata)?;
            session_data.pending_uploads = response.to_upload.iter().cloned().collect();
            session_data.started_uploads.clear();
            session_data.total_upload_bytes = total_upload_bytes;
            session_data.uploaded_bytes = 0;
            session_data
                .session
                .update_pending(session_data.pending_uploads.len(), total_upload_bytes);
            session_data.session.transition_to(SessionState::TransferringFiles)?;

            if session_data.pending_uploads.is_empty() {
                session_data.session.transition_to(SessionState::Complete)?;
                (
                    true,
                    session_data.session.client_id().to_string(),
                    session_data.started_at.elapsed(),
                    self.store.size(),
                )
            } else {
                (false, String::new(), Duration::ZERO, 0)
            }
        };

        if completed {
            self.bus
                .emit(SyncCompleted::new(client_id, files_synced, duration));
        }

        debug!(
            session_id,
            uploads = response.to_upload.len(),
            downloads = response.to_download.len(),
            "diff computed"
        );
        Ok(response)
    }

    /// Verify and stage one uploaded chunk.
    ///
    /// The first chunk for a path emits [`FileUploadStarted`]; every staged
    /// chunk emits [`FileChunkReceived`]. A chunk failure marks the session
    /// `Failed` and emits [`SyncFailed`].
    ///
    /// # Errors
    /// Returns not-found for an unknown session, invalid-input for a path
    /// the diff did not schedule, or the staging error.
    pub fn ingest_chunk(&self, chunk: &ChunkEnvelope) -> Result<()> {
        let upload_started = {
            let mut registry = self.lock();
            let session_data = find_session(&mut registry, &chunk.session_id)?;

            if !session_data.pending_uploads.contains(&chunk.file_path) {
                return Err(SyncError::InvalidInput(format!(
                    "file not scheduled for upload: {}",
                    chunk.file_path
                )));
            }
            session_data.started_uploads.insert(chunk.file_path.clone())
        };

        if upload_started {
            self.bus.emit(FileUploadStarted::new(
                &chunk.session_id,
                &chunk.file_path,
                u64::from(chunk.total_chunks) * u64::from(chunk.chunk_size),
            ));
        }

        // The data copy runs without the registry lock held.
        let result = self.transfer.apply_chunk(chunk, &self.staging_root);

        match result {
            Ok(()) => {
                self.bus.emit(FileChunkReceived::new(
                    &chunk.session_id,
                    &chunk.file_path,
                    chunk.chunk_index,
                    chunk.total_chunks,
                    chunk.data.len(),
                ));
                Ok(())
            }
            Err(err) => {
                self.fail_session(&chunk.session_id, &err.to_string());
                Err(err)
            }
        }
    }

    /// Validate the assembled file, promote it into the data root, and
    /// update metadata and session accounting.
    ///
    /// On the last pending upload the session walks to `Complete` and
    /// [`SyncCompleted`] fires.
    ///
    /// # Errors
    /// Returns not-found for an unknown session or the finalize error;
    /// failures mark the session `Failed` and emit [`SyncFailed`].
    pub fn finalize_upload(
        &self,
        session_id: &str,
        file_path: &str,
        expected_hash: &str,
    ) -> Result<FileMetadata> {
        let client_id = {
            let mut registry = self.lock();
            let session_data = find_session(&mut registry, session_id)?;
            session_data.session.client_id().to_string()
        };

        // Promotion and re-hash happen outside the registry lock.
        let promoted = self
            .transfer
            .finalize_file(
                session_id,
                file_path,
                &self.staging_root,
                &self.data_root,
                expected_hash,
            )
            .and_then(|()| self.build_metadata_from_disk(file_path))
            .and_then(|metadata| {
                if metadata.hash == expected_hash {
                    Ok(metadata)
                } else {
                    Err(SyncError::Integrity(format!(
                        "promoted file digest mismatch for {file_path}"
                    )))
                }
            });

        let mut new_metadata = match promoted {
            Ok(metadata) => metadata,
            Err(err) => {
                self.fail_session(session_id, &err.to_string());
                return Err(err);
            }
        };

        let previous = self.store.get(file_path).ok();

        if let Some(previous) = &previous {
            new_metadata.replicas = previous.replicas.clone();
        }
        let next_version = previous
            .as_ref()
            .and_then(|p| p.replica(&client_id))
            .map_or(1, |replica| replica.version + 1);
        let modified_time = new_metadata.modified_time;
        new_metadata.update_replica(&client_id, next_version, modified_time);

        match &previous {
            Some(previous) => self.bus.emit(FileModified::new(
                file_path,
                &previous.hash,
                &new_metadata.hash,
                previous.size,
                new_metadata.size,
                "sync",
            )),
            None => self.bus.emit(FileAdded::new(new_metadata.clone(), "sync")),
        }

        self.store.add_or_update(new_metadata.clone());

        let (upload_duration, completed, sync_duration) = {
            let mut registry = self.lock();
            let session_data = find_session(&mut registry, session_id)?;

            session_data.pending_uploads.remove(file_path);
            session_data.uploaded_bytes += new_metadata.size;
            let bytes_pending = session_data
                .total_upload_bytes
                .saturating_sub(session_data.uploaded_bytes);
            session_data
                .session
                .update_pending(session_data.pending_uploads.len(), bytes_pending);

            let elapsed = session_data.started_at.elapsed();
            if session_data.pending_uploads.is_empty() {
                session_data.session.transition_to(SessionState::ApplyingChanges)?;
                session_data.session.transition_to(SessionState::Complete)?;
                (elapsed, true, session_data.started_at.elapsed())
            } else {
                (elapsed, false, Duration::ZERO)
            }
        };

        self.bus.emit(FileUploadCompleted::new(
            session_id,
            file_path,
            &new_metadata.hash,
            new_metadata.size,
            upload_duration,
        ));

        if completed {
            self.bus.emit(SyncCompleted::new(
                &client_id,
                self.store.size(),
                sync_duration,
            ));
        }

        Ok(new_metadata)
    }

    /// Snapshot of a session's current state.
    ///
    /// # Errors
    /// Returns not-found for an unknown session.
    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let mut registry = self.lock();
        let session_data = find_session(&mut registry, session_id)?;
        Ok(session_data.session.info().clone())
    }

    /// Full contents of a stored file as a hex string.
    ///
    /// # Errors
    /// Returns not-found if the path is not in the data root.
    pub fn read_file_hex(&self, file_path: &str) -> Result<String> {
        let absolute = self.data_root.join(relative(file_path));
        if !absolute.exists() {
            return Err(SyncError::NotFound(format!("file not found: {file_path}")));
        }
        Ok(hex::encode(std::fs::read(&absolute)?))
    }

    /// Stream a stored file to `sink` through the chunk pipeline (the
    /// upload path in reverse) and emit [`FileDownloadCompleted`].
    ///
    /// # Errors
    /// Returns not-found for an unknown session or missing file, or the
    /// first error from `sink`.
    pub fn download_file(
        &self,
        session_id: &str,
        file_path: &str,
        sink: impl FnMut(ChunkEnvelope) -> Result<()>,
        chunk_size: usize,
    ) -> Result<()> {
        {
            let mut registry = self.lock();
            find_session(&mut registry, session_id)?;
        }

        let absolute = self.data_root.join(relative(file_path));
        if !absolute.exists() {
            return Err(SyncError::NotFound(format!("file not found: {file_path}")));
        }

        self.transfer
            .upload_file(&absolute, session_id, file_path, sink, chunk_size)?;

        let total_bytes = std::fs::metadata(&absolute)?.len();
        self.bus
            .emit(FileDownloadCompleted::new(session_id, file_path, total_bytes));
        Ok(())
    }

    /// Evict terminal sessions whose last transition is older than
    /// `max_age`. Returns how many were removed.
    pub fn prune_sessions(&self, max_age: Duration) -> usize {
        let mut registry = self.lock();
        let before = registry.sessions.len();
        registry.sessions.retain(|_, data| {
            !(data.session.state().is_terminal()
                && data.session.last_transition().elapsed() > max_age)
        });
        before - registry.sessions.len()
    }

    /// Default chunk size clients should use unless told otherwise.
    #[must_use]
    pub fn default_chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }

    fn fail_session(&self, session_id: &str, error: &str) {
        let client_id = {
            let mut registry = self.lock();
            match registry.sessions.get_mut(session_id) {
                Some(data) => {
                    // A session already in a terminal state stays there.
                    let _ = data.session.mark_failed(error);
                    data.session.client_id().to_string()
                }
                None => return,
            }
        };
        self.bus.emit(SyncFailed::new(client_id, error));
    }

    /// Metadata for a freshly promoted file, read back from the data root.
    fn build_metadata_from_disk(&self, file_path: &str) -> Result<FileMetadata> {
        let absolute = self.data_root.join(relative(file_path));
        let fs_meta = std::fs::metadata(&absolute)?;
        let modified_time = fs_meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);

        let mut metadata = FileMetadata::new(file_path);
        metadata.size = fs_meta.len();
        metadata.hash = digest_file(&absolute)?;
        metadata.modified_time = modified_time;
        metadata.created_time = modified_time;
        metadata.sync_state = SyncState::Synced;
        Ok(metadata)
    }
}

fn find_session<'a>(
    registry: &'a mut Registry,
    session_id: &str,
) -> Result<&'a mut SessionData> {
    registry
        .sessions
        .get_mut(session_id)
        .ok_or_else(|| SyncError::NotFound(format!("unknown session: {session_id}")))
}

fn snapshot_map(snapshot: &[FileMetadata]) -> HashMap<&str, &FileMetadata> {
    snapshot.iter().map(|m| (m.file_path.as_str(), m)).collect()
}
