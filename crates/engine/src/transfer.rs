//! Chunked, hash-verified file transfer with staging and atomic promotion.
//!
//! Chunks are position-addressed: each one is written at
//! `chunk_index * chunk_size` in a per-session staging file, so arrival
//! order does not matter and re-delivery of an identical chunk is
//! idempotent. Completeness is only validated end-to-end, by digesting the
//! assembled file at finalize time and renaming it into the data root.
//! `staging_root` and the destination root must share a filesystem for the
//! rename to be atomic.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use driftsync_core::hash::{digest_bytes, digest_file};
use driftsync_core::{Result, SyncError};

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One chunk of a file in flight.
#[derive(Debug, Clone)]
pub struct ChunkEnvelope {
    pub session_id: String,
    pub file_path: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Nominal chunk size used by the producer; every chunk but the last
    /// carries exactly this many bytes.
    pub chunk_size: u32,
    pub data: Vec<u8>,
    /// Digest of `data`.
    pub chunk_hash: String,
}

/// Splits files into verified chunks and reassembles them via staging.
#[derive(Debug, Default, Clone)]
pub struct FileTransferService;

impl FileTransferService {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Read `source` sequentially and feed one [`ChunkEnvelope`] per chunk
    /// to `sink`. Stops at the first sink error.
    ///
    /// # Errors
    /// Returns invalid-input for a zero `chunk_size`, an I/O error if the
    /// source cannot be read, or the first error from `sink`.
    pub fn upload_file(
        &self,
        source: &Path,
        session_id: &str,
        logical_path: &str,
        mut sink: impl FnMut(ChunkEnvelope) -> Result<()>,
        chunk_size: usize,
    ) -> Result<()> {
        if chunk_size == 0 {
            return Err(SyncError::InvalidInput("chunk_size must be > 0".to_string()));
        }

        let mut input = std::fs::File::open(source)?;
        let file_size = input.metadata()?.len();
        let total_chunks = file_size.div_ceil(chunk_size as u64) as u32;

        let mut buffer = vec![0u8; chunk_size];
        let mut chunk_index = 0u32;

        loop {
            let bytes_read = read_full(&mut input, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let data = buffer[..bytes_read].to_vec();
            let chunk_hash = digest_bytes(&data);
            sink(ChunkEnvelope {
                session_id: session_id.to_string(),
                file_path: logical_path.to_string(),
                chunk_index,
                total_chunks,
                chunk_size: chunk_size as u32,
                data,
                chunk_hash,
            })?;

            chunk_index += 1;
        }

        Ok(())
    }

    /// Verify a chunk's digest and write it into the session's staging file
    /// at its byte offset, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an integrity error when `chunk_hash` does not match the
    /// data, or an I/O error if the staging file cannot be written.
    pub fn apply_chunk(&self, chunk: &ChunkEnvelope, staging_root: &Path) -> Result<()> {
        if chunk.chunk_hash != digest_bytes(&chunk.data) {
            return Err(SyncError::Integrity(format!(
                "chunk {} of {} failed hash verification",
                chunk.chunk_index, chunk.file_path
            )));
        }

        let staging_path = staging_path(staging_root, &chunk.session_id, &chunk.file_path);
        ensure_parent_exists(&staging_path)?;

        let offset = u64::from(chunk.chunk_index) * u64::from(chunk.chunk_size);
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&staging_path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&chunk.data)?;
        file.flush()?;

        Ok(())
    }

    /// Digest the staged file, compare against `expected_hash`, and
    /// atomically rename it to `destination_root/<file_path>`.
    ///
    /// # Errors
    /// Returns not-found if no chunk ever arrived, an integrity error on a
    /// digest mismatch (staged data left in place for inspection), or an
    /// I/O error from the rename.
    pub fn finalize_file(
        &self,
        session_id: &str,
        file_path: &str,
        staging_root: &Path,
        destination_root: &Path,
        expected_hash: &str,
    ) -> Result<()> {
        let staged = staging_path(staging_root, session_id, file_path);
        if !staged.exists() {
            return Err(SyncError::NotFound(format!(
                "no staged data for {file_path} in {session_id}"
            )));
        }

        let actual = digest_file(&staged)?;
        if actual != expected_hash {
            return Err(SyncError::Integrity(format!(
                "final digest mismatch for {file_path}: expected {expected_hash}, got {actual}"
            )));
        }

        let destination = destination_root.join(relative(file_path));
        ensure_parent_exists(&destination)?;
        std::fs::rename(&staged, &destination)?;

        Ok(())
    }
}

/// Staging location for a `(session, path)` pair.
fn staging_path(staging_root: &Path, session_id: &str, file_path: &str) -> PathBuf {
    staging_root.join(session_id).join(relative(file_path))
}

/// Strip leading separators so absolute-looking logical paths nest under a
/// root instead of escaping it.
pub(crate) fn relative(file_path: &str) -> PathBuf {
    PathBuf::from(file_path.trim_start_matches('/'))
}

fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Fill as much of `buffer` as the reader will give before EOF.
fn read_full(reader: &mut impl Read, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
