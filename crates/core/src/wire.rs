//! Binary codec for metadata records.
//!
//! Record layout (all multibyte integers big-endian):
//!
//! ```text
//! [version:1 = 0x01]
//! [file_path_len:4][file_path:N]
//! [hash_len:4][hash:N]
//! [size:8]
//! [modified_time:8 signed]
//! [created_time:8 signed]
//! [sync_state:1]
//! [replica_count:4]
//! repeat replica_count times:
//!   [replica_id_len:4][replica_id:N]
//!   [version:4]
//!   [modified_time:8 signed]
//! ```
//!
//! Records are self-delimiting, so a stream is just records back-to-back.

use crate::error::{Result, SyncError};
use crate::types::{FileMetadata, ReplicaInfo, SyncState};

/// Format version written into every record.
pub const WIRE_VERSION: u8 = 0x01;

/// Encode one metadata record.
#[must_use]
pub fn encode(metadata: &FileMetadata) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + metadata.file_path.len() + metadata.hash.len());

    buf.push(WIRE_VERSION);
    write_string(&mut buf, &metadata.file_path);
    write_string(&mut buf, &metadata.hash);
    buf.extend_from_slice(&metadata.size.to_be_bytes());
    buf.extend_from_slice(&metadata.modified_time.to_be_bytes());
    buf.extend_from_slice(&metadata.created_time.to_be_bytes());
    buf.push(metadata.sync_state.as_u8());
    buf.extend_from_slice(&(metadata.replicas.len() as u32).to_be_bytes());

    for replica in &metadata.replicas {
        write_string(&mut buf, &replica.replica_id);
        buf.extend_from_slice(&replica.version.to_be_bytes());
        buf.extend_from_slice(&replica.modified_time.to_be_bytes());
    }

    buf
}

/// Decode one metadata record from the front of `data`.
///
/// # Errors
/// Returns a decode error on an unsupported version byte or truncated input.
pub fn decode(data: &[u8]) -> Result<FileMetadata> {
    let mut reader = Reader::new(data);
    let metadata = decode_record(&mut reader)?;
    Ok(metadata)
}

/// Decode a stream of concatenated records until the input is exhausted.
///
/// # Errors
/// Returns a decode error if any record is malformed.
pub fn decode_stream(data: &[u8]) -> Result<Vec<FileMetadata>> {
    let mut reader = Reader::new(data);
    let mut records = Vec::new();
    while !reader.is_at_end() {
        records.push(decode_record(&mut reader)?);
    }
    Ok(records)
}

fn decode_record(reader: &mut Reader<'_>) -> Result<FileMetadata> {
    let version = reader.read_u8()?;
    if version != WIRE_VERSION {
        return Err(SyncError::Decode(format!(
            "unsupported wire version: {version}"
        )));
    }

    let file_path = reader.read_string()?;
    let hash = reader.read_string()?;
    let size = reader.read_u64()?;
    let modified_time = reader.read_i64()?;
    let created_time = reader.read_i64()?;
    let sync_state = SyncState::from_u8(reader.read_u8()?)?;
    let replica_count = reader.read_u32()?;

    let mut replicas = Vec::with_capacity(replica_count.min(1024) as usize);
    for _ in 0..replica_count {
        let replica_id = reader.read_string()?;
        let version = reader.read_u32()?;
        let modified_time = reader.read_i64()?;
        replicas.push(ReplicaInfo::new(replica_id, version, modified_time));
    }

    Ok(FileMetadata {
        file_path,
        hash,
        size,
        modified_time,
        created_time,
        sync_state,
        replicas,
    })
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over the input buffer.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SyncError::Decode(format!("buffer underflow reading {what}")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4, "u32")?);
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8, "u64")?);
        Ok(u64::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8, "i64")?);
        Ok(i64::from_be_bytes(bytes))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len, "string")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SyncError::Decode("invalid utf-8 in string".to_string()))
    }
}
