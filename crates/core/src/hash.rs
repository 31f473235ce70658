//! Content hashing using BLAKE3, rendered as fixed-width hex.
//!
//! Every digest in the system goes through this module so that both sides
//! of a transfer agree on the function. Digests are lowercase hex strings,
//! 64 characters for BLAKE3-256.

use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Hex-encoded digest of a byte slice.
#[must_use]
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

/// Hex-encoded digest of a string's UTF-8 bytes.
#[must_use]
pub fn digest_str(data: &str) -> String {
    digest_bytes(data.as_bytes())
}

/// Hex-encoded digest of a file, streamed with a 64 KiB buffer.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    digest_reader(&mut file)
}

/// Hex-encoded digest of everything remaining in a reader.
///
/// # Errors
/// Returns an error if reading fails.
pub fn digest_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize().as_bytes()))
}
