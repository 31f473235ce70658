//! Error types shared across the driftsync crates.

use thiserror::Error;

/// Errors produced by the synchronization engine and its codecs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A session, client, or file that does not exist was referenced.
    #[error("not found: {0}")]
    NotFound(String),

    /// An insert collided with an existing record.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A request carried a missing or malformed field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A digest check failed (corrupt chunk or assembled file).
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// A session was asked to make an illegal state transition.
    #[error("illegal state transition: {0}")]
    State(String),

    /// The DDL text could not be parsed.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// A binary record could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A conflict requires a human decision.
    #[error("manual resolution required for {0}")]
    ManualResolutionRequired(String),

    /// The requested operation is declared but not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type used by every fallible operation in driftsync.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = SyncError::NotFound("session-9".to_string());
        assert_eq!(err.to_string(), "not found: session-9");

        let err = SyncError::Parse {
            line: 3,
            column: 7,
            message: "expected FILE keyword".to_string(),
        };
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("column 7"));
    }

    #[test]
    fn io_errors_convert() {
        fn read_missing() -> Result<Vec<u8>> {
            Ok(std::fs::read("/nonexistent/driftsync-test")?)
        }
        assert!(matches!(read_missing(), Err(SyncError::Io(_))));
    }
}
