//! Snapshot persistence for the change detector.
//!
//! The known set from the last scan is written under `.driftsync/` in the
//! workspace as a stream of binary metadata records, so the next scan can
//! diff against it.

use std::path::{Path, PathBuf};

use driftsync_core::{wire, FileMetadata, Result};

/// Directory holding driftsync state inside a workspace.
pub const STATE_DIR: &str = ".driftsync";
/// Snapshot file name inside [`STATE_DIR`].
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

fn snapshot_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(SNAPSHOT_FILE)
}

/// Load the persisted snapshot, or an empty one if none was saved yet.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or decoded.
pub fn load(root: &Path) -> Result<Vec<FileMetadata>> {
    let path = snapshot_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(&path)?;
    wire::decode_stream(&bytes)
}

/// Persist `snapshot` for the next scan.
///
/// # Errors
/// Returns an error if the state directory or file cannot be written.
pub fn save(root: &Path, snapshot: &[FileMetadata]) -> Result<()> {
    let state_dir = root.join(STATE_DIR);
    std::fs::create_dir_all(&state_dir)?;

    let mut bytes = Vec::new();
    for record in snapshot {
        bytes.extend_from_slice(&wire::encode(record));
    }
    std::fs::write(state_dir.join(SNAPSHOT_FILE), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::SyncState;

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();

        let mut a = FileMetadata::new("docs/a.txt");
        a.hash = "h1".to_string();
        a.size = 10;
        a.update_replica("laptop-1", 2, 500);
        let mut b = FileMetadata::new("b.bin");
        b.sync_state = SyncState::Deleted;

        save(dir.path(), &[a.clone(), b.clone()]).unwrap();
        assert_eq!(load(dir.path()).unwrap(), vec![a, b]);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(dir.path().join(STATE_DIR).join(SNAPSHOT_FILE), b"garbage").unwrap();
        assert!(load(dir.path()).is_err());
    }
}
