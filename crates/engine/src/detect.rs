//! Local change detection: diff a workspace on disk against the snapshot
//! from the previous scan.
//!
//! "Unchanged" compares `(hash, size, modified_time)` only. Replica
//! bookkeeping is excluded on purpose: a replica update after a sync must
//! not read as a new local edit, or every sync would trigger the next.

use std::collections::HashMap;
use std::path::Path;

use ignore::WalkBuilder;

use driftsync_core::hash::digest_file;
use driftsync_core::{FileMetadata, Result, SyncState};

/// What happened to a file since the last scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One detected change, with the version bookkeeping a sync needs.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub kind: ChangeKind,
    /// Path relative to the scan root, POSIX style.
    pub path: String,
    /// Metadata after the change; a DELETED tombstone for deletions.
    pub current: FileMetadata,
    /// Metadata before the change, if the file was previously known.
    pub previous: Option<FileMetadata>,
    /// Version this replica started editing from; 0 for additions.
    pub base_version: u32,
    /// Hash this replica started editing from; empty for additions.
    pub base_hash: String,
}

/// Changes from one scan plus the full post-scan snapshot.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<FileChange>,
    /// The complete known set after the scan, suitable for persistence.
    pub snapshot: Vec<FileMetadata>,
}

/// Scans a workspace and emits versioned change records.
pub struct ChangeDetector {
    replica_id: String,
    recursive: bool,
    known: HashMap<String, FileMetadata>,
}

impl ChangeDetector {
    /// Recursive detector for the given replica identity.
    #[must_use]
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            recursive: true,
            known: HashMap::new(),
        }
    }

    /// Restrict scanning to the root directory itself.
    #[must_use]
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    #[must_use]
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Seed the detector with a previously persisted snapshot.
    pub fn load_snapshot(&mut self, snapshot: &[FileMetadata]) {
        self.known.clear();
        for entry in snapshot {
            self.known.insert(entry.file_path.clone(), entry.clone());
        }
    }

    /// The internal cache of known files.
    #[must_use]
    pub fn known_files(&self) -> &HashMap<String, FileMetadata> {
        &self.known
    }

    /// Walk `root`, compare against the known set, and return the changes
    /// plus the updated snapshot. A missing or non-directory root yields an
    /// empty change set and leaves the known set untouched.
    ///
    /// # Errors
    /// Returns an I/O error if a file's metadata or contents cannot be
    /// read mid-scan.
    pub fn scan_directory(&mut self, root: &Path) -> Result<ChangeSet> {
        let mut result = ChangeSet::default();
        if !root.is_dir() {
            return Ok(result);
        }

        let mut next_snapshot: HashMap<String, FileMetadata> = HashMap::new();

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .filter_entry(|entry| entry.file_name() != crate::snapshot::STATE_DIR);
        if !self.recursive {
            builder.max_depth(Some(1));
        }

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue, // unreadable entries are skipped, not fatal
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(stripped) = path.strip_prefix(root) else {
                continue;
            };
            let normalized = normalize(stripped);
            if normalized.is_empty() {
                continue;
            }

            let current = self.build_metadata(path, &normalized)?;

            match self.known.get(&normalized) {
                None => {
                    let mut added = current;
                    added.sync_state = SyncState::Modified;
                    let mtime = added.modified_time;
                    added.update_replica(&self.replica_id, 1, mtime);

                    result.changes.push(FileChange {
                        kind: ChangeKind::Added,
                        path: normalized.clone(),
                        current: added.clone(),
                        previous: None,
                        base_version: 0,
                        base_hash: String::new(),
                    });
                    next_snapshot.insert(normalized, added);
                }
                Some(old) if metadata_equal(old, &current) => {
                    // Keep the previous record; it carries the replica list.
                    next_snapshot.insert(normalized, old.clone());
                }
                Some(old) => {
                    let base_version = old
                        .replica(&self.replica_id)
                        .map_or(0, |replica| replica.version);

                    let mut updated = current;
                    updated.sync_state = SyncState::Modified;
                    updated.replicas = old.replicas.clone();
                    let mtime = updated.modified_time;
                    updated.update_replica(&self.replica_id, base_version + 1, mtime);

                    result.changes.push(FileChange {
                        kind: ChangeKind::Modified,
                        path: normalized.clone(),
                        current: updated.clone(),
                        previous: Some(old.clone()),
                        base_version,
                        base_hash: old.hash.clone(),
                    });
                    next_snapshot.insert(normalized, updated);
                }
            }
        }

        // Anything known but not visited this scan was deleted.
        for (path, old) in &self.known {
            if next_snapshot.contains_key(path) {
                continue;
            }

            let mut tombstone = old.clone();
            tombstone.sync_state = SyncState::Deleted;

            result.changes.push(FileChange {
                kind: ChangeKind::Deleted,
                path: path.clone(),
                current: tombstone,
                previous: Some(old.clone()),
                base_version: old
                    .replica(&self.replica_id)
                    .map_or(0, |replica| replica.version),
                base_hash: old.hash.clone(),
            });
        }

        result.changes.sort_by(|a, b| a.path.cmp(&b.path));

        self.known = next_snapshot;
        result.snapshot = self.known.values().cloned().collect();
        result
            .snapshot
            .sort_by(|a, b| a.file_path.cmp(&b.file_path));

        Ok(result)
    }

    fn build_metadata(&self, absolute: &Path, relative: &str) -> Result<FileMetadata> {
        let fs_meta = std::fs::metadata(absolute)?;
        let modified_time = fs_meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);
        let created_time = fs_meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(modified_time, |d| d.as_secs() as i64);

        let mut metadata = FileMetadata::new(relative);
        metadata.size = fs_meta.len();
        metadata.hash = digest_file(absolute)?;
        metadata.modified_time = modified_time;
        metadata.created_time = created_time;
        metadata.sync_state = SyncState::Synced;
        Ok(metadata)
    }
}

fn metadata_equal(a: &FileMetadata, b: &FileMetadata) -> bool {
    a.hash == b.hash && a.size == b.size && a.modified_time == b.modified_time
}

/// Relative path with forward slashes, regardless of platform.
fn normalize(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scan(detector: &mut ChangeDetector, root: &Path) -> ChangeSet {
        detector.scan_directory(root).unwrap()
    }

    #[test]
    fn empty_directory_scans_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = ChangeDetector::new("laptop-1");
        let result = scan(&mut detector, dir.path());
        assert!(result.changes.is_empty());
        assert!(result.snapshot.is_empty());
    }

    #[test]
    fn missing_root_yields_empty_changeset() {
        let mut detector = ChangeDetector::new("laptop-1");
        let result = detector
            .scan_directory(Path::new("/nonexistent/driftsync-scan"))
            .unwrap();
        assert!(result.changes.is_empty());
    }

    #[test]
    fn add_modify_delete_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = ChangeDetector::new("laptop-1");

        // Added
        fs::write(dir.path().join("note.txt"), "first").unwrap();
        let result = scan(&mut detector, dir.path());
        assert_eq!(result.changes.len(), 1);
        let change = &result.changes[0];
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.path, "note.txt");
        assert_eq!(change.base_version, 0);
        assert_eq!(change.current.sync_state, SyncState::Modified);
        assert_eq!(change.current.replica("laptop-1").unwrap().version, 1);
        let first_hash = change.current.hash.clone();

        // Modified (force a different mtime so the comparison can't miss)
        fs::write(dir.path().join("note.txt"), "second version").unwrap();
        filetime_bump(&dir.path().join("note.txt"));
        let result = scan(&mut detector, dir.path());
        assert_eq!(result.changes.len(), 1);
        let change = &result.changes[0];
        assert_eq!(change.kind, ChangeKind::Modified);
        assert_eq!(change.base_version, 1);
        assert_eq!(change.base_hash, first_hash);
        assert_eq!(change.current.replica("laptop-1").unwrap().version, 2);
        assert!(change.previous.is_some());

        // Deleted
        fs::remove_file(dir.path().join("note.txt")).unwrap();
        let result = scan(&mut detector, dir.path());
        assert_eq!(result.changes.len(), 1);
        let change = &result.changes[0];
        assert_eq!(change.kind, ChangeKind::Deleted);
        assert_eq!(change.current.sync_state, SyncState::Deleted);
        assert_eq!(change.base_version, 2);
        assert!(result.snapshot.is_empty());
    }

    #[test]
    fn unchanged_files_stay_quiet_and_keep_replicas() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = ChangeDetector::new("laptop-1");

        fs::write(dir.path().join("stable.txt"), "same").unwrap();
        let first = scan(&mut detector, dir.path());
        assert_eq!(first.changes.len(), 1);

        let second = scan(&mut detector, dir.path());
        assert!(second.changes.is_empty());
        // The snapshot still carries the replica entry from the add.
        assert_eq!(
            second.snapshot[0].replica("laptop-1").unwrap().version,
            1
        );
    }

    #[test]
    fn replica_churn_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = ChangeDetector::new("laptop-1");

        fs::write(dir.path().join("doc.txt"), "content").unwrap();
        let first = scan(&mut detector, dir.path());

        // Another replica syncs the file; only replica info differs.
        let mut snapshot = first.snapshot.clone();
        let modified_time = snapshot[0].modified_time;
        snapshot[0].update_replica("phone-1", 1, modified_time);
        detector.load_snapshot(&snapshot);

        let second = scan(&mut detector, dir.path());
        assert!(second.changes.is_empty());
        assert!(second.snapshot[0].replica("phone-1").is_some());
    }

    #[test]
    fn snapshot_round_trip_scans_clean() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), "aaa").unwrap();
        fs::write(dir.path().join("sub/b.txt"), "bbb").unwrap();

        let mut detector = ChangeDetector::new("laptop-1");
        let first = scan(&mut detector, dir.path());
        assert_eq!(first.changes.len(), 2);

        let mut fresh = ChangeDetector::new("laptop-1");
        fresh.load_snapshot(&first.snapshot);
        let second = scan(&mut fresh, dir.path());
        assert!(second.changes.is_empty());
        assert_eq!(second.snapshot, first.snapshot);
    }

    #[test]
    fn nested_paths_use_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/deep")).unwrap();
        fs::write(dir.path().join("docs/deep/file.txt"), "x").unwrap();

        let mut detector = ChangeDetector::new("laptop-1");
        let result = scan(&mut detector, dir.path());
        assert_eq!(result.changes[0].path, "docs/deep/file.txt");
    }

    #[test]
    fn non_recursive_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), "nested").unwrap();

        let mut detector = ChangeDetector::new("laptop-1").non_recursive();
        let result = scan(&mut detector, dir.path());
        let paths: Vec<_> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["top.txt"]);
    }

    /// Nudge mtime forward so consecutive writes within one clock tick
    /// still register as modifications.
    fn filetime_bump(path: &Path) {
        let metadata = fs::metadata(path).unwrap();
        let bumped = metadata.modified().unwrap() + std::time::Duration::from_secs(2);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(bumped).unwrap();
    }
}
