//! driftsync: file synchronization with verified chunked transfer
//!
//! Two front doors onto the engine:
//! - `scan` runs the change detector over a workspace, diffing against the
//!   snapshot persisted by the previous run
//! - `sync` performs a complete exchange against a server root: diff,
//!   chunked upload, verified finalize

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{builder::Styles, Parser, Subcommand};
use color_eyre::Result;
use tracing::{debug, info};

use driftsync_core::{ddl, wire, FileMetadata, MetadataStore};
use driftsync_engine::{
    snapshot, ChangeDetector, ChangeKind, EventBus, EventLogger, FileTransferService, SyncMetrics,
    SyncService, DEFAULT_CHUNK_SIZE,
};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "driftsync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "File sync with verified chunked transfer")]
#[command(long_about = r#"
driftsync keeps a workspace and a server content root convergent.

Examples:
  driftsync scan ./project                 Detect local changes
  driftsync sync ./project ./server-root   Run a full sync exchange
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect changes in a workspace since the last scan
    Scan {
        /// Directory to scan
        path: PathBuf,

        /// Replica identity recorded in version bookkeeping
        #[arg(short, long, default_value = "local")]
        replica_id: String,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        format: String,
    },

    /// Sync a workspace into a server content root
    Sync {
        /// Local workspace
        local: PathBuf,

        /// Server root (content, staging, and catalog live here)
        server_root: PathBuf,

        /// Client identity to register as
        #[arg(short, long, default_value = "")]
        client_id: String,

        /// Transfer chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Print a server catalog as metadata text
    Inspect {
        /// Server root holding catalog.bin
        server_root: PathBuf,
    },

    /// Merge metadata text records into a server catalog
    Import {
        /// Server root holding catalog.bin
        server_root: PathBuf,

        /// File of metadata text records
        records: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Scan {
            path,
            replica_id,
            format,
        } => scan_command(&path, &replica_id, &format),
        Commands::Sync {
            local,
            server_root,
            client_id,
            chunk_size,
        } => sync_command(&local, &server_root, &client_id, chunk_size),
        Commands::Inspect { server_root } => inspect_command(&server_root),
        Commands::Import {
            server_root,
            records,
        } => import_command(&server_root, &records),
    }
}

fn inspect_command(server_root: &Path) -> Result<()> {
    for record in load_catalog(server_root)? {
        println!("{}", ddl::format_record(&record));
    }
    Ok(())
}

fn import_command(server_root: &Path, records: &Path) -> Result<()> {
    let text = std::fs::read_to_string(records)?;
    let imported = ddl::parse_records(&text)?;

    let mut catalog = load_catalog(server_root)?;
    for record in imported {
        match catalog.iter_mut().find(|m| m.file_path == record.file_path) {
            Some(existing) => *existing = record,
            None => catalog.push(record),
        }
    }

    info!("Catalog now tracks {} records", catalog.len());
    save_catalog(server_root, &catalog)?;
    Ok(())
}

fn scan_command(path: &Path, replica_id: &str, format: &str) -> Result<()> {
    info!("Scanning {}...", path.display());

    let mut detector = ChangeDetector::new(replica_id);
    detector.load_snapshot(&snapshot::load(path)?);
    let result = detector.scan_directory(path)?;
    snapshot::save(path, &result.snapshot)?;

    match format {
        "json" => {
            let records: Vec<_> = result
                .changes
                .iter()
                .map(|change| {
                    let kind = match change.kind {
                        ChangeKind::Added => "added",
                        ChangeKind::Modified => "modified",
                        ChangeKind::Deleted => "deleted",
                    };
                    serde_json::json!({
                        "kind": kind,
                        "path": change.path,
                        "base_version": change.base_version,
                        "base_hash": change.base_hash,
                        "metadata": change.current,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            if result.changes.is_empty() {
                println!("No changes since last scan ({} files tracked)", result.snapshot.len());
            }
            for change in &result.changes {
                let tag = match change.kind {
                    ChangeKind::Added => "A",
                    ChangeKind::Modified => "M",
                    ChangeKind::Deleted => "D",
                };
                println!("{tag} {}", change.path);
            }
        }
    }

    Ok(())
}

fn sync_command(local: &Path, server_root: &Path, client_id: &str, chunk_size: usize) -> Result<()> {
    info!("Syncing {} -> {}", local.display(), server_root.display());

    let bus = Arc::new(EventBus::new());
    EventLogger::attach(&bus);
    let metrics = SyncMetrics::attach(&bus);

    let store = Arc::new(MetadataStore::new());
    for record in load_catalog(server_root)? {
        store.add_or_update(record);
    }
    debug!("Loaded {} catalog records", store.size());

    let service = SyncService::new(
        server_root.join("data"),
        server_root.join("staging"),
        Arc::clone(&bus),
        Arc::clone(&store),
    )?;

    // Local view of the workspace, diffed against the last scan.
    let mut detector = ChangeDetector::new(if client_id.is_empty() { "local" } else { client_id });
    detector.load_snapshot(&snapshot::load(local)?);
    let scanned = detector.scan_directory(local)?;
    snapshot::save(local, &scanned.snapshot)?;
    let client_snapshot: Vec<FileMetadata> = scanned.snapshot.clone();

    let client = service.register_client(client_id);
    let session = service.start_session(&client)?;
    let diff = service.compute_diff(&session.session_id, &client_snapshot)?;

    info!(
        "Diff: {} to upload, {} to download",
        diff.to_upload.len(),
        diff.to_download.len()
    );

    let transfer = FileTransferService::new();
    for path in &diff.to_upload {
        let source = local.join(path);
        let expected = client_snapshot
            .iter()
            .find(|m| &m.file_path == path)
            .map(|m| m.hash.clone())
            .unwrap_or_default();

        transfer.upload_file(
            &source,
            &session.session_id,
            path,
            |chunk| service.ingest_chunk(&chunk),
            chunk_size,
        )?;
        service.finalize_upload(&session.session_id, path, &expected)?;
    }

    let info = service.session_info(&session.session_id)?;
    info!("Session {} finished in state {}", info.session_id, info.state);

    save_catalog(server_root, &store.list_all())?;

    let stats = metrics.snapshot();
    println!("Files uploaded:  {}", stats.files_uploaded);
    println!("Bytes uploaded:  {}", stats.bytes_uploaded);
    println!("Files added:     {}", stats.files_added);
    println!("Files modified:  {}", stats.files_modified);
    println!("Pending downloads: {}", diff.to_download.len());

    Ok(())
}

/// Server catalog: every tracked metadata record, one binary stream.
fn catalog_path(server_root: &Path) -> PathBuf {
    server_root.join("catalog.bin")
}

fn load_catalog(server_root: &Path) -> Result<Vec<FileMetadata>> {
    let path = catalog_path(server_root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(wire::decode_stream(&std::fs::read(&path)?)?)
}

fn save_catalog(server_root: &Path, records: &[FileMetadata]) -> Result<()> {
    let mut sorted: Vec<_> = records.to_vec();
    sorted.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let mut bytes = Vec::new();
    for record in &sorted {
        bytes.extend_from_slice(&wire::encode(record));
    }
    std::fs::create_dir_all(server_root)?;
    std::fs::write(catalog_path(server_root), bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = FileMetadata::new("docs/a.txt");
        record.hash = "abc".to_string();
        record.size = 3;

        save_catalog(dir.path(), &[record.clone()]).unwrap();
        assert_eq!(load_catalog(dir.path()).unwrap(), vec![record]);
    }

    #[test]
    fn missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn import_merges_text_records_into_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("server");

        let mut existing = FileMetadata::new("kept.txt");
        existing.hash = "old".to_string();
        save_catalog(&server, &[existing]).unwrap();

        let records = dir.path().join("records.txt");
        std::fs::write(
            &records,
            "FILE \"kept.txt\" HASH \"new\" SIZE 9\nFILE \"added.txt\" SIZE 1",
        )
        .unwrap();

        import_command(&server, &records).unwrap();

        let catalog = load_catalog(&server).unwrap();
        assert_eq!(catalog.len(), 2);
        let kept = catalog.iter().find(|m| m.file_path == "kept.txt").unwrap();
        assert_eq!(kept.hash, "new");
    }

    #[test]
    fn end_to_end_sync_populates_the_server_root() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("workspace");
        let server = dir.path().join("server");
        std::fs::create_dir_all(local.join("docs")).unwrap();
        std::fs::write(local.join("docs/note.txt"), "example payload").unwrap();

        sync_command(&local, &server, "laptop-1", 8).unwrap();

        let promoted = std::fs::read(server.join("data/docs/note.txt")).unwrap();
        assert_eq!(promoted, b"example payload");

        let catalog = load_catalog(&server).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].file_path, "docs/note.txt");
        assert_eq!(catalog[0].replicas[0].replica_id, "laptop-1");
        assert_eq!(catalog[0].replicas[0].version, 1);

        // Second run with no edits converges with nothing to upload.
        sync_command(&local, &server, "laptop-1", 8).unwrap();
        let catalog = load_catalog(&server).unwrap();
        assert_eq!(catalog[0].replicas[0].version, 1);
    }
}
