//! Integration tests for durable checkpoint storage

use bulk_importer::checkpoint::{
    CheckpointError, CheckpointStore, FsCheckpointStore, ImportCheckpoint, MAX_STATE_FILE_SIZE,
};
use tempfile::TempDir;

#[test]
fn test_checkpoint_survives_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());

    let mut checkpoint = ImportCheckpoint::new("session-1");
    checkpoint.cursor = Some("page-7".to_string());
    checkpoint.fetched_count = 700;
    checkpoint.processed_count = 650;
    checkpoint.imported_count = 600;
    checkpoint.skipped_count = 40;
    checkpoint.failed_count = 10;
    checkpoint.pending_items.insert("item-651".to_string());
    checkpoint.pending_items.insert("item-652".to_string());

    let content = serde_json::to_string_pretty(&checkpoint).unwrap();
    store.write("target", &content).unwrap();

    let loaded: ImportCheckpoint =
        serde_json::from_str(&store.read("target").unwrap().unwrap()).unwrap();
    assert_eq!(loaded, checkpoint);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_write_replaces_atomically() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());

    store.write("target", "{\"v\":1}").unwrap();
    store.write("target", "{\"v\":2}").unwrap();
    assert_eq!(store.read("target").unwrap().unwrap(), "{\"v\":2}");

    // No stray temp files left behind in the state directory.
    let stray: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| !name.ends_with(".json") && !name.ends_with(".lock"))
        .collect();
    assert!(stray.is_empty(), "unexpected files: {stray:?}");
}

#[test]
fn test_key_sanitization_prevents_path_escape() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());

    store.write("../../etc/passwd", "{}").unwrap();
    assert!(store.read("../../etc/passwd").unwrap().is_some());

    // Everything the store wrote stays inside its directory.
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        assert!(path.starts_with(dir.path()));
    }
}

#[test]
fn test_remove_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());

    store.write("target", "{}").unwrap();
    assert!(store.exists("target"));
    store.remove("target").unwrap();
    assert!(!store.exists("target"));
    store.remove("target").unwrap();
}

#[test]
fn test_oversized_state_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());

    // Bypass the store to plant an oversized file under its key.
    let path = dir.path().join("target.json");
    std::fs::write(&path, vec![b'x'; MAX_STATE_FILE_SIZE as usize + 1]).unwrap();

    let result = store.read("target");
    assert!(matches!(result, Err(CheckpointError::StateTooLarge { .. })));
}
