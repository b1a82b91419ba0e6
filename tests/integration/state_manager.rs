//! Integration tests for import session lifecycle across process restarts

use std::sync::Arc;
use std::time::Duration;

use bulk_importer::checkpoint::{
    CheckpointError, CheckpointStore, FsCheckpointStore, ImportPhase, ImportStateManager,
    ImportStateManagerConfig,
};
use tempfile::TempDir;

fn manager(dir: &std::path::Path, key: &str) -> ImportStateManager {
    ImportStateManager::new(
        Arc::new(FsCheckpointStore::new(dir)),
        ImportStateManagerConfig {
            checkpoint_key: key.to_string(),
            checkpoint_interval: Duration::ZERO,
            max_errors_before_pause: 10,
            checkpointing_enabled: true,
        },
    )
}

#[test]
fn test_interrupted_session_resumes_with_counters_intact() {
    let dir = TempDir::new().unwrap();

    // First "process": import part of the listing, then drop mid-flight.
    {
        let mgr = manager(dir.path(), "orders");
        mgr.start_session();
        mgr.set_phase(ImportPhase::Fetching);
        mgr.set_cursor(Some("cursor-3".to_string()));
        mgr.add_fetched_items(&[
            "o-1".to_string(),
            "o-2".to_string(),
            "o-3".to_string(),
            "o-4".to_string(),
        ]);
        mgr.set_phase(ImportPhase::Processing);
        mgr.mark_item_imported("o-1");
        mgr.mark_item_skipped("o-2");
        mgr.mark_item_failed("o-3", "validation failed", false);
        mgr.persist();
    }

    // Second "process": resume and verify everything came back.
    let mgr = manager(dir.path(), "orders");
    assert!(mgr.resume_session().unwrap());
    assert_eq!(mgr.cursor().as_deref(), Some("cursor-3"));

    let progress = mgr.get_progress().unwrap();
    assert_eq!(progress.phase, ImportPhase::Paused);
    assert_eq!(progress.fetched, 4);
    assert_eq!(progress.processed, 3);
    assert_eq!(progress.imported, 1);
    assert_eq!(progress.skipped, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.pending, 1);

    let errors = mgr.get_recent_errors(10);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].item_id, "o-3");

    // Resuming lands paused; continuing is an explicit transition.
    assert!(!mgr.should_continue());
    mgr.set_phase(ImportPhase::Processing);
    assert!(mgr.should_continue());
}

#[test]
fn test_corrupt_checkpoint_surfaces_as_error() {
    let dir = TempDir::new().unwrap();
    let store = FsCheckpointStore::new(dir.path());
    store.write("orders", "{not valid json").unwrap();

    let mgr = manager(dir.path(), "orders");
    let result = mgr.resume_session();
    assert!(matches!(
        result,
        Err(CheckpointError::DeserializationError(_))
    ));
}

#[test]
fn test_sessions_with_distinct_keys_do_not_collide() {
    let dir = TempDir::new().unwrap();

    let orders = manager(dir.path(), "orders");
    orders.start_session();
    orders.add_fetched_items(&["o-1".to_string()]);
    orders.persist();

    let users = manager(dir.path(), "users");
    users.start_session();
    users.add_fetched_items(&["u-1".to_string(), "u-2".to_string()]);
    users.persist();

    let orders_again = manager(dir.path(), "orders");
    assert!(orders_again.resume_session().unwrap());
    assert_eq!(orders_again.get_progress().unwrap().fetched, 1);

    let users_again = manager(dir.path(), "users");
    assert!(users_again.resume_session().unwrap());
    assert_eq!(users_again.get_progress().unwrap().fetched, 2);
}

#[test]
fn test_progress_summary_is_human_readable() {
    let dir = TempDir::new().unwrap();
    let mgr = manager(dir.path(), "orders");
    mgr.start_session();
    mgr.add_fetched_items(&["a".to_string(), "b".to_string()]);
    mgr.mark_item_imported("a");

    let summary = mgr.get_progress().unwrap().format_summary();
    assert!(summary.contains("1"), "summary was: {summary}");
}
