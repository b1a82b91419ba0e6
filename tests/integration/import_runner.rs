//! End-to-end import runner tests with a scripted listing API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_importer::checkpoint::{
    CheckpointStore, FsCheckpointStore, ImportStateManager, ImportStateManagerConfig,
};
use bulk_importer::importer::{
    ImportRunError, ImportRunner, ItemDisposition, ItemProcessor, Page, PageItem, PageSource,
    RunOutcome,
};
use bulk_importer::queue::{ApiRequest, RequestQueue, RequestQueueConfig};
use bulk_importer::transport::{ApiResponse, RateLimitHints, Transport, TransportError};
use tempfile::TempDir;
use tokio::sync::Mutex;

/// Transport serving a fixed two-page listing keyed by the cursor parameter.
struct ScriptedListingTransport;

#[async_trait]
impl Transport for ScriptedListingTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        let body = if request.url.contains("cursor=p2") {
            r#"{"items":[{"id":"c"}],"next_cursor":null}"#
        } else {
            r#"{"items":[{"id":"a"},{"id":"b"}],"next_cursor":"p2"}"#
        };
        Ok(ApiResponse {
            status: 200,
            rate_limit: RateLimitHints::default(),
            body: body.to_string(),
        })
    }
}

/// Source over the scripted listing.
struct ScriptedSource;

impl PageSource for ScriptedSource {
    fn page_request(&self, cursor: Option<&str>) -> ApiRequest {
        match cursor {
            Some(c) => ApiRequest::get(format!("https://api.test/records?cursor={c}")),
            None => ApiRequest::get("https://api.test/records"),
        }
    }

    fn parse_page(&self, response: &ApiResponse) -> Result<Page, ImportRunError> {
        #[derive(serde::Deserialize)]
        struct Wire {
            items: Vec<serde_json::Value>,
            next_cursor: Option<String>,
        }
        let wire: Wire = serde_json::from_str(&response.body)
            .map_err(|e| ImportRunError::ParseError(e.to_string()))?;
        Ok(Page {
            items: wire
                .items
                .into_iter()
                .map(|v| PageItem {
                    id: v["id"].as_str().unwrap_or_default().to_string(),
                    payload: v,
                })
                .collect(),
            next_cursor: wire.next_cursor,
        })
    }
}

/// Processor recording which items it saw.
struct RecordingProcessor {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ItemProcessor for RecordingProcessor {
    async fn process(&self, item: &PageItem) -> ItemDisposition {
        self.seen.lock().await.push(item.id.clone());
        ItemDisposition::Imported
    }
}

/// Processor that fails every item.
struct FailingProcessor {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl ItemProcessor for FailingProcessor {
    async fn process(&self, _item: &PageItem) -> ItemDisposition {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        ItemDisposition::Failed {
            message: "storage rejected item".to_string(),
            retryable: false,
        }
    }
}

fn state_manager(dir: &std::path::Path, max_errors: u64) -> Arc<ImportStateManager> {
    Arc::new(ImportStateManager::new(
        Arc::new(FsCheckpointStore::new(dir)),
        ImportStateManagerConfig {
            checkpoint_key: "records".to_string(),
            checkpoint_interval: Duration::ZERO,
            max_errors_before_pause: max_errors,
            checkpointing_enabled: true,
        },
    ))
}

#[tokio::test]
async fn test_full_import_completes_and_removes_checkpoint() {
    let dir = TempDir::new().unwrap();
    let state = state_manager(dir.path(), 10);
    state.start_session();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let runner = ImportRunner::new(
        RequestQueue::new(ScriptedListingTransport, RequestQueueConfig::default()),
        ScriptedSource,
        RecordingProcessor {
            seen: Arc::clone(&seen),
        },
        Arc::clone(&state),
    );

    let outcome = runner.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let seen = seen.lock().await;
    assert_eq!(*seen, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    let progress = state.get_progress().unwrap();
    assert_eq!(progress.fetched, 3);
    assert_eq!(progress.imported, 3);
    assert_eq!(progress.pending, 0);

    // Completion removes the durable record.
    let store = FsCheckpointStore::new(dir.path());
    assert!(!store.exists("records"));
}

#[tokio::test]
async fn test_repeated_failures_pause_the_run_and_keep_checkpoint() {
    let dir = TempDir::new().unwrap();
    let state = state_manager(dir.path(), 2);
    state.start_session();

    let attempts = Arc::new(AtomicUsize::new(0));
    let runner = ImportRunner::new(
        RequestQueue::new(ScriptedListingTransport, RequestQueueConfig::default()),
        ScriptedSource,
        FailingProcessor {
            attempts: Arc::clone(&attempts),
        },
        Arc::clone(&state),
    );

    let outcome = runner.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Paused);

    // Auto-pause fired after the second failure; page two was never fetched.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!state.should_continue());

    // The checkpoint survives for a later resume.
    let store = FsCheckpointStore::new(dir.path());
    assert!(store.exists("records"));
    let resumed = state_manager(dir.path(), 10);
    assert!(resumed.resume_session().unwrap());
    assert_eq!(resumed.get_progress().unwrap().failed, 2);
}

#[tokio::test]
async fn test_resumed_run_continues_from_stored_cursor() {
    let dir = TempDir::new().unwrap();

    // First run: import page one, then simulate an interruption by pausing.
    {
        let state = state_manager(dir.path(), 10);
        state.start_session();
        state.add_fetched_items(&["a".to_string(), "b".to_string()]);
        state.mark_item_imported("a");
        state.mark_item_imported("b");
        state.set_cursor(Some("p2".to_string()));
        state.pause();
    }

    // Second run: resume and finish the listing.
    let state = state_manager(dir.path(), 10);
    assert!(state.resume_session().unwrap());
    state.set_phase(bulk_importer::checkpoint::ImportPhase::Fetching);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let runner = ImportRunner::new(
        RequestQueue::new(ScriptedListingTransport, RequestQueueConfig::default()),
        ScriptedSource,
        RecordingProcessor {
            seen: Arc::clone(&seen),
        },
        Arc::clone(&state),
    );

    let outcome = runner.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    // Only the second page was fetched and processed.
    let seen = seen.lock().await;
    assert_eq!(*seen, vec!["c".to_string()]);

    let progress = state.get_progress().unwrap();
    assert_eq!(progress.imported, 3);
    assert_eq!(progress.pending, 0);
}
