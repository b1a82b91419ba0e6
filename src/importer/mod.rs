//! Page-by-page import orchestration
//!
//! Drives a paginated fetch through the request queue, hands each item to a
//! processor, and records every outcome in the import state manager so a
//! killed or paused run resumes from the stored cursor.
//!
//! Safety mechanisms:
//! - Maximum iteration limit to prevent infinite pagination loops
//! - Shutdown and pause checks between pages and between items
//! - Checkpoint persisted before every early exit

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::checkpoint::{ImportPhase, ImportStateManager};
use crate::queue::{ApiRequest, EnqueueOptions, RequestError, RequestQueue};
use crate::shutdown::SharedShutdown;
use crate::transport::{ApiResponse, Transport};

/// Maximum number of pages fetched in one run before aborting as a
/// suspected infinite loop.
const MAX_ITERATIONS: usize = 10_000;

/// One record returned by the remote API.
#[derive(Debug, Clone)]
pub struct PageItem {
    /// Stable identifier used for checkpoint bookkeeping.
    pub id: String,
    /// Raw record payload as returned by the API.
    pub payload: serde_json::Value,
}

/// One parsed page of results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Items on this page, in listing order.
    pub items: Vec<PageItem>,
    /// Cursor for the next page; `None` means the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// Errors surfaced by an import run.
#[derive(Debug, thiserror::Error)]
pub enum ImportRunError {
    /// A page request failed terminally in the queue
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    /// A page response could not be parsed
    #[error("Failed to parse page response: {0}")]
    ParseError(String),

    /// Pagination never terminated
    #[error("Pagination exceeded {0} iterations - possible infinite loop")]
    MaxIterationsExceeded(usize),
}

/// Outcome of processing a single item.
#[derive(Debug, Clone)]
pub enum ItemDisposition {
    /// Item was written to local storage.
    Imported,
    /// Item was already present (or deliberately ignored).
    Skipped,
    /// Item could not be imported.
    Failed {
        /// What went wrong.
        message: String,
        /// Whether a later retry pass could succeed.
        retryable: bool,
    },
}

/// Builds page requests and parses page responses for one remote listing.
pub trait PageSource: Send + Sync {
    /// Build the request for the page at `cursor` (`None` for the first page).
    fn page_request(&self, cursor: Option<&str>) -> ApiRequest;

    /// Parse a successful response into items and the next cursor.
    fn parse_page(&self, response: &ApiResponse) -> Result<Page, ImportRunError>;
}

/// Imports one item into local storage.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, item: &PageItem) -> ItemDisposition;
}

/// Result of a completed [`ImportRunner::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All pages fetched and all items processed; checkpoint removed.
    Completed,
    /// Run suspended (shutdown, explicit pause, or auto-pause); checkpoint
    /// persisted for a later resume.
    Paused,
}

/// Fetch/process loop over a [`PageSource`], resumable via checkpoints.
pub struct ImportRunner<T: Transport, S: PageSource, P: ItemProcessor> {
    queue: RequestQueue<T>,
    source: S,
    processor: P,
    state: Arc<ImportStateManager>,
    shutdown: Option<SharedShutdown>,
    enqueue_options: EnqueueOptions,
}

impl<T: Transport, S: PageSource, P: ItemProcessor> ImportRunner<T, S, P> {
    /// Build a runner over a queue, source, processor, and state manager.
    pub fn new(
        queue: RequestQueue<T>,
        source: S,
        processor: P,
        state: Arc<ImportStateManager>,
    ) -> Self {
        Self {
            queue,
            source,
            processor,
            state,
            shutdown: None,
            enqueue_options: EnqueueOptions::default(),
        }
    }

    /// Observe a shutdown coordinator between pages and items.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override the queue options used for page requests.
    pub fn with_enqueue_options(mut self, options: EnqueueOptions) -> Self {
        self.enqueue_options = options;
        self
    }

    /// Run the import until the listing is exhausted or the session pauses.
    ///
    /// The session must already be started or resumed on the state manager.
    /// On a fatal error the session is marked failed and the checkpoint is
    /// persisted before the error is returned.
    pub async fn run(&self) -> Result<RunOutcome, ImportRunError> {
        let result = self.run_inner().await;
        if result.is_err() {
            self.state.fail();
        }
        result
    }

    async fn run_inner(&self) -> Result<RunOutcome, ImportRunError> {
        for iteration in 0..MAX_ITERATIONS {
            if self.should_pause() {
                self.state.pause();
                return Ok(RunOutcome::Paused);
            }

            self.state.set_phase(ImportPhase::Fetching);
            let cursor = self.state.cursor();
            debug!(page = iteration + 1, cursor = ?cursor, "Fetching page");

            let request = self.source.page_request(cursor.as_deref());
            let response = self
                .queue
                .enqueue(request, self.enqueue_options.clone())
                .await?;
            let page = self.source.parse_page(&response)?;
            crate::metrics::record_page_fetched(page.items.len() as u64);

            let ids: Vec<String> = page.items.iter().map(|i| i.id.clone()).collect();
            self.state.add_fetched_items(&ids);

            self.state.set_phase(ImportPhase::Processing);
            for item in &page.items {
                if self.should_pause() {
                    self.state.pause();
                    return Ok(RunOutcome::Paused);
                }
                let disposition = self.processor.process(item).await;
                match disposition {
                    ItemDisposition::Imported => {
                        crate::metrics::record_item_outcome("imported");
                        self.state.mark_item_imported(&item.id);
                    }
                    ItemDisposition::Skipped => {
                        crate::metrics::record_item_outcome("skipped");
                        self.state.mark_item_skipped(&item.id);
                    }
                    ItemDisposition::Failed { message, retryable } => {
                        crate::metrics::record_item_outcome("failed");
                        debug!(item_id = %item.id, error = %message, retryable, "Item failed");
                        self.state.mark_item_failed(&item.id, message, retryable);
                    }
                }
            }

            match page.next_cursor {
                Some(next) => self.state.set_cursor(Some(next)),
                None => {
                    info!(pages = iteration + 1, "Listing exhausted; import complete");
                    self.state.complete();
                    return Ok(RunOutcome::Completed);
                }
            }
        }

        warn!(
            max_iterations = MAX_ITERATIONS,
            "Pagination did not terminate within the iteration limit"
        );
        Err(ImportRunError::MaxIterationsExceeded(MAX_ITERATIONS))
    }

    fn should_pause(&self) -> bool {
        if let Some(shutdown) = &self.shutdown {
            if shutdown.is_shutdown_requested() {
                info!("Shutdown requested; pausing import");
                return true;
            }
        }
        !self.state.should_continue()
    }
}
