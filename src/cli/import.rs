//! Import command implementation

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

use crate::checkpoint::{
    CheckpointStore, FsCheckpointStore, ImportPhase, ImportStateManager, ImportStateManagerConfig,
};
use crate::importer::{
    ImportRunError, ImportRunner, ItemDisposition, ItemProcessor, Page, PageItem, PageSource,
    RunOutcome,
};
use crate::queue::{
    ApiRequest, CircuitBreakerConfig, EnqueueOptions, RequestQueue, RequestQueueConfig,
};
use crate::shutdown::SharedShutdown;
use crate::transport::{ApiResponse, HttpTransport};

use super::{CliError, StatusCommand};

/// Maximum allowed concurrency to prevent self-inflicted throttling
const MAX_CONCURRENCY: usize = 32;

/// Maximum allowed page size accepted by typical listing APIs
const MAX_PAGE_SIZE: usize = 1000;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse and validate the requests-per-minute budget
fn parse_rate_limit(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("rate limit must be at least 1 request per minute".to_string());
    }
    Ok(value)
}

/// Parse and validate the listing page size
fn parse_page_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 || value > MAX_PAGE_SIZE {
        return Err(format!("page size must be between 1 and {MAX_PAGE_SIZE}"));
    }
    Ok(value)
}

/// Map the global flags onto per-request enqueue options.
fn enqueue_options(cli: &Cli) -> EnqueueOptions {
    EnqueueOptions {
        max_retries: cli.max_retries,
        ..EnqueueOptions::default()
    }
}

/// Resume modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Ignore any stored checkpoint and start fresh (checkpoint kept)
    Off,
    /// Resume from a stored checkpoint if one exists
    On,
    /// Delete any stored checkpoint and start fresh
    Reset,
}

impl FromStr for ResumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ResumeMode::Off),
            "on" => Ok(ResumeMode::On),
            "reset" => Ok(ResumeMode::Reset),
            _ => Err(format!(
                "Invalid resume mode: {s}. Valid options: on, off, reset"
            )),
        }
    }
}

/// Bulk importer for paginated, rate-limited HTTP APIs
#[derive(Debug, Parser)]
#[command(name = "bulk-importer", version, about)]
pub struct Cli {
    /// Directory holding checkpoint state files
    #[arg(long, global = true, default_value = ".import-state")]
    pub checkpoint_dir: PathBuf,

    /// Maximum retry attempts per request
    #[arg(long, global = true, default_value_t = 3)]
    pub max_retries: u32,

    /// Requests-per-minute budget for the token bucket
    #[arg(long, global = true, default_value = "60", value_parser = parse_rate_limit)]
    pub rate_limit: u32,

    /// Maximum concurrent in-flight requests
    #[arg(long, global = true, default_value = "3", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Prometheus scrape endpoint address (metrics disabled when omitted)
    #[arg(long, global = true)]
    pub metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch a paginated listing and import its items into local storage
    Import(ImportArgs),
    /// Show the stored checkpoint for an import target
    Status(StatusCommand),
}

/// Arguments for the import command
#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Listing endpoint URL (pages requested as <url>?cursor=..&limit=..)
    #[arg(long)]
    pub url: String,

    /// Checkpoint key identifying this import target
    #[arg(long, default_value = "import")]
    pub name: String,

    /// Output directory for imported items
    #[arg(long, default_value = "imported")]
    pub out_dir: PathBuf,

    /// Items requested per page
    #[arg(long, default_value = "100", value_parser = parse_page_size)]
    pub page_size: usize,

    /// Resume behavior: on, off, or reset
    #[arg(long, default_value = "on")]
    pub resume: ResumeMode,

    /// Seconds between periodic checkpoint writes
    #[arg(long, default_value_t = 30)]
    pub checkpoint_interval_secs: u64,

    /// Consecutive-failure count that auto-pauses the import
    #[arg(long, default_value_t = 10)]
    pub max_errors: u64,
}

/// Wire format of one listing page.
#[derive(Debug, Deserialize)]
struct ListingPage {
    items: Vec<serde_json::Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// [`PageSource`] over a cursor-paginated JSON listing endpoint.
struct JsonListingSource {
    url: String,
    page_size: usize,
}

impl PageSource for JsonListingSource {
    fn page_request(&self, cursor: Option<&str>) -> ApiRequest {
        let url = match cursor {
            Some(c) => format!("{}?cursor={}&limit={}", self.url, c, self.page_size),
            None => format!("{}?limit={}", self.url, self.page_size),
        };
        ApiRequest::get(url).with_header("accept", "application/json")
    }

    fn parse_page(&self, response: &ApiResponse) -> Result<Page, ImportRunError> {
        let listing: ListingPage = serde_json::from_str(&response.body)
            .map_err(|e| ImportRunError::ParseError(format!("invalid listing page: {e}")))?;

        let mut items = Vec::with_capacity(listing.items.len());
        for value in listing.items {
            let id = match value.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(ImportRunError::ParseError(
                        "listing item is missing an 'id' field".to_string(),
                    ))
                }
            };
            items.push(PageItem { id, payload: value });
        }
        Ok(Page {
            items,
            next_cursor: listing.next_cursor,
        })
    }
}

/// Writes each item to `<out_dir>/<id>.json`, skipping existing files.
struct FsItemWriter {
    out_dir: PathBuf,
}

impl FsItemWriter {
    fn item_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.out_dir.join(format!("{safe}.json"))
    }
}

#[async_trait::async_trait]
impl ItemProcessor for FsItemWriter {
    async fn process(&self, item: &PageItem) -> ItemDisposition {
        let path = self.item_path(&item.id);
        if path.exists() {
            return ItemDisposition::Skipped;
        }
        let content = match serde_json::to_string_pretty(&item.payload) {
            Ok(c) => c,
            Err(e) => {
                return ItemDisposition::Failed {
                    message: format!("failed to serialize item: {e}"),
                    retryable: false,
                }
            }
        };
        match tokio::fs::write(&path, content).await {
            Ok(()) => ItemDisposition::Imported,
            Err(e) => ItemDisposition::Failed {
                message: format!("failed to write {}: {e}", path.display()),
                retryable: true,
            },
        }
    }
}

impl ImportArgs {
    /// Run the import to completion or pause.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| {
            CliError::StorageError(format!(
                "failed to create output directory {}: {e}",
                self.out_dir.display()
            ))
        })?;

        let store = Arc::new(FsCheckpointStore::new(&cli.checkpoint_dir));
        if self.resume == ResumeMode::Reset {
            store.remove(&self.name)?;
            info!(name = %self.name, "Reset: removed stored checkpoint");
        }

        let state = Arc::new(ImportStateManager::new(
            store,
            ImportStateManagerConfig {
                checkpoint_key: self.name.clone(),
                checkpoint_interval: Duration::from_secs(self.checkpoint_interval_secs),
                max_errors_before_pause: self.max_errors,
                // Off runs without touching the store, so an existing
                // checkpoint survives the run untouched.
                checkpointing_enabled: self.resume != ResumeMode::Off,
            },
        ));

        let resumed = self.resume == ResumeMode::On && state.resume_session()?;
        if resumed {
            // Resume lands in the paused phase; continuing is explicit.
            state.set_phase(ImportPhase::Fetching);
            info!(name = %self.name, "Continuing from stored checkpoint");
        } else {
            let session_id = state.start_session();
            info!(name = %self.name, session_id = %session_id, "Starting new import session");
        }

        state.set_progress_listener(Box::new(|progress| {
            if progress.processed > 0 && progress.processed % 100 == 0 {
                info!(
                    processed = progress.processed,
                    imported = progress.imported,
                    skipped = progress.skipped,
                    failed = progress.failed,
                    rate = format!("{:.1}/s", progress.items_per_second),
                    "Import progress"
                );
            }
        }));

        let transport = HttpTransport::new()
            .map_err(|e| CliError::ConfigurationError(format!("HTTP client: {e}")))?;
        let queue = RequestQueue::new(
            transport,
            RequestQueueConfig {
                max_concurrent: cli.concurrency,
                max_tokens: cli.rate_limit,
                window: Duration::from_secs(60),
                circuit_breaker: CircuitBreakerConfig::default(),
                ..RequestQueueConfig::default()
            },
        );

        let runner = ImportRunner::new(
            queue,
            JsonListingSource {
                url: self.url.clone(),
                page_size: self.page_size,
            },
            FsItemWriter {
                out_dir: self.out_dir.clone(),
            },
            Arc::clone(&state),
        )
        .with_shutdown(shutdown)
        .with_enqueue_options(enqueue_options(cli));

        let outcome = runner.run().await?;
        if let Some(progress) = state.get_progress() {
            info!("{}", progress.format_summary());
        }
        match outcome {
            RunOutcome::Completed => info!(name = %self.name, "Import completed"),
            RunOutcome::Paused => {
                warn!(
                    name = %self.name,
                    "Import paused; run again with --resume on to continue"
                );
            }
        }
        Ok(())
    }
}
