//! # Bulk Importer Library
//!
//! A resilient engine for bulk-importing records from rate-limited,
//! cursor-paginated HTTP APIs. Designed to survive throttling, transient
//! failures, connectivity loss, and process interruption without losing
//! progress.
//!
//! ## Features
//!
//! - **Priority Request Queue**: High/normal/low tiers with FIFO order
//!   within each tier and bounded concurrency
//! - **Token-Bucket Rate Limiting**: Continuous refill, reconciled against
//!   server rate-limit headers
//! - **Circuit Breaker**: Trips on repeated failures, probes recovery with
//!   half-open requests
//! - **Offline Buffering**: Queued work survives connectivity loss and
//!   replays on reconnect
//! - **Retry with Backoff**: Jittered exponential backoff, server-directed
//!   delays for throttling responses
//! - **Resumable Checkpoints**: Atomic, lock-protected JSON state files so
//!   an interrupted import continues where it stopped
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulk_importer::queue::{ApiRequest, EnqueueOptions, Priority, RequestQueue, RequestQueueConfig};
//! use bulk_importer::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RequestQueue::new(HttpTransport::new()?, RequestQueueConfig::default());
//!
//! let response = queue
//!     .enqueue(
//!         ApiRequest::get("https://api.example.com/records?limit=100"),
//!         EnqueueOptions::priority(Priority::High),
//!     )
//!     .await?;
//! println!("fetched {} bytes", response.body.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`queue`] - Priority request queue with rate limiting, circuit
//!   breaking, offline buffering, and retry
//! - [`transport`] - HTTP execution behind the [`transport::Transport`] trait
//! - [`checkpoint`] - Durable import state with pause/resume/cancel
//! - [`importer`] - Page-by-page fetch orchestration over a [`importer::PageSource`]
//! - [`shutdown`] - Graceful Ctrl+C coordination
//! - [`metrics`] - Prometheus observability

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Durable import state with pause/resume/cancel
pub mod checkpoint;

/// CLI command implementations
pub mod cli;

/// Page-by-page import orchestration
pub mod importer;

/// Observability metrics
pub mod metrics;

/// Priority request queue with rate limiting and retry
pub mod queue;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// HTTP transport behind a mockable trait
pub mod transport;

// Re-export commonly used types
pub use checkpoint::{ImportCheckpoint, ImportPhase, ImportProgress, ImportStateManager};
pub use importer::{ImportRunner, PageSource, RunOutcome};
pub use queue::{ApiRequest, EnqueueOptions, Priority, RequestError, RequestQueue};
pub use transport::{ApiResponse, HttpTransport, Transport};
