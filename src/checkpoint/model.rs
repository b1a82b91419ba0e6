//! Checkpoint record for resumable imports
//!
//! The durable unit of resumability: everything needed to continue a
//! multi-thousand-item import after a pause or crash without re-fetching or
//! re-importing already-processed records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Current checkpoint schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum per-item error records retained in the checkpoint.
/// Keeps the serialized record bounded on a badly failing import.
pub const MAX_ERROR_LOG: usize = 100;

/// Phase of an import session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    /// Session created, nothing fetched yet.
    Idle,
    /// Fetching pages from the remote service.
    Fetching,
    /// Processing fetched items into local storage.
    Processing,
    /// Reconciling local deletions against the remote service.
    Unsaving,
    /// All work finished.
    Completed,
    /// Suspended; resumable.
    Paused,
    /// Terminal failure; not recoverable by continuation.
    Failed,
}

impl ImportPhase {
    /// Whether the phase permits further work.
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportPhase::Completed | ImportPhase::Failed)
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImportPhase::Idle => "idle",
            ImportPhase::Fetching => "fetching",
            ImportPhase::Processing => "processing",
            ImportPhase::Unsaving => "unsaving",
            ImportPhase::Completed => "completed",
            ImportPhase::Paused => "paused",
            ImportPhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A recorded per-item failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemError {
    /// Identifier of the item that failed.
    pub item_id: String,
    /// Failure description.
    pub message: String,
    /// Unix-millisecond timestamp of the failure.
    pub timestamp: i64,
    /// Whether the item is worth retrying in a later run.
    pub retryable: bool,
}

/// Durable snapshot of an import session.
///
/// Invariants maintained by [`crate::checkpoint::ImportStateManager`]:
/// `processed_count == imported_count + skipped_count + failed_count`, and
/// `pending_items` never contains an identifier already reflected in
/// `processed_count`. The identifier sets are serialized directly, so the
/// persisted form and the in-memory form are the same collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportCheckpoint {
    /// Schema version for forward-compatibility checks on load.
    pub schema_version: String,
    /// Session identifier.
    pub session_id: String,
    /// Unix-millisecond timestamp when the session started.
    pub started_at: i64,
    /// Unix-millisecond timestamp of the last mutation.
    pub updated_at: i64,
    /// Current phase.
    pub phase: ImportPhase,
    /// Pagination cursor for the next fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Raw items fetched across all pages (counts duplicates).
    pub fetched_count: u64,
    /// Items that reached a terminal outcome.
    pub processed_count: u64,
    /// Items imported into local storage.
    pub imported_count: u64,
    /// Items skipped (already present, filtered, etc.).
    pub skipped_count: u64,
    /// Items that failed processing.
    pub failed_count: u64,
    /// Fetched-but-not-yet-processed item identifiers.
    pub pending_items: BTreeSet<String>,
    /// Failed-but-retryable item identifiers.
    pub failed_items: BTreeSet<String>,
    /// Bounded log of per-item errors, oldest first.
    pub errors: Vec<ItemError>,
    /// Terminal flag: the session finished successfully.
    pub completed: bool,
    /// Terminal flag: the session was cancelled.
    pub cancelled: bool,
}

impl ImportCheckpoint {
    /// Create a fresh checkpoint for a new session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            session_id: session_id.into(),
            started_at: now,
            updated_at: now,
            phase: ImportPhase::Idle,
            cursor: None,
            fetched_count: 0,
            processed_count: 0,
            imported_count: 0,
            skipped_count: 0,
            failed_count: 0,
            pending_items: BTreeSet::new(),
            failed_items: BTreeSet::new(),
            errors: Vec::new(),
            completed: false,
            cancelled: false,
        }
    }

    /// Record a per-item error, pruning the log to [`MAX_ERROR_LOG`] entries.
    pub fn push_error(&mut self, error: ItemError) {
        self.errors.push(error);
        if self.errors.len() > MAX_ERROR_LOG {
            let drain_count = self.errors.len() - MAX_ERROR_LOG;
            self.errors.drain(0..drain_count);
        }
    }

    /// Stamp the record as mutated now.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Validate counter coherence. Used by tests and on load.
    pub fn validate(&self) -> Result<(), String> {
        let outcomes = self.imported_count + self.skipped_count + self.failed_count;
        if self.processed_count != outcomes {
            return Err(format!(
                "processed_count ({}) != imported ({}) + skipped ({}) + failed ({})",
                self.processed_count, self.imported_count, self.skipped_count, self.failed_count
            ));
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "schema version mismatch: expected {SCHEMA_VERSION}, found {}",
                self.schema_version
            ));
        }
        Ok(())
    }
}
