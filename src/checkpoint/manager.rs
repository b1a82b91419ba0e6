//! Import session lifecycle and bookkeeping
//!
//! Owns one checkpoint from start/resume to completion or cancellation,
//! aggregates per-item outcomes, computes progress, auto-pauses after a run
//! of failures, and periodically persists itself through a
//! [`CheckpointStore`].
//!
//! Bookkeeping methods never return errors: failures are recorded as data
//! (counters and the bounded error log) and surfaced through phase
//! transitions for the orchestrator to observe. Store write failures are
//! logged and retried on the next persistence opportunity.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::checkpoint::model::{ImportCheckpoint, ImportPhase, ItemError};
use crate::checkpoint::progress::ImportProgress;
use crate::checkpoint::store::{CheckpointError, CheckpointStore};

/// Callback invoked after each bookkeeping mutation.
pub type ProgressListener = Box<dyn Fn(&ImportProgress) + Send + Sync>;

/// Import state manager configuration.
#[derive(Debug, Clone)]
pub struct ImportStateManagerConfig {
    /// Store key for this logical import target.
    pub checkpoint_key: String,
    /// Minimum interval between periodic durable writes.
    pub checkpoint_interval: Duration,
    /// Failure count that forces an auto-pause.
    pub max_errors_before_pause: u64,
    /// Whether durable writes happen at all. When false the store is never
    /// touched: in-memory bookkeeping still runs, but nothing on disk is
    /// written or removed.
    pub checkpointing_enabled: bool,
}

impl Default for ImportStateManagerConfig {
    fn default() -> Self {
        Self {
            checkpoint_key: "import".to_string(),
            checkpoint_interval: Duration::from_secs(30),
            max_errors_before_pause: 10,
            checkpointing_enabled: true,
        }
    }
}

struct Session {
    checkpoint: ImportCheckpoint,
    started: Instant,
    last_persist: Option<Instant>,
}

/// Manages one import session's checkpoint lifecycle.
pub struct ImportStateManager {
    store: Arc<dyn CheckpointStore>,
    config: ImportStateManagerConfig,
    session: Mutex<Option<Session>>,
    listener: Mutex<Option<ProgressListener>>,
}

impl ImportStateManager {
    /// Create a manager over a store. No session exists until
    /// [`ImportStateManager::start_session`] or
    /// [`ImportStateManager::resume_session`].
    pub fn new(store: Arc<dyn CheckpointStore>, config: ImportStateManagerConfig) -> Self {
        Self {
            store,
            config,
            session: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Begin a fresh session with phase `idle`, replacing any in-memory
    /// session. Returns the new session identifier.
    pub fn start_session(&self) -> String {
        let session_id = format!("import-{}", chrono::Utc::now().timestamp_millis());
        let checkpoint = ImportCheckpoint::new(&session_id);
        info!(session_id = %session_id, "Import session started");

        let mut guard = self.lock_session();
        *guard = Some(Session {
            checkpoint,
            started: Instant::now(),
            last_persist: None,
        });
        drop(guard);

        self.persist();
        session_id
    }

    /// Restore the last durable checkpoint for this import target.
    ///
    /// Returns false when no resumable session exists: no stored record, a
    /// record already marked completed or cancelled, or a record that fails
    /// validation. On success the resumed phase is forced to `paused` so the
    /// orchestrator must explicitly continue.
    pub fn resume_session(&self) -> Result<bool, CheckpointError> {
        let content = match self.store.read(&self.config.checkpoint_key)? {
            Some(content) => content,
            None => {
                debug!("No checkpoint found; nothing to resume");
                return Ok(false);
            }
        };

        let mut checkpoint: ImportCheckpoint = serde_json::from_str(&content)
            .map_err(|e| CheckpointError::DeserializationError(e.to_string()))?;

        if let Err(reason) = checkpoint.validate() {
            warn!(reason = %reason, "Stored checkpoint failed validation; refusing to resume");
            return Ok(false);
        }
        if checkpoint.completed || checkpoint.cancelled {
            debug!(
                completed = checkpoint.completed,
                cancelled = checkpoint.cancelled,
                "Stored checkpoint is terminal; refusing to resume"
            );
            return Ok(false);
        }

        checkpoint.phase = ImportPhase::Paused;
        info!(
            session_id = %checkpoint.session_id,
            cursor = ?checkpoint.cursor,
            processed = checkpoint.processed_count,
            pending = checkpoint.pending_items.len(),
            "Resumed import session from checkpoint"
        );

        let mut guard = self.lock_session();
        *guard = Some(Session {
            checkpoint,
            started: Instant::now(),
            last_persist: None,
        });
        Ok(true)
    }

    /// Transition to a new phase.
    pub fn set_phase(&self, phase: ImportPhase) {
        let mut guard = self.lock_session();
        if let Some(session) = guard.as_mut() {
            if session.checkpoint.phase != phase {
                debug!(from = %session.checkpoint.phase, to = %phase, "Import phase transition");
                session.checkpoint.phase = phase;
                if phase == ImportPhase::Completed {
                    session.checkpoint.completed = true;
                }
                session.checkpoint.touch();
            }
        }
    }

    /// Record the pagination cursor for the next fetch.
    pub fn set_cursor(&self, cursor: Option<String>) {
        let mut guard = self.lock_session();
        if let Some(session) = guard.as_mut() {
            session.checkpoint.cursor = cursor;
            session.checkpoint.touch();
        }
        drop(guard);
        self.maybe_persist();
    }

    /// Current pagination cursor.
    pub fn cursor(&self) -> Option<String> {
        self.lock_session()
            .as_ref()
            .and_then(|s| s.checkpoint.cursor.clone())
    }

    /// Append newly fetched item identifiers to the pending set.
    ///
    /// Idempotent for the pending set (re-adding a known identifier does not
    /// duplicate it) while the fetched counter always increments by the raw
    /// slice length, reflecting page throughput distinct from logical dedup.
    pub fn add_fetched_items(&self, ids: &[String]) {
        {
            let mut guard = self.lock_session();
            let Some(session) = guard.as_mut() else { return };
            session.checkpoint.fetched_count += ids.len() as u64;
            for id in ids {
                session.checkpoint.pending_items.insert(id.clone());
            }
            session.checkpoint.touch();
        }
        self.maybe_persist();
        self.notify_progress();
    }

    /// Record an item as imported.
    pub fn mark_item_imported(&self, id: &str) {
        self.mark_item(id, ItemOutcome::Imported);
    }

    /// Record an item as skipped.
    pub fn mark_item_skipped(&self, id: &str) {
        self.mark_item(id, ItemOutcome::Skipped);
    }

    /// Record an item as failed, with a bounded error log entry.
    ///
    /// Once failures reach `max_errors_before_pause`, the phase is forced to
    /// `paused` as a safety valve against a runaway failure loop burning the
    /// rate budget.
    pub fn mark_item_failed(&self, id: &str, message: impl Into<String>, retryable: bool) {
        self.mark_item(
            id,
            ItemOutcome::Failed {
                message: message.into(),
                retryable,
            },
        );
    }

    fn mark_item(&self, id: &str, outcome: ItemOutcome) {
        {
            let mut guard = self.lock_session();
            let Some(session) = guard.as_mut() else { return };
            let cp = &mut session.checkpoint;

            cp.pending_items.remove(id);
            cp.processed_count += 1;
            match outcome {
                ItemOutcome::Imported => cp.imported_count += 1,
                ItemOutcome::Skipped => cp.skipped_count += 1,
                ItemOutcome::Failed { message, retryable } => {
                    cp.failed_count += 1;
                    if retryable {
                        cp.failed_items.insert(id.to_string());
                    }
                    cp.push_error(ItemError {
                        item_id: id.to_string(),
                        message,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                        retryable,
                    });

                    if cp.failed_count >= self.config.max_errors_before_pause
                        && !cp.phase.is_terminal()
                        && cp.phase != ImportPhase::Paused
                    {
                        warn!(
                            failed = cp.failed_count,
                            threshold = self.config.max_errors_before_pause,
                            "Too many item failures; auto-pausing import"
                        );
                        cp.phase = ImportPhase::Paused;
                    }
                }
            }
            cp.touch();
        }
        self.maybe_persist();
        self.notify_progress();
    }

    /// Whether the orchestrator should fetch or process more work.
    pub fn should_continue(&self) -> bool {
        let guard = self.lock_session();
        match guard.as_ref() {
            Some(session) => {
                let cp = &session.checkpoint;
                !matches!(cp.phase, ImportPhase::Paused | ImportPhase::Failed)
                    && !cp.completed
                    && !cp.cancelled
            }
            None => false,
        }
    }

    /// Suspend the session and persist the checkpoint immediately.
    pub fn pause(&self) {
        {
            let mut guard = self.lock_session();
            if let Some(session) = guard.as_mut() {
                if !session.checkpoint.phase.is_terminal() {
                    session.checkpoint.phase = ImportPhase::Paused;
                    session.checkpoint.touch();
                }
            }
        }
        self.persist();
        info!("Import session paused");
    }

    /// Mark the session complete and, when checkpointing is enabled, remove
    /// the durable record.
    pub fn complete(&self) {
        {
            let mut guard = self.lock_session();
            if let Some(session) = guard.as_mut() {
                session.checkpoint.phase = ImportPhase::Completed;
                session.checkpoint.completed = true;
                session.checkpoint.touch();
            }
        }
        if self.config.checkpointing_enabled {
            if let Err(e) = self.store.remove(&self.config.checkpoint_key) {
                warn!(error = %e, "Failed to remove checkpoint after completion");
            } else {
                info!("Import session completed; checkpoint removed");
            }
        } else {
            info!("Import session completed");
        }
        self.notify_progress();
    }

    /// Cancel the session. The durable record is deliberately left behind so
    /// a later [`ImportStateManager::resume_session`] can pick it up.
    pub fn cancel(&self) {
        {
            let mut guard = self.lock_session();
            if let Some(session) = guard.as_mut() {
                session.checkpoint.cancelled = true;
                session.checkpoint.phase = ImportPhase::Paused;
                session.checkpoint.touch();
            }
        }
        self.persist();
        info!("Import session cancelled; checkpoint retained");
    }

    /// Mark the session as failed (not recoverable by continuation) and
    /// persist for post-mortem inspection.
    pub fn fail(&self) {
        {
            let mut guard = self.lock_session();
            if let Some(session) = guard.as_mut() {
                session.checkpoint.phase = ImportPhase::Failed;
                session.checkpoint.touch();
            }
        }
        self.persist();
    }

    /// Derived progress snapshot. Recomputed on demand, never persisted.
    pub fn get_progress(&self) -> Option<ImportProgress> {
        let guard = self.lock_session();
        guard.as_ref().map(|session| Self::progress_of(session))
    }

    /// The most recent per-item errors, oldest first, at most `limit`.
    pub fn get_recent_errors(&self, limit: usize) -> Vec<ItemError> {
        let guard = self.lock_session();
        match guard.as_ref() {
            Some(session) => {
                let errors = &session.checkpoint.errors;
                let start = errors.len().saturating_sub(limit);
                errors[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Register a callback invoked after each bookkeeping mutation.
    pub fn set_progress_listener(&self, listener: ProgressListener) {
        let mut guard = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(listener);
    }

    /// Serialize and durably write the current checkpoint now. A no-op when
    /// checkpointing is disabled.
    ///
    /// Write failures are logged, never propagated; the next persistence
    /// opportunity retries.
    pub fn persist(&self) {
        if !self.config.checkpointing_enabled {
            return;
        }
        let serialized = {
            let mut guard = self.lock_session();
            let Some(session) = guard.as_mut() else { return };
            session.last_persist = Some(Instant::now());
            serde_json::to_string_pretty(&session.checkpoint)
        };
        match serialized {
            Ok(content) => {
                if let Err(e) = self.store.write(&self.config.checkpoint_key, &content) {
                    warn!(error = %e, "Failed to persist checkpoint");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize checkpoint"),
        }
    }

    /// Persist if checkpointing is enabled and the interval has elapsed
    /// since the last durable write.
    fn maybe_persist(&self) {
        if !self.config.checkpointing_enabled {
            return;
        }
        let due = {
            let guard = self.lock_session();
            match guard.as_ref() {
                Some(session) => match session.last_persist {
                    Some(last) => last.elapsed() >= self.config.checkpoint_interval,
                    None => true,
                },
                None => false,
            }
        };
        if due {
            self.persist();
        }
    }

    fn notify_progress(&self) {
        let progress = match self.get_progress() {
            Some(p) => p,
            None => return,
        };
        let guard = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(listener) = guard.as_ref() {
            listener(&progress);
        }
    }

    fn progress_of(session: &Session) -> ImportProgress {
        let cp = &session.checkpoint;
        let elapsed = session.started.elapsed();
        let rate = ImportProgress::rate(cp.processed_count, elapsed);
        let pending = cp.pending_items.len() as u64;
        ImportProgress {
            phase: cp.phase,
            fetched: cp.fetched_count,
            processed: cp.processed_count,
            imported: cp.imported_count,
            skipped: cp.skipped_count,
            failed: cp.failed_count,
            pending,
            elapsed,
            items_per_second: rate,
            estimated_remaining: ImportProgress::estimate_remaining(pending, rate),
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum ItemOutcome {
    Imported,
    Skipped,
    Failed { message: String, retryable: bool },
}
