//! Resumable import state: durable checkpoints, session lifecycle, progress
//!
//! A checkpoint is the single source of truth for an import session: cursor,
//! counters, pending identifiers, and a bounded error log. The store writes
//! it atomically under an advisory lock; the manager owns the in-memory copy
//! and decides when to persist.

pub mod manager;
pub mod model;
pub mod progress;
pub mod store;

pub use manager::{ImportStateManager, ImportStateManagerConfig, ProgressListener};
pub use model::{ImportCheckpoint, ImportPhase, ItemError, MAX_ERROR_LOG, SCHEMA_VERSION};
pub use progress::ImportProgress;
pub use store::{CheckpointError, CheckpointStore, FsCheckpointStore, MAX_STATE_FILE_SIZE};
