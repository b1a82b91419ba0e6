//! Durable checkpoint persistence
//!
//! Implements atomic file writes and advisory locking so a checkpoint is
//! never observed half-written, even across crash or concurrent processes.

use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum allowed checkpoint file size (10 MB) to prevent memory exhaustion
/// from a corrupt or adversarial state file.
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },
}

/// Durable key-value persistence for a single logical checkpoint record per
/// import target. Supplied by the host environment.
pub trait CheckpointStore: Send + Sync {
    /// Write `content` for `key`, replacing any existing record.
    fn write(&self, key: &str, content: &str) -> Result<(), CheckpointError>;

    /// Read the record for `key`, or None when absent.
    fn read(&self, key: &str) -> Result<Option<String>, CheckpointError>;

    /// Remove the record for `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), CheckpointError>;

    /// Whether a record exists for `key`.
    fn exists(&self, key: &str) -> bool;
}

/// File-system checkpoint store: one JSON file per key under a directory.
///
/// Writes are atomic (temp file + fsync + rename + parent fsync) and
/// coordinated across processes with an advisory `.lock` file.
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record file for a key. Keys are sanitized so a logical
    /// import target (often a URL) maps to a stable filename.
    fn record_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }

    fn lock_path(&self, path: &Path) -> PathBuf {
        path.with_extension("lock")
    }

    fn open_lock_file(&self, path: &Path) -> Result<std::fs::File, CheckpointError> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path(path))
            .map_err(|e| CheckpointError::LockError(format!("failed to open lock file: {e}")))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn write(&self, key: &str, content: &str) -> Result<(), CheckpointError> {
        let path = self.record_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::IoError(e.to_string()))?;
        }

        let lock_file = self.open_lock_file(&path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| CheckpointError::LockError(format!("failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| CheckpointError::IoError(format!("failed to create temp file: {e}")))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| CheckpointError::IoError(format!("failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| CheckpointError::IoError(format!("failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CheckpointError::IoError(format!("failed to sync temp file: {e}")))?;

        temp_file
            .persist(&path)
            .map_err(|e| CheckpointError::IoError(format!("failed to persist temp file: {e}")))?;

        // Fsync the parent directory so the rename itself is durable.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(path = %path.display(), bytes = content.len(), "Checkpoint written");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, CheckpointError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let lock_file = self.open_lock_file(&path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| CheckpointError::LockError(format!("failed to acquire read lock: {e}")))?;

        let metadata =
            std::fs::metadata(&path).map_err(|e| CheckpointError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(CheckpointError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| CheckpointError::IoError(e.to_string()))?;
        Ok(Some(contents))
    }

    fn remove(&self, key: &str) -> Result<(), CheckpointError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(());
        }

        // Deleting the record contends with concurrent readers the same way
        // writes do.
        let lock_file = self.open_lock_file(&path)?;
        let mut lock = RwLock::new(lock_file);
        {
            let _guard = lock.write().map_err(|e| {
                CheckpointError::LockError(format!("failed to acquire write lock: {e}"))
            })?;
            std::fs::remove_file(&path).map_err(|e| CheckpointError::IoError(e.to_string()))?;
        }
        drop(lock);

        let lock_path = self.lock_path(&path);
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!(error = %e, "Failed to remove checkpoint lock file");
            }
        }
        debug!(path = %path.display(), "Checkpoint removed");
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.record_path(key).exists()
    }
}
