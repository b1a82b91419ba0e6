//! CLI error types and conversions

use crate::checkpoint::CheckpointError;
use crate::importer::ImportRunError;
use crate::queue::RequestError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Request execution error
    #[error("request error: {0}")]
    RequestError(#[from] RequestError),

    /// Checkpoint persistence error
    #[error("checkpoint error: {0}")]
    CheckpointError(#[from] CheckpointError),

    /// Import run error
    #[error("import error: {0}")]
    ImportError(#[from] ImportRunError),

    /// Local storage I/O error
    #[error("storage error: {0}")]
    StorageError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
