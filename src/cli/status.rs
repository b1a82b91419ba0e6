//! Status command implementation

use clap::Args;
use tracing::warn;

use crate::checkpoint::{CheckpointStore, FsCheckpointStore, ImportCheckpoint};

use super::CliError;

/// Show the stored checkpoint for an import target
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Checkpoint key identifying the import target
    #[arg(long, default_value = "import")]
    pub name: String,

    /// Print the raw checkpoint JSON instead of a summary
    #[arg(long)]
    pub raw: bool,
}

impl StatusCommand {
    pub async fn execute(&self, checkpoint_dir: &std::path::Path) -> Result<(), CliError> {
        let store = FsCheckpointStore::new(checkpoint_dir);
        let content = match store.read(&self.name)? {
            Some(content) => content,
            None => {
                println!("No checkpoint found for '{}'", self.name);
                return Ok(());
            }
        };

        if self.raw {
            println!("{content}");
            return Ok(());
        }

        let checkpoint: ImportCheckpoint = serde_json::from_str(&content)
            .map_err(|e| CliError::ConfigurationError(format!("corrupt checkpoint: {e}")))?;
        if let Err(reason) = checkpoint.validate() {
            warn!(reason = %reason, "Checkpoint failed validation");
        }

        println!("Session:   {}", checkpoint.session_id);
        println!("Phase:     {}", checkpoint.phase);
        println!("Fetched:   {}", checkpoint.fetched_count);
        println!("Processed: {}", checkpoint.processed_count);
        println!("  imported {}", checkpoint.imported_count);
        println!("  skipped  {}", checkpoint.skipped_count);
        println!("  failed   {}", checkpoint.failed_count);
        println!("Pending:   {}", checkpoint.pending_items.len());
        if let Some(cursor) = &checkpoint.cursor {
            println!("Cursor:    {cursor}");
        }
        if !checkpoint.errors.is_empty() {
            println!("Recent errors:");
            for error in checkpoint.errors.iter().rev().take(5) {
                println!("  [{}] {}", error.item_id, error.message);
            }
        }
        Ok(())
    }
}
