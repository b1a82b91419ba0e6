//! CLI command implementations

pub mod error;
pub mod import;
pub mod status;

pub use error::CliError;
pub use import::{Cli, Commands, ImportArgs, ResumeMode};
pub use status::StatusCommand;
