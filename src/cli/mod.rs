//! CLI module
//!
//! Provides:
//! - Argument parsing (`serve`, account administration, `init-config`)
//! - Logging setup
//! - Command dispatch onto the metered service

pub mod args;
pub mod dispatch;
pub mod logging;

// Re-exports
pub use args::{Cli, Command, UserCommand};
pub use dispatch::{exit_code, run};
pub use logging::init_logging;

use meterml_core::CoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error(transparent)]
    Service(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// The request was valid but the service refused it (unknown account, bad amount)
pub const EXIT_REJECTED: i32 = 3;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;
