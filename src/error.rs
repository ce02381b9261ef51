/*!
 * Error types for Pixelwatch
 */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CLIENT: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the heartbeat store or ingestion pipeline
    #[error(transparent)]
    Store(#[from] pulsar::Error),

    /// Invalid command-line input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// API server failed to start or crashed
    #[error("Server error: {0}")]
    Server(String),

    /// JSON output could not be produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Client errors: the request was wrong, the system is fine
            AppError::Store(e) if e.is_client_error() => EXIT_CLIENT,
            AppError::InvalidInput(_) => EXIT_CLIENT,
            // Everything else: configuration, storage, runtime
            _ => EXIT_FATAL,
        }
    }

    /// Whether a retry might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
