//! Error types for the logging core

use std::io;
use std::path::PathBuf;

/// Result type for logging core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside sinks and the dispatcher
///
/// Most of these never reach the caller of a log call: the dispatcher reports
/// them on the fallback channel and carries on. Read-back is the exception.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to create the log directory
    #[error("Failed to create log directory at {path}: {source}")]
    CreateDirectory {
        /// The directory that could not be created
        path: PathBuf,
        /// The underlying error
        source: io::Error,
    },

    /// Failed to open the active log file
    #[error("Failed to open log file {path}: {source}")]
    Open {
        /// The file that could not be opened
        path: PathBuf,
        /// The underlying error
        source: io::Error,
    },

    /// The merged output could not be created or written
    #[error("Failed to write merged log at {path}: {source}")]
    MergeDestination {
        /// Destination of the merge (empty for in-memory merges)
        path: PathBuf,
        /// The underlying error
        source: io::Error,
    },

    /// A record could not be formatted into a line
    #[error("Failed to encode log record: {0}")]
    Encoding(#[from] std::fmt::Error),

    /// Write attempted before `initialize` or after `close`
    #[error("Sink is not initialized")]
    NotInitialized,

    /// No sink offers the requested capability
    #[error("No configured sink supports {0}")]
    Unsupported(&'static str),

    /// Invalid sink or dispatcher configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}
