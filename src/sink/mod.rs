//! Sinks: destinations for formatted log records
//!
//! Every sink implements the minimal [`Sink`] trait. Richer sinks expose their
//! extra capabilities through [`Sink::lifecycle`] and [`Sink::read_back`]
//! instead of stubbing out methods they cannot support.

mod console;
mod memory;
mod merge;
mod retention;
mod rotating;
mod shard;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::record::{Level, LogRecord};
use crate::Result;

pub use console::ConsoleSink;
pub use memory::{MemorySink, DEFAULT_MEMORY_LIMIT};
pub use merge::{MergeStats, ShardMerger};
pub use retention::prune_stale_backups;
pub use rotating::{
    RotatingFileSink, RotatingFileSinkBuilder, DEFAULT_BACKUP_COUNT, DEFAULT_MAX_FILE_SIZE,
    MIN_MAX_FILE_SIZE,
};
pub use shard::{ShardLayout, DEFAULT_SUFFIX};

/// A destination for log records
pub trait Sink: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Write one record
    fn write(&self, record: &LogRecord) -> Result<()>;

    /// React to a dispatcher level change
    fn set_level(&self, _level: Level) {}

    /// Open/close/delete lifecycle, if this sink manages a resource
    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        None
    }

    /// Content retrieval, if this sink can read back what it wrote
    fn read_back(&self) -> Option<&dyn ReadBack> {
        None
    }
}

/// Resource lifecycle of a sink
pub trait Lifecycle: Send + Sync {
    /// Prepare the sink for writing
    fn initialize(&self) -> Result<()>;

    /// Reopen the underlying resource after a `close`
    fn open(&self) -> Result<()>;

    /// Release the underlying resource
    fn close(&self);

    /// Delete what the sink has written
    fn delete(&self) -> Result<()>;
}

/// Retrieval of everything a sink has written
pub trait ReadBack: Send + Sync {
    /// Produce the current content
    fn read_content(&self) -> Result<LogContent>;
}

/// Where read-back content is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Merge into a file and return its path
    #[default]
    File,
    /// Merge into memory and return the text
    Inline,
}

/// Result of a read-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogContent {
    /// Path to a merged, self-contained file
    File(PathBuf),
    /// Full text held in memory
    Inline(String),
}

impl LogContent {
    /// Content mode this value was produced with
    pub fn mode(&self) -> ContentMode {
        match self {
            LogContent::File(_) => ContentMode::File,
            LogContent::Inline(_) => ContentMode::Inline,
        }
    }

    /// Full text, reading the merged file if needed
    pub fn text(&self) -> std::io::Result<String> {
        match self {
            LogContent::File(path) => std::fs::read_to_string(path),
            LogContent::Inline(text) => Ok(text.clone()),
        }
    }
}

impl fmt::Display for LogContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogContent::File(path) => write!(f, "{}", path.display()),
            LogContent::Inline(text) => f.write_str(text),
        }
    }
}
