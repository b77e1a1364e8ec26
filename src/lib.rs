//! shardlog - process-local logging core
//!
//! Writes leveled records to size-bounded rotating files, keeps a trail of
//! recent low-severity messages to dump around errors, and reconstructs the
//! full log from its shards on demand.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod record;
pub mod sink;

pub use config::LoggerConfig;
pub use context::ContextCache;
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherLayer};
pub use error::{Error, Result};
pub use record::{Level, LogRecord, ParseLevelError};
pub use sink::{
    ConsoleSink, ContentMode, Lifecycle, LogContent, MemorySink, ReadBack, RotatingFileSink,
    Sink,
};

/// Tracing target of the library's own diagnostics
///
/// Events on this target are never forwarded by [`DispatcherLayer`].
pub const FALLBACK_TARGET: &str = "shardlog::fallback";
