//! Console sink

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::record::LogRecord;
use crate::Result;

use super::Sink;

/// Prints each record on its own line
///
/// Lines look like the file format without the trailing `\r`.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Sink printing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Sink printing to any writer
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&self, record: &LogRecord) -> Result<()> {
        let line = format!(
            "{} [{}] {}{}\n",
            record.formatted_timestamp(),
            record.label(),
            record.decorated_tag(),
            record.decorated_message()
        );
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
