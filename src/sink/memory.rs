//! In-memory sink
//!
//! Keeps the most recent lines in a ring buffer so a host without file access
//! can still read back what was logged.

use std::collections::VecDeque;
use std::sync::RwLock;

use crate::record::{Level, LogRecord};
use crate::Result;

use super::{Lifecycle, LogContent, ReadBack, Sink};

/// Default number of lines kept
pub const DEFAULT_MEMORY_LIMIT: usize = 250;

/// Thread-safe ring buffer of `[LABEL] message` lines
pub struct MemorySink {
    lines: RwLock<VecDeque<String>>,
    limit: usize,
    level: RwLock<Level>,
}

impl MemorySink {
    /// Create a sink keeping at most `limit` lines
    pub fn new(limit: usize) -> Self {
        Self {
            lines: RwLock::new(VecDeque::with_capacity(limit.min(DEFAULT_MEMORY_LIMIT))),
            limit,
            level: RwLock::new(Level::Info),
        }
    }

    /// Get all lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .read()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Last level pushed by the dispatcher
    pub fn level(&self) -> Level {
        self.level.read().map(|l| *l).unwrap_or(Level::Info)
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.write() {
            lines.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, record: &LogRecord) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }

        let line = format!("[{}] {}", record.label(), record.message());
        if let Ok(mut lines) = self.lines.write() {
            if lines.len() >= self.limit {
                lines.pop_front();
            }
            lines.push_back(line);
        }
        Ok(())
    }

    fn set_level(&self, level: Level) {
        if let Ok(mut current) = self.level.write() {
            *current = level;
        }
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }

    fn read_back(&self) -> Option<&dyn ReadBack> {
        Some(self)
    }
}

impl Lifecycle for MemorySink {
    fn initialize(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) {}

    fn delete(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}

impl ReadBack for MemorySink {
    /// Lines joined with `\n`, always delivered inline
    fn read_content(&self) -> Result<LogContent> {
        let text = self
            .lines
            .read()
            .map(|lines| {
                lines.iter().fold(String::new(), |mut text, line| {
                    text.push_str(line);
                    text.push('\n');
                    text
                })
            })
            .unwrap_or_default();
        Ok(LogContent::Inline(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(level: Level, message: &str) -> LogRecord {
        LogRecord::new(Arc::from("app"), level, "mem", message)
    }

    #[test]
    fn test_memory_sink_formats_lines() {
        let sink = MemorySink::default();
        sink.write(&record(Level::Info, "hello")).unwrap();
        sink.write(&record(Level::Error, "boom").with_label("PROFILING-TIME"))
            .unwrap();

        assert_eq!(sink.lines(), vec!["[INFO] hello", "[PROFILING-TIME] boom"]);
        assert_eq!(
            sink.read_content().unwrap(),
            LogContent::Inline("[INFO] hello\n[PROFILING-TIME] boom\n".into())
        );
    }

    #[test]
    fn test_memory_sink_capacity() {
        let sink = MemorySink::new(3);
        for i in 0..5 {
            sink.write(&record(Level::Info, &format!("msg {}", i))).unwrap();
        }

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.lines(), vec!["[INFO] msg 2", "[INFO] msg 3", "[INFO] msg 4"]);
    }

    #[test]
    fn test_memory_sink_zero_limit() {
        let sink = MemorySink::new(0);
        sink.write(&record(Level::Info, "dropped")).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_memory_sink_lifecycle_clears() {
        let sink = MemorySink::default();
        sink.write(&record(Level::Info, "one")).unwrap();
        sink.initialize().unwrap();
        assert!(sink.is_empty());

        sink.write(&record(Level::Info, "two")).unwrap();
        sink.close();
        sink.open().unwrap();
        assert_eq!(sink.len(), 1);

        sink.delete().unwrap();
        assert_eq!(sink.read_content().unwrap(), LogContent::Inline(String::new()));
    }

    #[test]
    fn test_memory_sink_tracks_level() {
        let sink = MemorySink::default();
        sink.set_level(Level::Trace);
        assert_eq!(sink.level(), Level::Trace);
    }
}
