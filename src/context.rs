//! Error context cache
//!
//! Provides a thread-safe ring buffer that holds recent low-severity messages so
//! they can be dumped around the next error.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::record::Level;

/// Default number of messages kept for error context
pub const DEFAULT_CONTEXT_CAPACITY: usize = 1024;

/// Line written before and after every context dump
pub const CONTEXT_DELIMITER: &str = "==================================================";

/// Label carried by records emitted from a context dump
pub const CONTEXT_LABEL: &str = "[Error Context]";

/// Fixed-capacity FIFO of pending messages
///
/// When full, recording a message silently discards the oldest one.
pub struct ContextCache {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl ContextCache {
    /// Create an empty cache holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a message for the next error dump
    ///
    /// Error messages are never cached; they trigger the dump instead.
    pub fn record(&self, level: Level, message: &str) {
        if level == Level::Error || self.capacity == 0 {
            return;
        }

        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(message.to_string());
    }

    /// Dump the cached messages through `emit` and empty the cache
    ///
    /// `emit` sees the delimiter, every cached message oldest first, then the
    /// delimiter again. Nothing is emitted when the cache is empty. The cache
    /// lock is released before `emit` runs.
    pub fn flush_on_error<F>(&self, mut emit: F)
    where
        F: FnMut(&str),
    {
        let drained = std::mem::take(&mut *self.lock());
        if drained.is_empty() {
            return;
        }

        emit(CONTEXT_DELIMITER);
        for message in &drained {
            emit(message);
        }
        emit(CONTEXT_DELIMITER);
    }

    /// Drop every cached message
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Copy of the cached messages, oldest first
    pub fn entries(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Number of cached messages
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_CAPACITY)
    }
}
