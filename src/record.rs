//! Log levels and the immutable record passed through the pipeline

use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout used on every formatted line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Log level, ordered by verbosity
///
/// Declaration order matches the numeric value so the derived ordering is
/// the numeric one: `Profiling < Disabled < Error < ... < Trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Pseudo-level used only for stats output
    Profiling,
    /// Nothing is logged
    Disabled,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    /// Numeric value of the level
    pub fn value(&self) -> i8 {
        match self {
            Level::Profiling => -2,
            Level::Disabled => -1,
            Level::Error => 0,
            Level::Warn => 1,
            Level::Info => 2,
            Level::Debug => 3,
            Level::Trace => 4,
        }
    }

    /// Level for a numeric value, if there is one
    pub fn from_value(value: i8) -> Option<Self> {
        match value {
            -2 => Some(Level::Profiling),
            -1 => Some(Level::Disabled),
            0 => Some(Level::Error),
            1 => Some(Level::Warn),
            2 => Some(Level::Info),
            3 => Some(Level::Debug),
            4 => Some(Level::Trace),
            _ => None,
        }
    }

    /// Upper-case label written between brackets on each line
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Profiling => "PROFILING",
            Level::Disabled => "DISABLED",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    /// Whether a threshold of `self` lets a message at `level` through
    pub fn enables(&self, level: Level) -> bool {
        *self != Level::Disabled && level != Level::Disabled && *self >= level
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name or number is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<i8>() {
            return Level::from_value(value).ok_or_else(|| ParseLevelError(s.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "profiling" => Ok(Level::Profiling),
            "disabled" | "off" => Ok(Level::Disabled),
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// A single log record
///
/// Built once by the dispatcher and handed to every sink by reference.
#[derive(Debug, Clone)]
pub struct LogRecord {
    timestamp: DateTime<Local>,
    level: Level,
    label: Cow<'static, str>,
    app_tag: Arc<str>,
    tag: String,
    pid: u32,
    tid: u64,
    message: String,
}

impl LogRecord {
    /// Create a record stamped with the current time, process and thread
    pub fn new(
        app_tag: Arc<str>,
        level: Level,
        tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            label: Cow::Borrowed(level.as_str()),
            app_tag,
            tag: tag.into(),
            pid: std::process::id(),
            tid: current_thread_id(),
            message: message.into(),
        }
    }

    /// Replace the bracketed label (defaults to the level name)
    pub fn with_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn app_tag(&self) -> &str {
        &self.app_tag
    }

    /// Caller tag, possibly empty
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `[app][caller]`
    pub fn decorated_tag(&self) -> String {
        format!("[{}][{}]", self.app_tag, self.tag)
    }

    /// `[Pid:p][Tid:t] message`
    pub fn decorated_message(&self) -> String {
        format!("[Pid:{}][Tid:{}] {}", self.pid, self.tid, self.message)
    }

    /// Timestamp rendered as `yyyy-MM-dd HH:mm:ss.SSS`
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Render the record as one `\r\n`-terminated file line
    pub fn format_line(&self) -> crate::Result<String> {
        let mut line = String::with_capacity(64 + self.tag.len() + self.message.len());
        write!(
            line,
            "{} [{}] [{}][{}][Pid:{}][Tid:{}] {}\r\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.label,
            self.app_tag,
            self.tag,
            self.pid,
            self.tid,
            self.message
        )?;
        Ok(line)
    }
}

/// Per-process sequential thread id of the caller
///
/// Ids start at 1 and are handed out on a thread's first call.
pub fn current_thread_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn app() -> Arc<str> {
        Arc::from("app")
    }

    #[test]
    fn test_level_ordering_matches_values() {
        let levels = [
            Level::Profiling,
            Level::Disabled,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ];
        for pair in levels.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].value() < pair[1].value());
        }
        for level in levels {
            assert_eq!(Level::from_value(level.value()), Some(level));
        }
        assert_eq!(Level::from_value(5), None);
    }

    #[test]
    fn test_level_enables() {
        assert!(Level::Info.enables(Level::Error));
        assert!(Level::Info.enables(Level::Info));
        assert!(!Level::Info.enables(Level::Debug));
        assert!(Level::Error.enables(Level::Profiling));
        assert!(!Level::Disabled.enables(Level::Error));
        assert!(!Level::Disabled.enables(Level::Profiling));
        assert!(!Level::Trace.enables(Level::Disabled));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("3".parse::<Level>().unwrap(), Level::Debug);
        assert_eq!("-1".parse::<Level>().unwrap(), Level::Disabled);
        assert!("verbose".parse::<Level>().is_err());
        assert!("9".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::ERROR), Level::Error);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Trace);
    }

    #[test]
    fn test_format_line_layout() {
        let timestamp = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::milliseconds(42);
        let record = LogRecord::new(app(), Level::Warn, "net", "socket closed")
            .with_timestamp(timestamp);

        let expected = format!(
            "2024-03-09 07:05:01.042 [WARN] [app][net][Pid:{}][Tid:{}] socket closed\r\n",
            record.pid(),
            record.tid()
        );
        assert_eq!(record.format_line().unwrap(), expected);
    }

    #[test]
    fn test_format_line_custom_label_and_empty_tag() {
        let record =
            LogRecord::new(app(), Level::Error, "", "=====").with_label("[Error Context]");
        let line = record.format_line().unwrap();
        assert!(line.contains(" [[Error Context]] [app][][Pid:"));
        assert!(line.ends_with("] =====\r\n"));
        assert_eq!(record.level(), Level::Error);
    }

    #[test]
    fn test_decorations() {
        let record = LogRecord::new(app(), Level::Info, "main", "hello");
        assert_eq!(record.decorated_tag(), "[app][main]");
        assert_eq!(
            record.decorated_message(),
            format!("[Pid:{}][Tid:{}] hello", std::process::id(), record.tid())
        );
        assert_eq!(record.label(), "INFO");
    }

    #[test]
    fn test_thread_ids_differ_between_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, current_thread_id());
        assert!(here >= 1 && there >= 1);
    }
}
