//! Log dispatcher
//!
//! Applies the threshold, feeds the error context cache and forwards records
//! to every registered sink. A dispatcher is a plain value: build as many as
//! needed and share them with `Arc`.

mod bridge;

pub use bridge::DispatcherLayer;

use std::cell::Cell;
use std::panic::Location;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::config::LoggerConfig;
use crate::context::{ContextCache, CONTEXT_LABEL, DEFAULT_CONTEXT_CAPACITY};
use crate::error::{Error, Result};
use crate::record::{Level, LogRecord};
use crate::sink::{ConsoleSink, LogContent, MemorySink, Sink};
use crate::FALLBACK_TARGET;

/// Message written at the configured level by [`Dispatcher::initialize`]
pub const INIT_MESSAGE: &str = "init logger >>>>>>>>>";

/// Label of [`Dispatcher::time_stats`] records
pub const PROFILING_TIME_LABEL: &str = "PROFILING-TIME";

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a dispatcher call
///
/// The state mutex is not reentrant. Anything a sink does on the same thread
/// that would lead back into a dispatcher is dropped while a guard is alive.
struct DispatchGuard;

impl DispatchGuard {
    /// None when the thread already holds a guard
    fn enter() -> Option<Self> {
        DISPATCHING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(DispatchGuard)
            }
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(false));
    }
}

/// Whether the current thread is inside a dispatcher call
pub(crate) fn is_dispatching() -> bool {
    DISPATCHING.with(Cell::get)
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    app_tag: String,
    sinks: Vec<Arc<dyn Sink>>,
    level: Level,
    context_capacity: usize,
    context_logging: bool,
    client_max_level: Level,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            app_tag: "shardlog".to_string(),
            sinks: Vec::new(),
            level: Level::Info,
            context_capacity: DEFAULT_CONTEXT_CAPACITY,
            context_logging: false,
            client_max_level: Level::Trace,
        }
    }
}

impl DispatcherBuilder {
    /// Tag written as `[app]` on every line
    pub fn app_tag(mut self, app_tag: impl Into<String>) -> Self {
        self.app_tag = app_tag.into();
        self
    }

    /// Register a sink; records reach sinks in registration order
    pub fn sink(self, sink: impl Sink + 'static) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Register a sink the caller keeps a handle to
    pub fn shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn context_capacity(mut self, capacity: usize) -> Self {
        self.context_capacity = capacity;
        self
    }

    /// Enable error context logging once initialized
    pub fn context_logging(mut self, enabled: bool) -> Self {
        self.context_logging = enabled;
        self
    }

    pub fn client_max_level(mut self, level: Level) -> Self {
        self.client_max_level = level;
        self
    }

    /// Create the dispatcher and initialize every sink
    #[track_caller]
    pub fn build(self) -> Result<Dispatcher> {
        let caller = caller_tag(Location::caller());
        let dispatcher = Dispatcher {
            app_tag: Arc::from(self.app_tag),
            sinks: self.sinks,
            cache: ContextCache::new(self.context_capacity),
            state: Mutex::new(DispatchState {
                level: self.level,
                locked: false,
                client_max_level: self.client_max_level,
                context_logging: false,
                stats_origin: None,
            }),
        };

        dispatcher.initialize_as(&caller, self.level)?;
        dispatcher.enable_context_logging(self.context_logging);
        Ok(dispatcher)
    }
}

struct DispatchState {
    level: Level,
    locked: bool,
    client_max_level: Level,
    context_logging: bool,
    stats_origin: Option<Instant>,
}

impl DispatchState {
    fn caches(&self, level: Level) -> bool {
        self.context_logging
            && self.level < self.client_max_level
            && matches!(level, Level::Warn | Level::Info | Level::Debug | Level::Trace)
    }
}

/// Routes log calls to a set of sinks
pub struct Dispatcher {
    app_tag: Arc<str>,
    sinks: Vec<Arc<dyn Sink>>,
    cache: ContextCache,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Build the sinks described by `config` and initialize them
    ///
    /// The rotating file sink is always registered first, so it serves
    /// [`Dispatcher::snapshot`].
    #[track_caller]
    pub fn from_config(config: &LoggerConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .app_tag(&config.app_tag)
            .sink(config.file_sink()?)
            .level(config.level)
            .context_capacity(config.context_capacity)
            .context_logging(config.context_logging)
            .client_max_level(config.client_max_level);
        if let Some(limit) = config.memory_limit {
            builder = builder.sink(MemorySink::new(limit));
        }
        if config.console {
            builder = builder.sink(ConsoleSink::stdout());
        }

        builder.build()
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn app_tag(&self) -> &str {
        &self.app_tag
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    /// Error context cache
    pub fn context(&self) -> &ContextCache {
        &self.cache
    }

    /// Initialize every sink and start over at `level`
    ///
    /// Clears the context cache, disables context logging and unlocks the
    /// level. Unless `level` is disabled, an init record tagged with the
    /// caller's module is written. Every sink is initialized even when an
    /// earlier one fails; the first failure is returned.
    #[track_caller]
    pub fn initialize(&self, level: Level) -> Result<()> {
        let caller = caller_tag(Location::caller());
        self.initialize_as(&caller, level)
    }

    fn initialize_as(&self, caller: &str, level: Level) -> Result<()> {
        let _guard = DispatchGuard::enter();
        let mut state = self.lock_state();

        let mut first_error = None;
        for sink in &self.sinks {
            let Some(lifecycle) = sink.lifecycle() else {
                continue;
            };
            if let Err(e) = lifecycle.initialize() {
                tracing::warn!(
                    target: FALLBACK_TARGET,
                    sink = sink.name(),
                    error = %e,
                    "Failed to initialize sink"
                );
                first_error.get_or_insert(e);
            }
        }

        self.cache.reset();
        state.context_logging = false;
        state.locked = false;
        self.apply_level(&mut state, level);

        if level != Level::Disabled {
            self.dispatch(&state, caller, level, None, INIT_MESSAGE);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Log `message` at `level`
    ///
    /// Calls made from inside a sink on the same thread are dropped.
    pub fn emit(&self, tag: &str, level: Level, message: &str) {
        let Some(_guard) = DispatchGuard::enter() else {
            return;
        };
        let state = self.lock_state();
        self.dispatch(&state, tag, level, None, message);
    }

    pub fn error(&self, tag: &str, message: &str) {
        self.emit(tag, Level::Error, message);
    }

    /// Log an error message followed by `error` and its chain of sources
    pub fn error_with(&self, tag: &str, message: &str, error: &dyn std::error::Error) {
        let mut text = format!("{}\n{}", message, error);
        let mut source = error.source();
        while let Some(cause) = source {
            text.push_str("\ncaused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        self.emit(tag, Level::Error, &text);
    }

    pub fn warn(&self, tag: &str, message: &str) {
        self.emit(tag, Level::Warn, message);
    }

    pub fn info(&self, tag: &str, message: &str) {
        self.emit(tag, Level::Info, message);
    }

    pub fn debug(&self, tag: &str, message: &str) {
        self.emit(tag, Level::Debug, message);
    }

    pub fn trace(&self, tag: &str, message: &str) {
        self.emit(tag, Level::Trace, message);
    }

    /// Log the milliseconds elapsed since the first call
    ///
    /// The first call writes `<message>: 0 [msec]` and starts the clock.
    pub fn time_stats(&self, tag: &str, message: &str) {
        let Some(_guard) = DispatchGuard::enter() else {
            return;
        };
        let mut state = self.lock_state();
        let now = Instant::now();
        let text = match state.stats_origin {
            Some(origin) => format!(
                "{}: {} [msec]",
                message,
                now.duration_since(origin).as_millis()
            ),
            None => {
                state.stats_origin = Some(now);
                format!("{}: 0 [msec]", message)
            }
        };
        self.dispatch(
            &state,
            tag,
            Level::Profiling,
            Some(PROFILING_TIME_LABEL),
            &text,
        );
    }

    fn dispatch(
        &self,
        state: &DispatchState,
        tag: &str,
        level: Level,
        label: Option<&'static str>,
        message: &str,
    ) {
        if state.caches(level) {
            self.cache.record(level, message);
        }

        if level == Level::Error {
            let enabled = state.level.enables(Level::Error);
            self.cache.flush_on_error(|line| {
                if enabled {
                    let record = LogRecord::new(Arc::clone(&self.app_tag), Level::Error, "", line)
                        .with_label(CONTEXT_LABEL);
                    self.forward(&record);
                }
            });
        }

        if !state.level.enables(level) {
            return;
        }

        let mut record = LogRecord::new(Arc::clone(&self.app_tag), level, tag, message);
        if let Some(label) = label {
            record = record.with_label(label);
        }
        self.forward(&record);
    }

    fn forward(&self, record: &LogRecord) {
        for sink in &self.sinks {
            if let Err(e) = sink.write(record) {
                tracing::warn!(
                    target: FALLBACK_TARGET,
                    sink = sink.name(),
                    error = %e,
                    "Dropped log record"
                );
            }
        }
    }

    fn apply_level(&self, state: &mut DispatchState, level: Level) {
        tracing::debug!(
            target: FALLBACK_TARGET,
            from = %state.level,
            to = %level,
            "Setting log level"
        );
        state.level = level;
        for sink in &self.sinks {
            sink.set_level(level);
        }
    }

    /// Change the threshold; ignored while the level is locked
    ///
    /// Returns whether the level was applied.
    pub fn set_level(&self, level: Level) -> bool {
        let _guard = DispatchGuard::enter();
        let mut state = self.lock_state();
        if state.locked {
            return false;
        }
        self.apply_level(&mut state, level);
        true
    }

    /// Set the threshold and refuse further `set_level` calls
    pub fn lock_level(&self, level: Level) {
        let _guard = DispatchGuard::enter();
        let mut state = self.lock_state();
        self.apply_level(&mut state, level);
        state.locked = true;
    }

    pub fn unlock_level(&self) {
        self.lock_state().locked = false;
    }

    /// Current threshold
    pub fn level(&self) -> Level {
        self.lock_state().level
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().locked
    }

    /// Whether a message at `level` would be written
    pub fn is_loggable(&self, level: Level) -> bool {
        self.lock_state().level.enables(level)
    }

    /// Start or stop caching messages for error context dumps
    ///
    /// Stopping keeps what is already cached.
    pub fn enable_context_logging(&self, enabled: bool) {
        self.lock_state().context_logging = enabled;
    }

    pub fn is_context_logging(&self) -> bool {
        self.lock_state().context_logging
    }

    /// Most verbose level callers filter to on their side
    pub fn set_client_max_level(&self, level: Level) {
        self.lock_state().client_max_level = level;
    }

    /// Read back everything logged so far from the first sink that can
    pub fn snapshot(&self) -> Result<LogContent> {
        let reader = self
            .sinks
            .iter()
            .find_map(|sink| sink.read_back())
            .ok_or(Error::Unsupported("read-back"))?;
        reader.read_content()
    }

    /// Delete what every sink has written
    ///
    /// Every sink is asked even when an earlier one fails; the first failure
    /// is returned.
    pub fn delete_log(&self) -> Result<()> {
        let _guard = DispatchGuard::enter();
        let _state = self.lock_state();
        let mut first_error = None;
        for sink in &self.sinks {
            if let Some(lifecycle) = sink.lifecycle() {
                if let Err(e) = lifecycle.delete() {
                    tracing::warn!(
                        target: FALLBACK_TARGET,
                        sink = sink.name(),
                        error = %e,
                        "Failed to delete log"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Release every sink's resources
    ///
    /// Later writes fail on file sinks until [`Dispatcher::initialize`] runs again.
    pub fn close(&self) {
        let _guard = DispatchGuard::enter();
        let _state = self.lock_state();
        for sink in &self.sinks {
            if let Some(lifecycle) = sink.lifecycle() {
                lifecycle.close();
            }
        }
    }
}

fn caller_tag(location: &Location<'_>) -> String {
    Path::new(location.file())
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("unknown")
        .to_string()
}
