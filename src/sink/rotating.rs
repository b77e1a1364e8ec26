//! Size-bounded rotating file sink
//!
//! Appends formatted records to `<dir>/<base><suffix>`. When a write leaves the
//! active file at or above the size limit, the file is shifted into the backup
//! chain (`<base>.1<suffix>` newest ... `<base>.N<suffix>` oldest) and a fresh
//! active file is opened. All file state lives behind one mutex, so writes,
//! rotations and read-backs on the same sink never interleave.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::record::{Level, LogRecord};
use crate::FALLBACK_TARGET;

use super::merge::{MergeStats, ShardMerger};
use super::retention::prune_stale_backups;
use super::shard::{ShardLayout, DEFAULT_SUFFIX};
use super::{ContentMode, Lifecycle, LogContent, ReadBack, Sink};

/// Default size limit of the active file (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Smallest accepted size limit; smaller values are ignored
pub const MIN_MAX_FILE_SIZE: u64 = 1024;

/// Default number of backup shards
pub const DEFAULT_BACKUP_COUNT: usize = 4;

/// Builder for [`RotatingFileSink`]
#[derive(Debug, Clone)]
pub struct RotatingFileSinkBuilder {
    dir: PathBuf,
    base_name: String,
    suffix: String,
    content_dir: Option<PathBuf>,
    max_file_size: u64,
    backup_count: usize,
    content_mode: ContentMode,
}

impl RotatingFileSinkBuilder {
    /// Start a sink writing `<dir>/<base_name>.txt`
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
            content_dir: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            backup_count: DEFAULT_BACKUP_COUNT,
            content_mode: ContentMode::File,
        }
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Directory for merged read-back output (defaults to the log directory)
    pub fn content_dir(mut self, content_dir: impl Into<PathBuf>) -> Self {
        self.content_dir = Some(content_dir.into());
        self
    }

    /// Size limit in bytes; values below [`MIN_MAX_FILE_SIZE`] are ignored
    pub fn max_file_size(mut self, max_file_size: u64) -> Self {
        if max_file_size >= MIN_MAX_FILE_SIZE {
            self.max_file_size = max_file_size;
        }
        self
    }

    pub fn backup_count(mut self, backup_count: usize) -> Self {
        self.backup_count = backup_count;
        self
    }

    pub fn content_mode(mut self, content_mode: ContentMode) -> Self {
        self.content_mode = content_mode;
        self
    }

    /// Validate the naming and create the sink
    ///
    /// The sink must still be initialized before it accepts writes.
    pub fn build(self) -> Result<RotatingFileSink> {
        if self.base_name.trim().is_empty() {
            return Err(Error::Configuration("empty log file base name".into()));
        }
        if self.base_name.contains(['/', '\\']) {
            return Err(Error::Configuration(format!(
                "log file base name '{}' must not contain path separators",
                self.base_name
            )));
        }

        let mut layout = ShardLayout::new(self.dir, self.base_name).with_suffix(self.suffix);
        if let Some(content_dir) = self.content_dir {
            layout.set_content_dir(content_dir);
        }

        tracing::debug!(
            target: FALLBACK_TARGET,
            path = %layout.active_path().display(),
            max_file_size = self.max_file_size,
            backup_count = self.backup_count,
            "Created rotating file sink"
        );

        Ok(RotatingFileSink {
            name: format!("file:{}", layout.base_name()),
            state: Mutex::new(RotationState {
                layout,
                max_file_size: self.max_file_size,
                backup_count: self.backup_count,
                content_mode: self.content_mode,
                file: None,
                active_size: 0,
                initialized: false,
                level: Level::Info,
            }),
        })
    }
}

/// File state owned by one sink
struct RotationState {
    layout: ShardLayout,
    max_file_size: u64,
    backup_count: usize,
    content_mode: ContentMode,
    file: Option<File>,
    active_size: u64,
    initialized: bool,
    level: Level,
}

impl RotationState {
    fn open_active(&mut self) -> Result<()> {
        let path = self.layout.active_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        self.active_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(file);
        Ok(())
    }

    fn close_active(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_data() {
                tracing::debug!(target: FALLBACK_TARGET, error = %e, "Failed to sync log file on close");
            }
        }
    }

    /// Reopen the active file if it vanished behind an open handle
    fn heal(&mut self) {
        if self.file.is_none() || self.layout.active_path().exists() {
            return;
        }

        tracing::warn!(
            target: FALLBACK_TARGET,
            path = %self.layout.active_path().display(),
            "Active log file disappeared, recreating it"
        );
        self.close_active();
        if let Err(e) = self.open_active() {
            tracing::warn!(target: FALLBACK_TARGET, error = %e, "Failed to recreate log file");
        }
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        self.heal();
        if self.file.is_none() {
            self.open_active()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Err(Error::NotInitialized);
        };

        file.write_all(bytes)?;
        file.flush()?;

        self.active_size = self.on_disk_size();
        if self.active_size >= self.max_file_size {
            tracing::debug!(
                target: FALLBACK_TARGET,
                size = self.active_size,
                max_file_size = self.max_file_size,
                "Log file reached its size limit"
            );
            self.rotate();
        }
        Ok(())
    }

    fn on_disk_size(&self) -> u64 {
        fs::metadata(self.layout.active_path())
            .map(|m| m.len())
            .or_else(|_| match &self.file {
                Some(file) => file.metadata().map(|m| m.len()),
                None => Ok(self.active_size),
            })
            .unwrap_or(self.active_size)
    }

    /// Shift the active file into the backup chain and start a fresh one
    ///
    /// Best effort: every failed step is logged and the rest still runs.
    fn rotate(&mut self) {
        self.close_active();

        let active = self.layout.active_path();
        if self.backup_count == 0 {
            remove_if_exists(&active);
        } else {
            remove_if_exists(&self.layout.backup_path(self.backup_count));
            for index in (1..self.backup_count).rev() {
                rename_if_exists(
                    &self.layout.backup_path(index),
                    &self.layout.backup_path(index + 1),
                );
            }
            rename_if_exists(&active, &self.layout.backup_path(1));
        }

        match self.open_active() {
            Ok(()) => tracing::debug!(
                target: FALLBACK_TARGET,
                backup_count = self.backup_count,
                size = self.active_size,
                "Rotated log file"
            ),
            Err(e) => tracing::warn!(
                target: FALLBACK_TARGET,
                error = %e,
                "Failed to reopen log file after rotation, will retry on next write"
            ),
        }
    }
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            target: FALLBACK_TARGET,
            path = %path.display(),
            error = %e,
            "Failed to delete log shard"
        ),
    }
}

fn rename_if_exists(from: &Path, to: &Path) {
    if !from.exists() {
        return;
    }
    if let Err(e) = fs::rename(from, to) {
        tracing::warn!(
            target: FALLBACK_TARGET,
            from = %from.display(),
            to = %to.display(),
            error = %e,
            "Failed to rename log shard"
        );
    }
}

/// Sink appending to a size-bounded, rotating set of files
pub struct RotatingFileSink {
    name: String,
    state: Mutex<RotationState>,
}

impl RotatingFileSink {
    /// Start building a sink for `<dir>/<base_name>`
    pub fn builder(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> RotatingFileSinkBuilder {
        RotatingFileSinkBuilder::new(dir, base_name)
    }

    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Naming of the files this sink manages
    pub fn layout(&self) -> ShardLayout {
        self.lock().layout.clone()
    }

    pub fn active_path(&self) -> PathBuf {
        self.lock().layout.active_path()
    }

    /// Size of the active file after the last write
    pub fn active_size(&self) -> u64 {
        self.lock().active_size
    }

    pub fn max_file_size(&self) -> u64 {
        self.lock().max_file_size
    }

    pub fn backup_count(&self) -> usize {
        self.lock().backup_count
    }

    pub fn content_mode(&self) -> ContentMode {
        self.lock().content_mode
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Last level pushed by the dispatcher
    pub fn level(&self) -> Level {
        self.lock().level
    }

    /// Change the size limit; returns false and keeps the old limit when
    /// `max_file_size` is below [`MIN_MAX_FILE_SIZE`]
    pub fn set_max_file_size(&self, max_file_size: u64) -> bool {
        if max_file_size < MIN_MAX_FILE_SIZE {
            return false;
        }
        self.lock().max_file_size = max_file_size;
        true
    }

    pub fn set_content_dir(&self, content_dir: impl Into<PathBuf>) {
        self.lock().layout.set_content_dir(content_dir);
    }

    pub fn set_content_mode(&self, content_mode: ContentMode) {
        self.lock().content_mode = content_mode;
    }

    /// Append an already formatted line
    pub fn write_line(&self, line: &str) -> Result<()> {
        self.lock().append(line.as_bytes())
    }

    /// Merge every shard and report what was copied
    pub fn merge(&self) -> Result<(LogContent, MergeStats)> {
        let state = self.lock();
        ShardMerger::new(&state.layout, state.backup_count).merge(state.content_mode)
    }
}

impl Sink for RotatingFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, record: &LogRecord) -> Result<()> {
        let line = record.format_line()?;
        self.write_line(&line)
    }

    fn set_level(&self, level: Level) {
        self.lock().level = level;
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }

    fn read_back(&self) -> Option<&dyn ReadBack> {
        Some(self)
    }
}

impl Lifecycle for RotatingFileSink {
    fn initialize(&self) -> Result<()> {
        let mut state = self.lock();
        let dir = state.layout.dir().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| Error::CreateDirectory { path: dir, source })?;

        match prune_stale_backups(&state.layout, state.backup_count) {
            Ok(0) => {}
            Ok(count) => tracing::info!(
                target: FALLBACK_TARGET,
                count,
                "Removed log shards beyond the backup count"
            ),
            Err(e) => tracing::warn!(target: FALLBACK_TARGET, error = %e, "Failed to scan for stale log shards"),
        }

        state.close_active();
        state.open_active()?;
        state.initialized = true;
        Ok(())
    }

    fn open(&self) -> Result<()> {
        let mut state = self.lock();
        if state.file.is_none() {
            state.open_active()?;
        }
        state.initialized = true;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        state.close_active();
        state.initialized = false;
    }

    /// Removes the active file only; backups stay in place
    fn delete(&self) -> Result<()> {
        let state = self.lock();
        match fs::remove_file(state.layout.active_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ReadBack for RotatingFileSink {
    fn read_content(&self) -> Result<LogContent> {
        self.merge().map(|(content, _)| content)
    }
}
