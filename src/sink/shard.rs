//! File naming for one logical rotating stream

use std::path::{Path, PathBuf};

/// Default file suffix
pub const DEFAULT_SUFFIX: &str = ".txt";

/// Marker between base name and suffix for merged read-back output
const MERGED_MARKER: &str = "merged";

/// Paths of the active file, its backup shards and the merged output
///
/// - active: `<dir>/<base><suffix>`
/// - backup `i`: `<dir>/<base>.<i><suffix>`
/// - merged: `<content_dir>/<base>.merged<suffix>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    dir: PathBuf,
    base_name: String,
    suffix: String,
    content_dir: PathBuf,
}

impl ShardLayout {
    /// Layout rooted at `dir`; merged output also goes to `dir`
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        let dir = dir.into();
        Self {
            content_dir: dir.clone(),
            dir,
            base_name: base_name.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_content_dir(mut self, content_dir: impl Into<PathBuf>) -> Self {
        self.content_dir = content_dir.into();
        self
    }

    pub fn set_content_dir(&mut self, content_dir: impl Into<PathBuf>) {
        self.content_dir = content_dir.into();
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// The file currently being appended to
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.base_name, self.suffix))
    }

    /// Backup shard `index` (1 is the most recent)
    pub fn backup_path(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", self.base_name, index, self.suffix))
    }

    /// Destination of a file-mode merge
    pub fn merged_path(&self) -> PathBuf {
        self.content_dir.join(format!(
            "{}.{}{}",
            self.base_name, MERGED_MARKER, self.suffix
        ))
    }

    /// Backup index encoded in `file_name`, if it names one of our shards
    pub fn backup_index(&self, file_name: &str) -> Option<usize> {
        let rest = file_name.strip_prefix(&self.base_name)?;
        let rest = rest.strip_prefix('.')?;
        let digits = rest.strip_suffix(&self.suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match digits.parse::<usize>() {
            Ok(0) | Err(_) => None,
            Ok(index) => Some(index),
        }
    }
}
