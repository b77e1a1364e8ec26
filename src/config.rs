//! Configuration management for shardlog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::DEFAULT_CONTEXT_CAPACITY;
use crate::record::Level;
use crate::sink::{
    ContentMode, RotatingFileSink, DEFAULT_BACKUP_COUNT, DEFAULT_MAX_FILE_SIZE, DEFAULT_SUFFIX,
};

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Application tag written as the first bracket of every line
    #[serde(default = "default_app_tag")]
    pub app_tag: String,

    /// Directory holding the active file and its backups
    #[serde(default = "logs_dir")]
    pub log_dir: PathBuf,

    /// File name stem shared by every shard
    #[serde(default = "default_base_name")]
    pub base_name: String,

    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Size in bytes at which the active file is rotated (minimum 1024)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Number of backup shards kept
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,

    /// Directory for merged read-back output (defaults to `log_dir`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,

    /// "file" writes a merged file, "inline" returns the text
    #[serde(default)]
    pub content_mode: ContentMode,

    /// Threshold level
    #[serde(default = "default_level")]
    pub level: Level,

    /// Keep sub-threshold messages and dump them around the next error
    #[serde(default)]
    pub context_logging: bool,

    #[serde(default = "default_context_capacity")]
    pub context_capacity: usize,

    /// Most verbose level callers are expected to use
    #[serde(default = "default_client_max_level")]
    pub client_max_level: Level,

    /// Also print every record to stdout
    #[serde(default)]
    pub console: bool,

    /// Line limit of an additional in-memory sink (none when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,
}

fn default_app_tag() -> String {
    "shardlog".to_string()
}

fn default_base_name() -> String {
    "shardlog".to_string()
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_backup_count() -> usize {
    DEFAULT_BACKUP_COUNT
}

fn default_level() -> Level {
    Level::Info
}

fn default_context_capacity() -> usize {
    DEFAULT_CONTEXT_CAPACITY
}

fn default_client_max_level() -> Level {
    Level::Trace
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            app_tag: default_app_tag(),
            log_dir: logs_dir(),
            base_name: default_base_name(),
            suffix: default_suffix(),
            max_file_size: default_max_file_size(),
            backup_count: default_backup_count(),
            content_dir: None,
            content_mode: ContentMode::default(),
            level: default_level(),
            context_logging: false,
            context_capacity: default_context_capacity(),
            client_max_level: default_client_max_level(),
            console: false,
            memory_limit: None,
        }
    }
}

impl LoggerConfig {
    /// Load configuration from file, or return default if not found
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Directory receiving merged output
    pub fn effective_content_dir(&self) -> &Path {
        self.content_dir.as_deref().unwrap_or(&self.log_dir)
    }

    /// Rotating file sink described by this configuration, not yet initialized
    pub fn file_sink(&self) -> crate::Result<RotatingFileSink> {
        let mut builder = RotatingFileSink::builder(&self.log_dir, &self.base_name)
            .suffix(&self.suffix)
            .max_file_size(self.max_file_size)
            .backup_count(self.backup_count)
            .content_mode(self.content_mode);
        if let Some(content_dir) = &self.content_dir {
            builder = builder.content_dir(content_dir);
        }
        builder.build()
    }

    /// Ensure the log and content directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create logs directory")?;
        std::fs::create_dir_all(self.effective_content_dir())
            .context("Failed to create content directory")?;
        Ok(())
    }
}

/// Get the base configuration directory (~/.shardlog)
/// Falls back to ./.shardlog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!(
            target: crate::FALLBACK_TARGET,
            "Could not determine home directory, using current directory for config"
        );
        PathBuf::from(".shardlog")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".shardlog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the default logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
