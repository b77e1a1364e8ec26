use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use shardlog::{
    ContentMode, Dispatcher, DispatcherLayer, Level, Lifecycle, LogContent, LoggerConfig,
    FALLBACK_TARGET,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Write to and read back a rotating shard log", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.shardlog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the log directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log a message, or every line of stdin when no message is given
    Write {
        /// Level of the message
        #[arg(short, long, default_value = "info")]
        level: Level,

        /// Caller tag
        #[arg(short, long, default_value = "cli")]
        tag: String,

        message: Vec<String>,
    },

    /// Print the merged log (a file path, or the text with --inline)
    Dump {
        #[arg(long)]
        inline: bool,
    },

    /// Remove the active log file
    Delete,

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LoggerConfig::load_from(path)?,
        None => LoggerConfig::load()?,
    };
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }

    match cli.command {
        Command::Write {
            level,
            tag,
            message,
        } => write(&config, level, &tag, &message),
        Command::Dump { inline } => {
            if inline {
                config.content_mode = ContentMode::Inline;
            }
            dump(&config)
        }
        Command::Delete => {
            init_tracing(None);
            config.file_sink()?.delete().context("Failed to delete log file")
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Install the stderr diagnostics layer, plus the dispatcher bridge if given
fn init_tracing(dispatcher: Option<Arc<Dispatcher>>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shardlog=warn"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .with(dispatcher.map(DispatcherLayer::new))
        .init();
}

/// Open the configured log without writing an init record
///
/// Each `write` call is one-shot, so the init line would precede every message.
fn open_dispatcher(config: &LoggerConfig) -> Result<Arc<Dispatcher>> {
    let silent = LoggerConfig {
        level: Level::Disabled,
        ..config.clone()
    };
    let dispatcher = Dispatcher::from_config(&silent)
        .with_context(|| format!("Failed to open log in {}", config.log_dir.display()))?;
    dispatcher.set_level(config.level);
    Ok(Arc::new(dispatcher))
}

fn write(config: &LoggerConfig, level: Level, tag: &str, message: &[String]) -> Result<()> {
    let dispatcher = open_dispatcher(config)?;
    init_tracing(Some(Arc::clone(&dispatcher)));

    if message.is_empty() {
        write_lines(&dispatcher, level, tag, io::stdin().lock())?;
    } else {
        dispatcher.emit(tag, level, &message.join(" "));
    }

    dispatcher.close();
    Ok(())
}

/// Log every line of `input`, returning how many were read
fn write_lines(
    dispatcher: &Dispatcher,
    level: Level,
    tag: &str,
    input: impl BufRead,
) -> Result<usize> {
    let mut count = 0usize;
    for line in input.lines() {
        let line = line.context("Failed to read stdin")?;
        dispatcher.emit(tag, level, &line);
        count += 1;
    }
    tracing::debug!(target: FALLBACK_TARGET, lines = count, "Finished reading stdin");
    Ok(count)
}

fn dump(config: &LoggerConfig) -> Result<()> {
    init_tracing(None);
    config.ensure_directories()?;

    let sink = config.file_sink()?;
    let (content, stats) = sink.merge().context("Failed to merge log shards")?;
    if stats.skipped > 0 {
        tracing::warn!(skipped = stats.skipped, "Some log shards could not be read");
    }

    match content {
        LogContent::File(path) => println!("{}", path.display()),
        LogContent::Inline(text) => print!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn config(dir: &TempDir, level: Level) -> LoggerConfig {
        LoggerConfig {
            app_tag: "cli".into(),
            log_dir: dir.path().join("logs"),
            base_name: "app".into(),
            level,
            ..LoggerConfig::default()
        }
    }

    fn log_lines(config: &LoggerConfig) -> Vec<String> {
        let text = std::fs::read_to_string(config.log_dir.join("app.txt")).unwrap();
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_open_dispatcher_writes_no_init_record() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Level::Debug);

        let dispatcher = open_dispatcher(&config).unwrap();
        assert_eq!(dispatcher.level(), Level::Debug);
        dispatcher.debug("t", "first");
        dispatcher.close();

        let lines = log_lines(&config);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("] first"));
        assert!(!lines[0].contains("init logger"));
    }

    #[test]
    fn test_write_lines_logs_only_input() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Level::Debug);
        let dispatcher = open_dispatcher(&config).unwrap();

        let subscriber =
            tracing_subscriber::registry().with(DispatcherLayer::new(Arc::clone(&dispatcher)));
        let count = tracing::subscriber::with_default(subscriber, || {
            write_lines(&dispatcher, Level::Info, "in", Cursor::new("alpha\nbeta\n")).unwrap()
        });
        dispatcher.close();

        assert_eq!(count, 2);
        let lines = log_lines(&config);
        assert_eq!(lines.len(), 2, "unexpected records: {:?}", lines);
        assert!(lines[0].contains(" [INFO] [cli][in][Pid:"));
        assert!(lines[0].ends_with("] alpha"));
        assert!(lines[1].ends_with("] beta"));
    }

    #[test]
    fn test_write_lines_respects_threshold() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, Level::Warn);
        let dispatcher = open_dispatcher(&config).unwrap();

        let count = write_lines(&dispatcher, Level::Info, "in", Cursor::new("quiet\n")).unwrap();
        dispatcher.error("in", "loud");
        dispatcher.close();

        assert_eq!(count, 1);
        let lines = log_lines(&config);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("] loud"));
    }
}
