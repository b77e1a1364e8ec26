//! Reconstruction of one logical log from its shards

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::FALLBACK_TARGET;

use super::shard::ShardLayout;
use super::{ContentMode, LogContent};

/// Size of the chunks streamed from each shard
const COPY_CHUNK: usize = 4096;

/// Counters describing one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Shards copied in full
    pub merged: usize,
    /// Shards that existed but could not be opened or read to the end
    pub skipped: usize,
    /// Bytes written to the output
    pub bytes: u64,
}

/// Concatenates the backup chain and the active file, oldest first
///
/// The merger only reads; callers hold the owning sink's lock so no rotation
/// can run while shards are being copied.
pub struct ShardMerger<'a> {
    layout: &'a ShardLayout,
    backup_count: usize,
}

impl<'a> ShardMerger<'a> {
    pub fn new(layout: &'a ShardLayout, backup_count: usize) -> Self {
        Self {
            layout,
            backup_count,
        }
    }

    /// Every possible shard path, oldest first, ending with the active file
    pub fn shard_paths(&self) -> Vec<PathBuf> {
        (1..=self.backup_count)
            .rev()
            .map(|index| self.layout.backup_path(index))
            .chain(std::iter::once(self.layout.active_path()))
            .collect()
    }

    /// Stream every existing shard into `out`
    ///
    /// Missing shards are skipped silently; unreadable ones are logged and
    /// skipped. Only a failure to write to `out` is returned.
    pub fn merge_into<W: Write>(&self, out: &mut W) -> io::Result<MergeStats> {
        let mut stats = MergeStats::default();
        for path in self.shard_paths() {
            copy_shard(&path, out, &mut stats)?;
        }
        out.flush()?;
        Ok(stats)
    }

    /// Merge into the destination selected by `mode`
    pub fn merge(&self, mode: ContentMode) -> Result<(LogContent, MergeStats)> {
        match mode {
            ContentMode::Inline => {
                let mut buffer = Vec::new();
                let stats =
                    self.merge_into(&mut buffer)
                        .map_err(|source| Error::MergeDestination {
                            path: PathBuf::new(),
                            source,
                        })?;
                let text = String::from_utf8_lossy(&buffer).into_owned();
                Ok((LogContent::Inline(text), stats))
            }
            ContentMode::File => {
                let path = self.layout.merged_path();
                let destination_error = |source| Error::MergeDestination {
                    path: path.clone(),
                    source,
                };

                let file = File::create(&path).map_err(destination_error)?;
                let mut writer = BufWriter::new(file);
                let stats = self.merge_into(&mut writer).map_err(destination_error)?;

                tracing::debug!(
                    target: FALLBACK_TARGET,
                    path = %path.display(),
                    merged = stats.merged,
                    skipped = stats.skipped,
                    bytes = stats.bytes,
                    "Merged log shards"
                );
                Ok((LogContent::File(path), stats))
            }
        }
    }
}

fn copy_shard<W: Write>(path: &Path, out: &mut W, stats: &mut MergeStats) -> io::Result<()> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            tracing::warn!(
                target: FALLBACK_TARGET,
                path = %path.display(),
                error = %e,
                "Failed to open log shard, skipping it"
            );
            stats.skipped += 1;
            return Ok(());
        }
    };

    let mut chunk = [0u8; COPY_CHUNK];
    loop {
        let read = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(
                    target: FALLBACK_TARGET,
                    path = %path.display(),
                    error = %e,
                    "Failed to read log shard, keeping what was copied"
                );
                stats.skipped += 1;
                return Ok(());
            }
        };
        out.write_all(&chunk[..read])?;
        stats.bytes += read as u64;
    }

    stats.merged += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> ShardLayout {
        ShardLayout::new(dir.path(), "app")
    }

    #[test]
    fn test_shard_paths_oldest_first() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let merger = ShardMerger::new(&layout, 3);

        let paths = merger.shard_paths();
        assert_eq!(
            paths,
            vec![
                layout.backup_path(3),
                layout.backup_path(2),
                layout.backup_path(1),
                layout.active_path(),
            ]
        );
    }

    #[test]
    fn test_merge_concatenates_oldest_to_newest() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        fs::write(layout.backup_path(2), "oldest\n").unwrap();
        fs::write(layout.backup_path(1), "middle\n").unwrap();
        fs::write(layout.active_path(), "newest\n").unwrap();

        let (content, stats) = ShardMerger::new(&layout, 2)
            .merge(ContentMode::Inline)
            .unwrap();
        assert_eq!(content, LogContent::Inline("oldest\nmiddle\nnewest\n".into()));
        assert_eq!(stats.merged, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.bytes, 21);
    }

    #[test]
    fn test_merge_without_shards_is_empty() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let (content, stats) = ShardMerger::new(&layout, 4)
            .merge(ContentMode::Inline)
            .unwrap();
        assert_eq!(content, LogContent::Inline(String::new()));
        assert_eq!(stats, MergeStats::default());
    }

    #[test]
    fn test_merge_skips_missing_middle_shard() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        fs::write(layout.backup_path(3), "three\n").unwrap();
        fs::write(layout.backup_path(1), "one\n").unwrap();

        let (content, stats) = ShardMerger::new(&layout, 3)
            .merge(ContentMode::Inline)
            .unwrap();
        assert_eq!(content.text().unwrap(), "three\none\n");
        assert_eq!(stats.merged, 2);
    }

    #[test]
    fn test_merge_ignores_shards_beyond_backup_count() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        fs::write(layout.backup_path(5), "stale\n").unwrap();
        fs::write(layout.active_path(), "live\n").unwrap();

        let (content, _) = ShardMerger::new(&layout, 2)
            .merge(ContentMode::Inline)
            .unwrap();
        assert_eq!(content.text().unwrap(), "live\n");
    }

    #[test]
    fn test_unreadable_shard_is_skipped() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        // A directory where a shard should be opens but cannot be read
        fs::create_dir(layout.backup_path(2)).unwrap();
        fs::write(layout.backup_path(1), "one\n").unwrap();
        fs::write(layout.active_path(), "active\n").unwrap();

        let (content, stats) = ShardMerger::new(&layout, 2)
            .merge(ContentMode::Inline)
            .unwrap();
        assert_eq!(content.text().unwrap(), "one\nactive\n");
        assert_eq!(stats.merged, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_file_merge_overwrites_previous_output() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        fs::write(layout.merged_path(), "stale merged output that is long\n").unwrap();
        fs::write(layout.active_path(), "fresh\n").unwrap();

        let (content, _) = ShardMerger::new(&layout, 1)
            .merge(ContentMode::File)
            .unwrap();
        assert_eq!(content, LogContent::File(layout.merged_path()));
        assert_eq!(fs::read_to_string(layout.merged_path()).unwrap(), "fresh\n");
    }

    #[test]
    fn test_file_merge_into_separate_content_dir() {
        let dir = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        let layout = layout(&dir).with_content_dir(export.path());
        fs::write(layout.backup_path(1), "a\n").unwrap();
        fs::write(layout.active_path(), "b\n").unwrap();

        let (content, _) = ShardMerger::new(&layout, 1)
            .merge(ContentMode::File)
            .unwrap();
        assert_eq!(content, LogContent::File(export.path().join("app.merged.txt")));
        assert_eq!(content.text().unwrap(), "a\nb\n");
    }

    #[test]
    fn test_file_merge_destination_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir).with_content_dir(dir.path().join("missing"));
        fs::write(layout.active_path(), "b\n").unwrap();

        let err = ShardMerger::new(&layout, 1)
            .merge(ContentMode::File)
            .unwrap_err();
        assert!(matches!(err, Error::MergeDestination { .. }));
    }
}
