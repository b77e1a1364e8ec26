//! Backup chain retention
//!
//! Handles cleanup of shards numbered past the configured backup count.

use std::fs;
use std::io;

use super::shard::ShardLayout;
use crate::FALLBACK_TARGET;

/// Remove backup shards whose index is greater than `backup_count`
///
/// Such shards are left behind when a stream is reopened with a smaller
/// backup count. Returns the number of files deleted.
pub fn prune_stale_backups(layout: &ShardLayout, backup_count: usize) -> io::Result<usize> {
    if !layout.dir().exists() {
        return Ok(0);
    }

    let mut deleted_count = 0;

    for entry in fs::read_dir(layout.dir())? {
        let entry = entry?;
        let path = entry.path();

        let index = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| layout.backup_index(n))
        {
            Some(index) => index,
            None => continue,
        };

        if index <= backup_count || !path.is_file() {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => deleted_count += 1,
            Err(e) => tracing::warn!(
                target: FALLBACK_TARGET,
                path = %path.display(),
                error = %e,
                "Failed to remove stale log shard"
            ),
        }
    }

    Ok(deleted_count)
}
