use core::time::Duration;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::DirEntry;

use crate::locker::PathLocks;

/// Entries whose expiry lies at least this far in the past are swept.
///
/// Because the modification time is the expiry instant, anything past this
/// threshold has been stale for a full day; readers already treat it as a
/// miss, so the sweep only reclaims disk.
const GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Remove long-stale entries from the cache tree.
///
/// Walks the cache root and its shard directories, collecting regular files
/// whose modification time predates the grace cutoff, then unlinks each one
/// under its path lock. Missing directories and files that do not follow the
/// fingerprint naming convention are tolerated.
pub(crate) async fn sweep(cache_dir: &Path, locks: &PathLocks) {
    let Some(cutoff) = SystemTime::now().checked_sub(GRACE) else {
        return;
    };

    let stale = collect_stale(cache_dir, cutoff).await;
    for path in stale {
        let _guard = locks.lock(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove stale entry");
        }
    }
}

async fn collect_stale(cache_dir: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
    let mut stale = Vec::new();
    let Ok(mut root) = tokio::fs::read_dir(cache_dir).await else {
        tracing::debug!(path = %cache_dir.display(), "cache directory unreadable, skipping sweep");
        return stale;
    };
    while let Ok(Some(item)) = root.next_entry().await {
        let Ok(meta) = item.metadata().await else {
            continue;
        };
        if meta.is_dir() {
            collect_stale_in_shard(&item, cutoff, &mut stale).await;
        } else if meta.is_file() && is_past(&meta, cutoff) {
            stale.push(item.path());
        }
    }
    stale
}

async fn collect_stale_in_shard(shard: &DirEntry, cutoff: SystemTime, stale: &mut Vec<PathBuf>) {
    let Ok(mut entries) = tokio::fs::read_dir(shard.path()).await else {
        return;
    };
    while let Ok(Some(item)) = entries.next_entry().await {
        let Ok(meta) = item.metadata().await else {
            continue;
        };
        if meta.is_file() && is_past(&meta, cutoff) {
            stale.push(item.path());
        }
    }
}

fn is_past(meta: &std::fs::Metadata, cutoff: SystemTime) -> bool {
    meta.modified().is_ok_and(|mtime| mtime < cutoff)
}
