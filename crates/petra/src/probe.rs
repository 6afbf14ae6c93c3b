use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Outcome of probing the cache for an entry.
pub(crate) enum Probe {
    /// A fresh entry exists on disk.
    Hit {
        accessed: SystemTime,
        expires: SystemTime,
    },
    /// No usable entry. The shard directory exists afterwards, ready for the
    /// upstream fetcher to stream into.
    Miss,
}

/// Decide hit or miss from the entry's metadata.
///
/// An entry is a hit iff it exists, is a regular file, has size > 0, and its
/// modification time (the expiry instant) is strictly in the future. Stale
/// files are reported as misses and left in place for the purger. Stat errors
/// other than `NotFound` are logged and reported as misses: the upstream
/// fetch that follows will produce a more actionable error.
pub(crate) async fn probe(shard: &Path, file: &Path) -> Probe {
    let meta = match tokio::fs::metadata(file).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Err(e) = tokio::fs::create_dir_all(shard).await {
                tracing::warn!(path = %shard.display(), error = %e, "failed to create shard directory");
            }
            return Probe::Miss;
        }
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "failed to stat cache entry, treating as miss");
            return Probe::Miss;
        }
    };

    let now = SystemTime::now();
    match (meta.accessed(), meta.modified()) {
        (Ok(accessed), Ok(expires)) if meta.is_file() && meta.len() > 0 && expires > now => {
            Probe::Hit { accessed, expires }
        }
        _ => {
            tracing::debug!(path = %file.display(), "cache entry stale or unusable, treating as miss");
            Probe::Miss
        }
    }
}
