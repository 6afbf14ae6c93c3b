use alloc::sync::Arc;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Injected pure function mapping a URL to its cache fingerprint.
///
/// The fingerprint doubles as the on-disk file name, so it should be stable
/// and filesystem-safe. URLs are hashed verbatim: two URLs differing only in
/// casing, default ports, or query-parameter order are distinct keys.
pub type HashFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Compute the SHA-256 hash of a URL, returned as a 64-char lowercase hex
/// string. This is the default fingerprint function.
#[must_use]
pub fn sha256_hex(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The two-character shard directory for a fingerprint. The shard keeps any
/// one directory from growing unbounded.
pub(crate) fn shard_dir(cache_dir: &Path, fingerprint: &str) -> PathBuf {
    cache_dir.join(fingerprint.get(..2).unwrap_or(fingerprint))
}

/// The canonical on-disk path for a fingerprint.
pub(crate) fn entry_path(cache_dir: &Path, fingerprint: &str) -> PathBuf {
    shard_dir(cache_dir, fingerprint).join(fingerprint)
}

/// The temporary sibling an in-progress body is streamed into. Shares a
/// directory with the canonical name so the final rename is atomic.
pub(crate) fn part_path(entry: &Path) -> PathBuf {
    let mut raw = entry.as_os_str().to_os_string();
    raw.push(".part");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_64_lowercase_hex_chars() {
        let fp = sha256_hex("https://example.com/a.png");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fp.to_lowercase());
    }

    #[test]
    fn sha256_hex_deterministic() {
        assert_eq!(sha256_hex("https://x/"), sha256_hex("https://x/"));
    }

    #[test]
    fn urls_are_hashed_verbatim() {
        assert_ne!(sha256_hex("https://x/a"), sha256_hex("https://x/a/"));
        assert_ne!(sha256_hex("https://x/?a=1&b=2"), sha256_hex("https://x/?b=2&a=1"));
    }

    #[test]
    fn entry_lives_under_two_char_shard() {
        let fp = sha256_hex("https://example.com/a.png");
        let entry = entry_path(Path::new("/cache"), &fp);
        assert_eq!(entry, Path::new("/cache").join(&fp[..2]).join(&fp));
    }

    #[test]
    fn short_fingerprint_shards_on_itself() {
        assert_eq!(shard_dir(Path::new("/cache"), "a"), Path::new("/cache/a"));
    }

    #[test]
    fn part_path_appends_suffix() {
        let part = part_path(Path::new("/cache/ab/abcd"));
        assert_eq!(part, Path::new("/cache/ab/abcd.part"));
    }
}
