#![doc = include_str!("../README.md")]

extern crate alloc;

use alloc::sync::Arc;
use core::time::Duration;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tokio::task::JoinHandle;

mod error;
mod fingerprint;
mod locker;
mod probe;
mod purge;
mod ttl;
mod upstream;

pub use error::{BuildError, FetchError};
pub use fingerprint::{HashFn, sha256_hex};

use locker::PathLocks;
use probe::Probe;

/// Whether a fetched entry was served from disk or from the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A fresh entry was found on disk.
    Hit,
    /// The entry was fetched from the upstream and written to disk.
    Miss,
}

impl core::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Hit => f.write_str("cached"),
            Self::Miss => f.write_str("fetched"),
        }
    }
}

/// A cache entry on local disk: the file path plus its lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    /// Canonical path of the entry under the cache directory.
    pub path: PathBuf,
    /// Instant the entry was written, stored as the file's access time.
    pub cached_at: SystemTime,
    /// Instant the entry becomes stale, stored as the file's modification
    /// time.
    pub expires_at: SystemTime,
}

/// Immutable configuration, fixed at construction. The `User-Agent` lives on
/// the HTTP client itself.
pub(crate) struct Config {
    pub(crate) cache_dir: PathBuf,
    pub(crate) minimum_ttl: Duration,
    pub(crate) purge_stale_interval: Duration,
    pub(crate) media_types: Vec<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) hash: HashFn,
}

/// Builder for a [`Petra`] cache.
///
/// Defaults:
/// - `cache_dir`: `{OS temp}/petra`
/// - `minimum_ttl`: 7 days
/// - `purge_stale_interval`: 1 hour (`Duration::ZERO` disables the sweep)
/// - `media_types`: empty — any media type is accepted
/// - `request_timeout`: 10 seconds
/// - `response_timeout`: 10 seconds (`Duration::ZERO` disables)
/// - `user_agent`: `lovell/petra`
/// - `hash`: SHA-256 lowercase hex ([`sha256_hex`])
#[must_use]
pub struct PetraBuilder {
    cache_dir: PathBuf,
    minimum_ttl: Duration,
    purge_stale_interval: Duration,
    media_types: Vec<String>,
    request_timeout: Duration,
    response_timeout: Duration,
    user_agent: String,
    hash: HashFn,
}

impl PetraBuilder {
    fn new() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("petra"),
            minimum_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            purge_stale_interval: Duration::from_secs(60 * 60),
            media_types: Vec::new(),
            request_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
            user_agent: "lovell/petra".to_owned(),
            hash: Arc::new(sha256_hex),
        }
    }

    /// Override the root of the on-disk cache.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Floor on entry expiry: `effective ttl = max(minimum_ttl, parsed
    /// Cache-Control)`.
    pub fn minimum_ttl(mut self, ttl: Duration) -> Self {
        self.minimum_ttl = ttl;
        self
    }

    /// Period of the background stale sweep. `Duration::ZERO` disables it;
    /// [`purge_stale`](Petra::purge_stale) remains available.
    pub fn purge_stale_interval(mut self, interval: Duration) -> Self {
        self.purge_stale_interval = interval;
        self
    }

    /// Allow-list of upstream `Content-Type` values. Empty means no
    /// filtering. Values are matched verbatim against the raw header.
    pub fn media_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Deadline to obtain response headers from the upstream.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Deadline, measured from header receipt, for the response body to
    /// complete. `Duration::ZERO` disables it.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// `User-Agent` sent upstream. ASCII control characters are stripped, so
    /// the value is always a valid header value.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent
            .into()
            .chars()
            .filter(|c| !c.is_ascii_control())
            .collect();
        self
    }

    /// Inject the pure function mapping a URL to its cache fingerprint.
    pub fn hash(mut self, hash: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.hash = Arc::new(hash);
        self
    }

    /// Build the cache: create the cache directory (tolerating existence),
    /// verify read and write access to it, construct the HTTP client, and
    /// schedule the background purger.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when the cache directory cannot be created,
    /// read, or written — the only way construction can fail. All later
    /// failures are reported per operation.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime (the purger is scheduled
    /// with `tokio::spawn`).
    pub fn build(self) -> Result<Petra, BuildError> {
        let cache_dir_err = |source| BuildError {
            path: self.cache_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.cache_dir).map_err(cache_dir_err)?;
        verify_access(&self.cache_dir).map_err(cache_dir_err)?;

        // The user agent is sanitized at the setter and no fallible client
        // option is configured. Connect and header deadlines are enforced
        // together by the fetcher's single request timeout, not here.
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()
            .expect("HTTP client construction with a sanitized user agent cannot fail");

        let inner = Arc::new(Inner {
            config: Config {
                cache_dir: self.cache_dir,
                minimum_ttl: self.minimum_ttl,
                purge_stale_interval: self.purge_stale_interval,
                media_types: self.media_types,
                request_timeout: self.request_timeout,
                response_timeout: self.response_timeout,
                hash: self.hash,
            },
            client,
            locks: PathLocks::new(),
            purger: Mutex::new(None),
        });

        if !inner.config.purge_stale_interval.is_zero() {
            let handle = spawn_purger(&inner);
            *inner.purger.lock().expect("purger handle poisoned") = Some(handle);
        }

        Ok(Petra { inner })
    }
}

/// Verify the directory is both readable and writable.
fn verify_access(dir: &Path) -> io::Result<()> {
    std::fs::read_dir(dir)?;
    let probe = dir.join(".petra-write-check");
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)?;
    Ok(())
}

struct Inner {
    config: Config,
    client: reqwest::Client,
    locks: PathLocks,
    purger: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn stop_purger(&self) {
        if let Ok(mut slot) = self.purger.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_purger();
    }
}

/// An embeddable, filesystem-backed reverse HTTP cache.
///
/// [`fetch`](Self::fetch) resolves a URL to a local file containing its
/// response body; [`purge`](Self::purge) removes the entry for a URL. Cloning
/// is cheap and all clones share one cache and one single-flight lock table.
///
/// Concurrent fetches of the same URL are collapsed: the first caller fetches
/// from the upstream while the rest queue on the entry's path lock, and each
/// of them observes a filesystem hit once the holder has materialized the
/// entry. Single-flight coordination is process-local.
#[derive(Clone)]
pub struct Petra {
    inner: Arc<Inner>,
}

impl Petra {
    /// Returns a builder pre-configured with the defaults documented on
    /// [`PetraBuilder`].
    pub fn builder() -> PetraBuilder {
        PetraBuilder::new()
    }

    /// Resolve `url` to a local file containing its response body.
    ///
    /// On a hit the entry's recorded timestamps are returned as-is; on a miss
    /// the body is fetched from the upstream, streamed to disk, and stamped
    /// with `cached_at = now` and `expires_at = now + max(minimum_ttl,
    /// Cache-Control ttl)`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the upstream fetch fails; see
    /// [`FetchError::code`] for the classification. A failed fetch leaves no
    /// `.part` file behind and does not disturb pre-existing entries.
    #[tracing::instrument(level = "debug", skip(self), fields(status))]
    pub async fn fetch(&self, url: &str) -> Result<(CachedFile, CacheStatus), FetchError> {
        let config = &self.inner.config;
        let fp = (config.hash)(url);
        let shard = fingerprint::shard_dir(&config.cache_dir, &fp);
        let entry = fingerprint::entry_path(&config.cache_dir, &fp);

        // Held across both the probe and any upstream materialization, so a
        // waiter served after a successful fetch observes a hit.
        let _guard = self.inner.locks.lock(&entry).await;

        if let Probe::Hit { accessed, expires } = probe::probe(&shard, &entry).await {
            tracing::Span::current().record("status", "hit");
            return Ok((
                CachedFile {
                    path: entry,
                    cached_at: accessed,
                    expires_at: expires,
                },
                CacheStatus::Hit,
            ));
        }

        tracing::Span::current().record("status", "miss");
        let cached = upstream::fetch(&self.inner.client, config, url, &entry).await?;
        Ok((cached, CacheStatus::Miss))
    }

    /// Remove the cached entry for `url`.
    ///
    /// Missing entries are silent successes; `purge` never fails observably
    /// and is idempotent.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn purge(&self, url: &str) {
        let config = &self.inner.config;
        let fp = (config.hash)(url);
        let entry = fingerprint::entry_path(&config.cache_dir, &fp);

        let _guard = self.inner.locks.lock(&entry).await;
        if let Err(e) = tokio::fs::remove_file(&entry).await
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::debug!(path = %entry.display(), error = %e, "failed to remove cache entry");
        }
    }

    /// Sweep entries whose expiry lies more than a day in the past.
    ///
    /// This is the same sweep the background purger runs every
    /// `purge_stale_interval`; it is exposed for hosts that want to reclaim
    /// disk on their own schedule.
    pub async fn purge_stale(&self) {
        purge::sweep(&self.inner.config.cache_dir, &self.inner.locks).await;
    }

    /// Stop the background purger. Cached entries stay on disk and all other
    /// operations keep working. Dropping the last clone stops it too.
    pub fn stop(&self) {
        self.inner.stop_purger();
    }
}

fn spawn_purger(inner: &Arc<Inner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let period = inner.config.purge_stale_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // sweep happens one full period after construction.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            purge::sweep(&inner.config.cache_dir, &inner.locks).await;
        }
    })
}
