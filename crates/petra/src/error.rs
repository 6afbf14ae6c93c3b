use core::time::Duration;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error constructing a [`Petra`](crate::Petra) instance: the cache
/// directory could not be created, read, or written.
///
/// Construction is the only synchronous failure point, and an unusable cache
/// directory is the only way it can fail; everything after it is reported per
/// operation.
#[derive(Debug, Error)]
#[error("cache directory {} is not usable: {source}", .path.display())]
pub struct BuildError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A failed [`fetch`](crate::Petra::fetch).
///
/// Upstream-side failures carry an HTTP-style classification via
/// [`code`](FetchError::code); local filesystem failures during streaming or
/// finalization carry none.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream returned a status other than 200.
    #[error("Upstream {url} failed: status code {status}")]
    Status { url: String, status: u16 },

    /// The upstream `Content-Type` is not in the configured allow-list.
    #[error("Upstream {url} failed: unsupported media-type {content_type}")]
    MediaType { url: String, content_type: String },

    /// Response headers were not received within the request timeout.
    #[error("Upstream {url} failed: request timeout of {}ms", .timeout.as_millis())]
    RequestTimeout { url: String, timeout: Duration },

    /// The response body did not complete within the response timeout.
    #[error("Upstream {url} failed: response timeout of {}ms", .timeout.as_millis())]
    ResponseTimeout { url: String, timeout: Duration },

    /// Connecting to the upstream or reading its response failed.
    #[error("Upstream {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Writing the streamed body to the temporary `.part` file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Renaming or timestamping the completed entry failed.
    #[error("failed to finalize cache entry {}: {source}", .path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// HTTP-style classification of the failure.
    ///
    /// Non-200 statuses pass through as-is; a rejected media type is `415`;
    /// timeouts and refused connections are `504`; other transport errors are
    /// `502`. Local write/finalize failures have no code.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::MediaType { .. } => Some(415),
            Self::RequestTimeout { .. } | Self::ResponseTimeout { .. } => Some(504),
            Self::Transport { source, .. } => {
                if source.is_timeout() || source.is_connect() {
                    Some(504)
                } else {
                    Some(502)
                }
            }
            Self::Write { .. } | Self::Finalize { .. } => None,
        }
    }
}
