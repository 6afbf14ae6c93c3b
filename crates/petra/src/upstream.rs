use core::time::Duration;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use futures::StreamExt;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::{CachedFile, Config, fingerprint, ttl};

/// Fetch `url` from the upstream and materialize it at `entry`.
///
/// The body is streamed into the `.part` sibling and renamed into place only
/// on full success; every failure path removes the `.part` file best-effort
/// and leaves any pre-existing entry at the canonical path untouched.
pub(crate) async fn fetch(
    client: &Client,
    config: &Config,
    url: &str,
    entry: &Path,
) -> Result<CachedFile, FetchError> {
    tracing::debug!(url, path = %entry.display(), "fetching upstream");

    let response = request(client, config.request_timeout, url).await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    if !config.media_types.is_empty() {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !config.media_types.contains(&content_type) {
            return Err(FetchError::MediaType {
                url: url.to_owned(),
                content_type,
            });
        }
    }

    // The header must be captured before the body consumes the response.
    let cache_control = response
        .headers()
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let part = fingerprint::part_path(entry);
    let streamed = stream_body(config.response_timeout, url, response, &part).await;
    if let Err(e) = streamed {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }

    match finalize(config, cache_control.as_deref(), &part, entry).await {
        Ok(cached) => Ok(cached),
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            Err(e)
        }
    }
}

/// Issue the GET and wait for response headers.
///
/// The single outer deadline covers connecting and waiting for headers; the
/// client carries no timeout of its own, so exactly one timer decides when
/// "no response headers within the request timeout" has happened.
async fn request(client: &Client, deadline: Duration, url: &str) -> Result<Response, FetchError> {
    match tokio::time::timeout(deadline, client.get(url).send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(source)) => Err(FetchError::Transport {
            url: url.to_owned(),
            source,
        }),
        Err(_) => Err(FetchError::RequestTimeout {
            url: url.to_owned(),
            timeout: deadline,
        }),
    }
}

/// Drain the response body into the `.part` file, bounded by the response
/// timeout. The timer starts only after header validation and is disarmed by
/// normal completion; a zero timeout disables it.
async fn stream_body(
    deadline: Duration,
    url: &str,
    response: Response,
    part: &Path,
) -> Result<(), FetchError> {
    let drain = drain_to(url, response, part);
    if deadline.is_zero() {
        return drain.await;
    }
    match tokio::time::timeout(deadline, drain).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::ResponseTimeout {
            url: url.to_owned(),
            timeout: deadline,
        }),
    }
}

async fn drain_to(url: &str, response: Response, part: &Path) -> Result<(), FetchError> {
    let write_err = |source| FetchError::Write {
        path: part.to_path_buf(),
        source,
    };

    let mut writer = tokio::fs::File::create(part).await.map_err(write_err)?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| FetchError::Transport {
            url: url.to_owned(),
            source,
        })?;
        writer.write_all(&chunk).await.map_err(write_err)?;
    }
    writer.flush().await.map_err(write_err)?;
    Ok(())
}

/// Publish the completed `.part` file: rename into place, then stamp the
/// access time with the creation instant and the modification time with the
/// expiry instant.
async fn finalize(
    config: &Config,
    cache_control: Option<&str>,
    part: &Path,
    entry: &Path,
) -> Result<CachedFile, FetchError> {
    tokio::fs::rename(part, entry)
        .await
        .map_err(|source| FetchError::Finalize {
            path: entry.to_path_buf(),
            source,
        })?;

    let ttl = config
        .minimum_ttl
        .max(Duration::from_secs(ttl::from_cache_control(cache_control)));
    let cached_at = SystemTime::now();
    let expires_at = cached_at + ttl;

    if let Err(source) = filetime::set_file_times(
        entry,
        FileTime::from_system_time(cached_at),
        FileTime::from_system_time(expires_at),
    ) {
        // The rename already happened; a missing stamp would leave the entry
        // with a bogus expiry, so drop it.
        let _ = tokio::fs::remove_file(entry).await;
        return Err(FetchError::Finalize {
            path: entry.to_path_buf(),
            source,
        });
    }

    Ok(CachedFile {
        path: entry.to_path_buf(),
        cached_at,
        expires_at,
    })
}
