//! Timeout and transport-failure classification against byte-level upstream
//! fixtures. wiremock always answers promptly, so these tests drive raw
//! sockets instead.

use core::time::Duration;
use std::net::SocketAddr;

use anyhow::Result;
use petra::Petra;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn part_path(cache_dir: &std::path::Path, url: &str) -> std::path::PathBuf {
    let fp = petra::sha256_hex(url);
    cache_dir.join(&fp[..2]).join(format!("{fp}.part"))
}

/// An upstream that sends response headers and a partial body, then stalls
/// with the socket held open.
async fn spawn_stalling_upstream() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 1000\r\n\r\npartial",
            )
            .await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    Ok(addr)
}

#[tokio::test]
async fn slow_body_fails_with_504_response_timeout() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let addr = spawn_stalling_upstream().await?;

    let cache = Petra::builder()
        .cache_dir(tmp.path())
        .response_timeout(Duration::from_millis(100))
        .build()?;
    let url = format!("http://{addr}/slow");

    let err = cache.fetch(&url).await.expect_err("body should time out");
    assert_eq!(err.code(), Some(504));
    assert!(err.to_string().contains("response timeout of 100ms"));
    assert!(!part_path(tmp.path(), &url).exists());
    Ok(())
}

#[tokio::test]
async fn zero_response_timeout_disables_the_body_deadline() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 4\r\n\r\n")
            .await;
        // Dribble the body out slower than the default deadline would allow
        // if it were armed.
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = socket.write_all(b"bo").await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = socket.write_all(b"dy").await;
    });

    let cache = Petra::builder()
        .cache_dir(tmp.path())
        .response_timeout(Duration::ZERO)
        .build()?;
    let url = format!("http://{addr}/dribble");

    let (entry, _status) = cache.fetch(&url).await?;
    assert_eq!(std::fs::read(&entry.path)?, b"body");
    Ok(())
}

#[tokio::test]
async fn unresponsive_upstream_fails_with_504_request_timeout() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let cache = Petra::builder()
        .cache_dir(tmp.path())
        .request_timeout(Duration::from_millis(100))
        .build()?;
    let url = format!("http://{addr}/silent");

    let err = cache.fetch(&url).await.expect_err("headers should time out");
    assert_eq!(err.code(), Some(504));
    assert!(err.to_string().contains("request timeout of 100ms"));
    Ok(())
}

#[tokio::test]
async fn refused_connection_fails_with_504() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    // Bind to grab a free port, then drop the listener so connects are
    // refused.
    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;

    let cache = Petra::builder().cache_dir(tmp.path()).build()?;
    let url = format!("http://{addr}/refused");

    let err = cache.fetch(&url).await.expect_err("connect should be refused");
    assert_eq!(err.code(), Some(504));
    assert!(err.to_string().starts_with(&format!("Upstream {url} failed:")));
    Ok(())
}

#[tokio::test]
async fn mid_body_disconnect_fails_with_502_and_cleans_up() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 1000\r\n\r\npartial",
            )
            .await;
        // Drop the socket with 993 bytes still owed.
    });

    let cache = Petra::builder().cache_dir(tmp.path()).build()?;
    let url = format!("http://{addr}/truncated");

    let err = cache.fetch(&url).await.expect_err("body should be truncated");
    assert_eq!(err.code(), Some(502));
    assert!(!part_path(tmp.path(), &url).exists());
    Ok(())
}
