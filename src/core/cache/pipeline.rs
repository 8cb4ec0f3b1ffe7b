// src/core/cache/pipeline.rs

//! The fetch-while-streaming pipeline (C3): reads a response from the
//! origin in chunks, forwards each chunk to the client as soon as it
//! arrives, and -- when the response is cacheable -- simultaneously
//! appends every chunk to a privately-owned [`EntryBuilder`]. The entry is
//! only committed into the index once the origin has confirmed the
//! response is complete; any I/O failure along the way discards the
//! partially-built entry instead of caching a truncated body.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::content_length::detect_expected_total;
use super::entry::EntryBuilder;
use super::index::Cache;
use crate::core::errors::ProxyError;

/// Outcome of streaming a single response through to the client.
pub struct StreamOutcome {
    pub bytes_forwarded: u64,
    pub cached: bool,
}

/// Writes `raw_request` to `origin`, then reads its response in chunks,
/// writing each chunk to `client` as it is read. When `cache_key` is
/// `Some`, every chunk is also buffered in an [`EntryBuilder`]; on a clean
/// end-of-response the built entry is committed into `cache` via
/// [`Cache::commit`].
///
/// "Clean end of response" is either origin EOF, or (when a `Content-Length`
/// header was found in the first chunk) having forwarded exactly as many
/// bytes as that header promised. Any read/write error aborts the whole
/// operation -- the entry under construction is simply dropped, never
/// committed, and the error propagates to the caller so it can close the
/// client connection appropriately.
pub async fn fetch_and_stream<O, C>(
    origin: &mut O,
    client: &mut C,
    raw_request: &[u8],
    cache_key: Option<&str>,
    cache: Option<&Arc<Cache>>,
    read_timeout: Duration,
    chunk_size: usize,
) -> Result<StreamOutcome, ProxyError>
where
    O: AsyncRead + AsyncWrite + Unpin,
    C: AsyncWrite + Unpin,
{
    origin
        .write_all(raw_request)
        .await
        .map_err(ProxyError::upstream_write)?;

    let mut builder = cache_key.map(EntryBuilder::new);
    let mut total_forwarded: u64 = 0;
    let mut expected_total: Option<u64> = None;
    let mut buf = vec![0u8; chunk_size];
    // Whether the response ended because it was actually complete, as
    // opposed to the origin simply closing the connection early. A
    // `Content-Length` that was never reached before EOF means the
    // response was truncated -- the spec requires this never be cached
    // (scenario 6), even though the partial bytes already reached the
    // client and the fetch itself is not an error.
    let mut truncated = false;

    loop {
        if let Some(expected) = expected_total {
            if total_forwarded >= expected {
                break;
            }
        }

        let n = match tokio::time::timeout(read_timeout, origin.read(&mut buf)).await {
            Ok(Ok(0)) => {
                if let Some(expected) = expected_total {
                    truncated = total_forwarded < expected;
                }
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ProxyError::upstream_read(e)),
            Err(_) => return Err(ProxyError::UpstreamTimeout),
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);

        if expected_total.is_none() {
            if let Some(total) = detect_expected_total(total_forwarded, &chunk) {
                trace!(expected_total = total, "content-length detected");
                expected_total = Some(total);
            }
        }

        client
            .write_all(&chunk)
            .await
            .map_err(ProxyError::client_write)?;
        total_forwarded += n as u64;

        if let Some(b) = builder.as_mut() {
            b.append_chunk(chunk);
        }
    }

    client.flush().await.map_err(ProxyError::client_write)?;

    let cached = if truncated {
        debug!("response ended before its advertised Content-Length; discarding without caching");
        false
    } else if let (Some(builder), Some(cache)) = (builder, cache) {
        let entry = builder.finish();
        debug!(chunks = entry.chunks().len(), "committing fetched entry to cache");
        cache.commit(entry).await;
        true
    } else {
        false
    };

    Ok(StreamOutcome {
        bytes_forwarded: total_forwarded,
        cached,
    })
}

/// Streams an already-cached entry's chunks straight to the client,
/// holding a [`super::entry::ReaderGuard`] for the duration so a concurrent
/// evictor can't physically destroy it mid-stream.
pub async fn stream_cached<C>(
    guard: &super::entry::ReaderGuard,
    client: &mut C,
) -> Result<u64, ProxyError>
where
    C: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    for chunk in guard.chunks() {
        client.write_all(chunk).await.map_err(ProxyError::client_write)?;
        total += chunk.len() as u64;
    }
    client.flush().await.map_err(ProxyError::client_write)?;
    Ok(total)
}
