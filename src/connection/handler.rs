// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a
//! single client connection: read one request, route it through the cache
//! core, relay to (or stream from) the origin, and close.
//!
//! Unlike the teacher's persistent RESP connections, a forward proxy
//! connection here is single-shot: the source this is grounded in serves
//! exactly one request per accepted socket, so there is no frame loop to
//! run -- just a linear pipeline with an early return on the first error.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::guard::ConnectionGuard;
use crate::core::cache::fetch_and_stream;
use crate::core::errors::ProxyError;
use crate::core::http::{parse_request, read_request, ParsedRequest};
use crate::core::metrics;
use crate::core::state::ServerState;
use std::sync::Arc;

/// Manages the full lifecycle of one accepted client connection.
pub struct ConnectionHandler {
    socket: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session_id: u64,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        session_id: u64,
    ) -> Self {
        Self {
            socket,
            addr,
            state,
            session_id,
        }
    }

    /// Runs the request/response cycle for this connection. Errors are
    /// logged here rather than propagated further up: a failed connection
    /// should never bring down the accept loop.
    ///
    /// `shutdown_rx` is taken as a plain local parameter rather than a
    /// struct field: racing it against `serve_one_request` inside
    /// `select!` needs the two branches to borrow disjoint state, and
    /// `serve_one_request` already needs `&mut self` for the socket.
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let _guard = ConnectionGuard::new(self.addr);

        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!(session = self.session_id, addr = %self.addr, "connection dropped for shutdown before a request arrived");
            }
            result = self.serve_one_request() => {
                if let Err(e) = result {
                    warn!(session = self.session_id, addr = %self.addr, error = %e, "request failed");
                }
            }
        }
    }

    async fn serve_one_request(&mut self) -> Result<(), ProxyError> {
        let config = self.state.config_snapshot();

        let raw = match read_request(
            &mut self.socket,
            config.initial_buffer_bytes,
            config.max_buffer_bytes,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => return self.reject(e).await,
        };

        let parsed = match parse_request(raw) {
            Ok(parsed) => parsed,
            Err(e) => return self.reject(e).await,
        };

        info!(
            session = self.session_id,
            addr = %self.addr,
            method = ?parsed.method,
            host = %parsed.target.host,
            path = %parsed.target.path,
            "routing request"
        );

        let origin = match self.connect_origin(&parsed, config.upstream_connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => return self.reject(e).await,
        };

        self.dispatch(parsed, origin, config.upstream_read_timeout, config.chunk_size_bytes)
            .await
    }

    /// Writes the best available HTTP status line for `err` (if the failure
    /// happened before any response bytes were sent) and returns the error
    /// for logging by the caller.
    async fn reject(&mut self, err: ProxyError) -> Result<(), ProxyError> {
        record_rejection_metric(&err);
        if err.is_pre_response() {
            let _ = self.socket.write_all(err.status_line().as_bytes()).await;
            let _ = self.socket.flush().await;
        }
        Err(err)
    }

    /// Resolves `target.host:port` and connects to the first address that
    /// accepts a connection, trying every resolved address in turn --
    /// mirroring the source's `getaddrinfo` fallback loop.
    async fn connect_origin(
        &self,
        parsed: &ParsedRequest,
        connect_timeout: Duration,
    ) -> Result<TcpStream, ProxyError> {
        let host = parsed.target.host.clone();
        let port = parsed.target.port;
        let authority = format!("{host}:{port}");

        let addrs: Vec<SocketAddr> = lookup_host(authority.as_str())
            .await
            .map_err(|e| ProxyError::origin_unreachable(host.clone(), port, e))?
            .collect();

        if addrs.is_empty() {
            return Err(ProxyError::origin_unreachable(
                host,
                port,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
            ));
        }

        let mut last_err = None;
        for addr in addrs {
            match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => {
                    last_err = Some(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ))
                }
            }
        }

        Err(ProxyError::origin_unreachable(
            host,
            port,
            last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "connection attempts exhausted")
            }),
        ))
    }

    /// Decides cacheability, then routes into the cache core exactly per
    /// the control-flow described in the spec: a `GET` with the cache
    /// enabled tries a promote-on-hit lookup first; everything else -- a
    /// miss, or a non-cacheable method -- goes through the fetch-and-stream
    /// pipeline, which also populates the cache on a `GET` miss.
    async fn dispatch(
        &mut self,
        parsed: ParsedRequest,
        mut origin: TcpStream,
        read_timeout: Duration,
        chunk_size: usize,
    ) -> Result<(), ProxyError> {
        let cacheable = parsed.method.is_cacheable() && self.state.cache.is_some();
        let key = cache_key(&parsed);

        if cacheable {
            let cache = self.state.cache.as_ref().expect("cacheable implies cache present");
            if let Some(entry) = cache.find_and_promote(&key) {
                match entry.acquire_reader() {
                    Ok(guard) => {
                        debug!(session = self.session_id, key = %key, "cache hit");
                        metrics::CACHE_HITS_TOTAL.inc();
                        self.state.stats.record_hit();
                        return crate::core::cache::stream_cached(&guard, &mut self.socket)
                            .await
                            .map(|_| ());
                    }
                    Err(_evicted) => {
                        // Raced with an evictor between promote and acquire;
                        // fall through and treat this exactly like a miss.
                        debug!(session = self.session_id, key = %key, "promoted entry was evicted before it could be read");
                    }
                }
            }

            debug!(session = self.session_id, key = %key, "cache miss");
            metrics::CACHE_MISSES_TOTAL.inc();
            self.state.stats.record_miss();

            let outcome = fetch_and_stream(
                &mut origin,
                &mut self.socket,
                &parsed.raw,
                Some(&key),
                Some(cache),
                read_timeout,
                chunk_size,
            )
            .await;
            return self.finish(outcome).await;
        }

        let outcome = fetch_and_stream(
            &mut origin,
            &mut self.socket,
            &parsed.raw,
            None,
            None,
            read_timeout,
            chunk_size,
        )
        .await;
        self.finish(outcome).await
    }

    async fn finish(
        &mut self,
        outcome: Result<crate::core::cache::StreamOutcome, ProxyError>,
    ) -> Result<(), ProxyError> {
        match outcome {
            Ok(o) => {
                debug!(
                    session = self.session_id,
                    bytes = o.bytes_forwarded,
                    cached = o.cached,
                    "relay complete"
                );
                Ok(())
            }
            Err(e) => {
                record_upstream_metric(&e);
                Err(e)
            }
        }
    }
}

/// The cache key for a request: host, port and path, deliberately excluding
/// query semantics beyond what `split_url` already captured -- no further
/// normalization is performed (out of scope per the spec).
fn cache_key(parsed: &ParsedRequest) -> String {
    format!(
        "{}:{}{}",
        parsed.target.host, parsed.target.port, parsed.target.path
    )
}

fn record_rejection_metric(err: &ProxyError) {
    let reason = match err {
        ProxyError::BadRequest(_) => "bad_request",
        ProxyError::UnsupportedMethod(_) => "unsupported_method",
        ProxyError::UnsupportedVersion(_) => "unsupported_version",
        ProxyError::OriginUnreachable { .. } => "origin_unreachable",
        ProxyError::ClientRead(_) => "client_read",
        _ => "other",
    };
    metrics::REQUESTS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

fn record_upstream_metric(err: &ProxyError) {
    match err {
        ProxyError::UpstreamRead(_) | ProxyError::UpstreamTimeout => {
            metrics::UPSTREAM_ERRORS_TOTAL.with_label_values(&["read"]).inc();
        }
        ProxyError::UpstreamWrite(_) => {
            metrics::UPSTREAM_ERRORS_TOTAL.with_label_values(&["write"]).inc();
        }
        ProxyError::ClientWrite(_) => {
            metrics::CLIENT_WRITE_ERRORS_TOTAL.inc();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::{Method, Target};
    use bytes::BytesMut;

    #[test]
    fn cache_key_combines_host_port_and_path() {
        let parsed = ParsedRequest {
            method: Method::Get,
            target: Target {
                host: "example.test".into(),
                port: 8080,
                path: "/a/b".into(),
            },
            raw: BytesMut::from(&b"GET /a/b HTTP/1.1\r\n\r\n"[..]),
        };
        assert_eq!(cache_key(&parsed), "example.test:8080/a/b");
    }
}
