//! Shared test scaffolding for the integration suite: a tiny mock origin
//! server and a helper that drives one request through a real
//! `ConnectionHandler` over a real loopback socket pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proxide::config::Config;
use proxide::connection::ConnectionHandler;
use proxide::core::state::ServerState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::reload;

/// A minimal HTTP origin: for each accepted connection, reads until the
/// header terminator, derives a canned response from the requested path,
/// and writes it back. `/truncated` is special-cased to advertise a
/// `Content-Length` far larger than the bytes it actually sends before
/// closing the connection, to exercise scenario 6 (upstream drop
/// mid-stream).
pub struct MockOrigin {
    pub addr: std::net::SocketAddr,
    pub accepted: Arc<AtomicUsize>,
}

impl MockOrigin {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_clone = accepted.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                accepted_clone.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/");

                    if path.contains("/truncated") {
                        let _ = stream
                            .write_all(b"HTTP/1.0 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                            .await;
                        return; // drop the connection before `expected` bytes arrive
                    }

                    let body = path.trim_start_matches('/').as_bytes().to_vec();
                    let body = if body.is_empty() { b"root".to_vec() } else { body };
                    let response = format!(
                        "HTTP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.flush().await;
                });
            }
        });

        Self { addr, accepted }
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub fn test_state(cache_capacity: usize) -> Arc<ServerState> {
    let mut config = Config::default();
    config.cache.enabled = cache_capacity > 0;
    config.cache.capacity = cache_capacity;
    config.upstream_read_timeout = std::time::Duration::from_secs(2);
    let (_filter, reload_handle) = reload::Layer::new(EnvFilter::new("info"));
    ServerState::new(config, Arc::new(reload_handle))
}

/// Drives one full request/response cycle through a real
/// `ConnectionHandler`: binds a fresh proxy-facing listener, connects a
/// client to it, spawns the handler against the accepted socket, writes
/// `request` from the client side, and returns everything the client read
/// back before the proxy closed the connection.
pub async fn send_request(state: Arc<ServerState>, request: &[u8]) -> Vec<u8> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _keep_alive = shutdown_tx;

    let server_task = tokio::spawn(async move {
        let (socket, addr) = listener.accept().await.unwrap();
        let mut handler = ConnectionHandler::new(socket, addr, state, 1);
        handler.run(shutdown_rx).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request).await.unwrap();
    client.shutdown().await.ok();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();

    server_task.await.unwrap();
    response
}

pub fn get_request(host: &str, port: u16, path: &str) -> Vec<u8> {
    format!("GET http://{host}:{port}{path} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n").into_bytes()
}

pub fn post_request(host: &str, port: u16, path: &str) -> Vec<u8> {
    let body = b"x=1";
    format!(
        "POST http://{host}:{port}{path} HTTP/1.1\r\nHost: {host}:{port}\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        std::str::from_utf8(body).unwrap()
    )
    .into_bytes()
}
