// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures while serving a
/// single connection. Using `thiserror` allows for clean error definitions
/// and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("failed to read request from client: {0}")]
    ClientRead(Arc<std::io::Error>),

    #[error("failed to write response to client: {0}")]
    ClientWrite(Arc<std::io::Error>),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("unsupported method '{0}'")]
    UnsupportedMethod(String),

    #[error("unsupported HTTP version '{0}'")]
    UnsupportedVersion(String),

    #[error("could not connect to origin {host}:{port}: {source}")]
    OriginUnreachable {
        host: String,
        port: u16,
        source: Arc<std::io::Error>,
    },

    #[error("failed to read from origin: {0}")]
    UpstreamRead(Arc<std::io::Error>),

    #[error("failed to write to origin: {0}")]
    UpstreamWrite(Arc<std::io::Error>),

    #[error("timed out waiting for origin")]
    UpstreamTimeout,

    #[error("out of memory")]
    OutOfMemory,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn client_read(e: std::io::Error) -> Self {
        ProxyError::ClientRead(Arc::new(e))
    }

    pub fn client_write(e: std::io::Error) -> Self {
        ProxyError::ClientWrite(Arc::new(e))
    }

    pub fn upstream_read(e: std::io::Error) -> Self {
        ProxyError::UpstreamRead(Arc::new(e))
    }

    pub fn upstream_write(e: std::io::Error) -> Self {
        ProxyError::UpstreamWrite(Arc::new(e))
    }

    pub fn origin_unreachable(host: impl Into<String>, port: u16, e: std::io::Error) -> Self {
        ProxyError::OriginUnreachable {
            host: host.into(),
            port,
            source: Arc::new(e),
        }
    }

    /// The HTTP status line this error should be reported to the client as,
    /// when there is still an opportunity to write one (i.e. before any
    /// response bytes have already been forwarded).
    pub fn status_line(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "HTTP/1.0 400 Bad Request\r\n\r\n",
            ProxyError::UnsupportedMethod(_) => "HTTP/1.0 501 Not Implemented\r\n\r\n",
            ProxyError::UnsupportedVersion(_) => "HTTP/1.0 400 Bad Request\r\n\r\n",
            ProxyError::OriginUnreachable { .. } | ProxyError::UpstreamTimeout => {
                "HTTP/1.0 502 Bad Gateway\r\n\r\n"
            }
            ProxyError::OutOfMemory => "HTTP/1.0 500 Internal Server Error\r\n\r\n",
            ProxyError::ClientRead(_)
            | ProxyError::ClientWrite(_)
            | ProxyError::UpstreamRead(_)
            | ProxyError::UpstreamWrite(_)
            | ProxyError::Internal(_) => "HTTP/1.0 500 Internal Server Error\r\n\r\n",
        }
    }

    /// Whether this failure happened before any bytes of a response were
    /// sent to the client, i.e. whether `status_line` can still usefully be
    /// written. Errors encountered mid-stream (once forwarding has begun)
    /// should just close the socket instead.
    ///
    /// `UpstreamTimeout` is grouped with the mid-stream errors rather than
    /// treated as always-safe: it fires from inside the same read loop as
    /// `UpstreamRead`, so it can just as easily happen after chunks have
    /// already reached the client as before the first one.
    pub fn is_pre_response(&self) -> bool {
        !matches!(
            self,
            ProxyError::ClientWrite(_)
                | ProxyError::UpstreamRead(_)
                | ProxyError::UpstreamWrite(_)
                | ProxyError::UpstreamTimeout
        )
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Internal(e.to_string())
    }
}
