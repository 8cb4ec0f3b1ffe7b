// src/core/http/request.rs

//! Request-line parsing and the growing-buffer read loop that fills it.
//!
//! Only as much HTTP is understood here as the proxy needs to route a
//! request: the method, the request-target, and the version token. Header
//! fields other than `Content-Length` (handled separately, in
//! `core::cache::content_length`) are never interpreted.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::errors::ProxyError;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// An HTTP method the proxy recognizes enough to route. Anything else is an
/// `UnsupportedMethod` error -- the original only ever forwarded `GET` and
/// `POST`, so that remains the supported set here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn is_cacheable(self) -> bool {
        matches!(self, Method::Get)
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            _ => None,
        }
    }
}

/// A request line's target, split into the pieces the connection handler
/// needs to reach the origin: the host (and optional port), and the path
/// to forward upstream untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// A fully parsed request: the method (for cacheability), the target (for
/// routing), and the raw bytes of the request exactly as received, which
/// are forwarded to the origin byte-for-byte.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    pub target: Target,
    pub raw: BytesMut,
}

/// Reads from `reader` into a growing buffer until the header terminator
/// `"\r\n\r\n"` is seen, doubling the buffer capacity as needed up to
/// `max_bytes`. Returns `BadRequest` if the terminator never appears within
/// the size cap, or if the peer closes the connection first.
pub async fn read_request<R>(
    reader: &mut R,
    initial_capacity: usize,
    max_bytes: usize,
) -> Result<BytesMut, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(initial_capacity);
    let mut scan_from = 0usize;

    loop {
        if buf.len() >= max_bytes {
            return Err(ProxyError::BadRequest(
                "request exceeded maximum header size before a terminator was found".into(),
            ));
        }

        if buf.capacity() == buf.len() {
            let grown = (buf.capacity() * 2).min(max_bytes).max(buf.capacity() + 1);
            buf.reserve(grown - buf.capacity());
        }

        let mut chunk = [0u8; 4096];
        let want = chunk.len().min(max_bytes - buf.len());
        let n = reader
            .read(&mut chunk[..want])
            .await
            .map_err(ProxyError::client_read)?;
        if n == 0 {
            return Err(ProxyError::BadRequest(
                "client closed connection before sending a complete request".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_terminator(&buf, scan_from) {
            let _ = pos;
            return Ok(buf);
        }
        scan_from = buf.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
    }
}

fn find_terminator(buf: &[u8], scan_from: usize) -> Option<usize> {
    let start = scan_from.min(buf.len());
    buf[start..]
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|p| p + start)
}

/// Parses the request line (the first `\r\n`-terminated line of `raw`) into
/// a method and target. `raw` must already contain a complete header block.
pub fn parse_request(raw: BytesMut) -> Result<ParsedRequest, ProxyError> {
    let line_end = raw
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| ProxyError::BadRequest("request line missing CRLF terminator".into()))?;
    let line = std::str::from_utf8(&raw[..line_end])
        .map_err(|_| ProxyError::BadRequest("request line is not valid UTF-8".into()))?;

    let mut parts = line.split_whitespace();
    let method_tok = parts
        .next()
        .ok_or_else(|| ProxyError::BadRequest("empty request line".into()))?;
    let url = parts
        .next()
        .ok_or_else(|| ProxyError::BadRequest("request line missing target".into()))?;
    let version = parts
        .next()
        .ok_or_else(|| ProxyError::BadRequest("request line missing HTTP version".into()))?;

    if !is_supported_version(version) {
        return Err(ProxyError::UnsupportedVersion(version.to_string()));
    }
    let method = Method::parse(method_tok)
        .ok_or_else(|| ProxyError::UnsupportedMethod(method_tok.to_string()))?;
    let target = split_url(url)?;

    Ok(ParsedRequest { method, target, raw })
}

fn is_supported_version(token: &str) -> bool {
    matches!(token, "HTTP/1.0" | "HTTP/1.1")
}

/// Splits a request-target into `(host, port, path)`. Strips an optional
/// `scheme://` prefix, then takes everything up to the first `/` as the
/// host[:port] authority (defaulting `path` to `/` when none follows), and
/// splits the authority on its last `:` for an optional port.
fn split_url(url: &str) -> Result<Target, ProxyError> {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };

    let (authority, path) = match without_scheme.find('/') {
        Some(idx) => (&without_scheme[..idx], &without_scheme[idx..]),
        None => (without_scheme, "/"),
    };

    if authority.is_empty() {
        return Err(ProxyError::BadRequest("request target has no host".into()));
    }

    let (host, port) = split_host_port(authority)?;

    Ok(Target {
        host,
        port,
        path: path.to_string(),
    })
}

fn split_host_port(authority: &str) -> Result<(String, u16), ProxyError> {
    match authority.rfind(':') {
        Some(idx) => {
            let host = &authority[..idx];
            let port_str = &authority[idx + 1..];
            let port: u16 = port_str
                .parse()
                .map_err(|_| ProxyError::BadRequest(format!("invalid port in '{authority}'")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 80)),
    }
}
