// src/core/cache/content_length.rs

//! A deliberately best-effort `Content-Length` scanner. It only ever looks
//! at a single chunk: if the header or the header terminator is split
//! across chunk boundaries, detection silently fails and the fetch loop
//! falls back to origin EOF to decide the response is complete. That
//! fallback is always safe, so a miss here is never a correctness bug.

const HEADER_NAME: &[u8] = b"content-length:";
const TERMINATOR: &[u8] = b"\r\n\r\n";

/// If `chunk` contains both a `Content-Length` header and the end of the
/// header block, returns the total number of bytes (headers + body) the
/// connection is expected to deliver, counted from the very start of the
/// response (i.e. `total_before_chunk + chunk.len()` once the body is
/// fully received).
pub fn detect_expected_total(total_before_chunk: u64, chunk: &[u8]) -> Option<u64> {
    let content_length = parse_content_length(chunk)?;
    let terminator_at = find_terminator(chunk)?;
    let header_bytes_consumed = total_before_chunk + (terminator_at as u64 + TERMINATOR.len() as u64);
    Some(content_length + header_bytes_consumed)
}

/// Case-insensitive search for `Content-Length:`, tolerant of any amount of
/// whitespace before the digits. Returns `None` if the header name isn't
/// present in `chunk`, or no digits immediately follow it (after
/// whitespace).
fn parse_content_length(chunk: &[u8]) -> Option<u64> {
    let pos = find_subsequence_ci(chunk, HEADER_NAME)?;
    let mut i = pos + HEADER_NAME.len();
    while i < chunk.len() && !chunk[i].is_ascii_digit() {
        i += 1;
    }
    let start = i;
    while i < chunk.len() && chunk[i].is_ascii_digit() {
        i += 1;
    }
    if start == i {
        return None;
    }
    std::str::from_utf8(&chunk[start..i])
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
}

fn find_terminator(chunk: &[u8]) -> Option<usize> {
    chunk.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

fn find_subsequence_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}
