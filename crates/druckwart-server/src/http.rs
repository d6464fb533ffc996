// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing for the reservation API.
//
// The API has exactly three POST routes with small JSON bodies and one
// well-known client (the watcher), so this operates directly on raw TCP:
// parse the request line and the two headers we care about, then respond
// with `Connection: close`.  No keep-alive, no chunked encoding.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use druckwart_core::error::{DruckwartError, Result};

/// Maximum bytes to read from a connection before rejecting it.
/// Prevents unbounded memory consumption from misbehaving clients.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A parsed HTTP request: just the parts the router needs.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// Value of the `Authorization` header, if present.
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

/// Reason phrases for the status codes the API emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

/// Read a full request from the stream.
///
/// The watcher sends `Connection: close` and half-closes its write side, so
/// reading to EOF (bounded by [`MAX_REQUEST_BYTES`]) yields the complete
/// request.
pub async fn read_request(stream: &mut TcpStream) -> Result<Option<HttpRequest>> {
    let mut buf = Vec::with_capacity(1024);
    let mut limited = stream.take(MAX_REQUEST_BYTES as u64);
    limited
        .read_to_end(&mut buf)
        .await
        .map_err(|e| DruckwartError::HttpServer(format!("read request: {e}")))?;

    if buf.is_empty() {
        return Ok(None);
    }
    Ok(parse_request(&buf))
}

/// Parse the request line, headers, and body out of a raw request.
///
/// Returns `None` when the data does not look like HTTP at all.
pub fn parse_request(data: &[u8]) -> Option<HttpRequest> {
    let header_end = find_subsequence(data, b"\r\n\r\n")?;
    let body_offset = header_end + 4;

    let head = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = head.lines();

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut authorization = None;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.to_ascii_lowercase().as_str() {
            "authorization" => authorization = Some(value.trim().to_string()),
            "content-length" => content_length = value.trim().parse::<usize>().ok(),
            _ => {}
        }
    }

    // Trust Content-Length when present; some clients pad the tail.
    let body = match content_length {
        Some(len) if body_offset + len <= data.len() => {
            data[body_offset..body_offset + len].to_vec()
        }
        _ => data[body_offset..].to_vec(),
    };

    Some(HttpRequest {
        method,
        path,
        authorization,
        body,
    })
}

/// Write a JSON response and flush.
pub async fn send_json_response(
    stream: &mut TcpStream,
    status: u16,
    json_body: &str,
) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        reason_phrase(status),
        json_body.len()
    );

    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| DruckwartError::HttpServer(format!("write headers: {e}")))?;
    stream
        .write_all(json_body.as_bytes())
        .await
        .map_err(|e| DruckwartError::HttpServer(format!("write body: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| DruckwartError::HttpServer(format!("flush: {e}")))?;
    Ok(())
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_with_body() {
        let raw = b"POST /api/print/reserve HTTP/1.1\r\n\
                    Host: localhost\r\n\
                    Authorization: Bearer secret\r\n\
                    Content-Length: 13\r\n\
                    \r\n\
                    {\"pages\": 10}";
        let req = parse_request(raw).expect("should parse");
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/print/reserve");
        assert_eq!(req.authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(req.body, b"{\"pages\": 10}");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let raw = b"POST /x HTTP/1.1\r\nAUTHORIZATION: Bearer k\r\n\r\n";
        let req = parse_request(raw).expect("should parse");
        assert_eq!(req.authorization.as_deref(), Some("Bearer k"));
    }

    #[test]
    fn content_length_bounds_the_body() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}garbage";
        let req = parse_request(raw).expect("should parse");
        assert_eq!(req.body, b"{}");
    }

    #[test]
    fn rejects_non_http_data() {
        assert!(parse_request(b"\x01\x02\x03").is_none());
        assert!(parse_request(b"").is_none());
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(500), "Internal Server Error");
    }
}
