// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1 wire codec and the client / server protocol layers.
//!
//! Parsing is all-or-nothing: a message whose head or body is incomplete
//! yields [`Unpack::NeedMoreData`] and is parsed again from its first byte
//! once more input arrived.

use super::headers::OMIT_CONTENT_LENGTH;
use super::{Body, HeaderMap, HttpError, HttpRequest, HttpResponse, Method};
use crate::buffer::{BufferResult, ByteBuffer, MemoryBuffer};
use crate::error::Error;
use crate::protocol::{LayerLink, Message, Protocol, Unpack, UnpackResult};
use std::collections::VecDeque;

/// Largest accepted head (start line plus headers).
pub const MAX_HEAD: usize = 64 * 1024;

/// Buffer bodies are copied to the wire this many bytes at a time.
const BODY_CHUNK: usize = 64 * 1024;

// ============================================================================
// Reading
// ============================================================================

struct Head {
    start: String,
    headers: HeaderMap,
}

fn read_head(input: &mut dyn ByteBuffer) -> UnpackResult<Head> {
    // RFC 9112 section 2.2: ignore empty lines before the start line
    while input.left_length() >= 2 {
        if input.read(2)? != b"\r\n" {
            input.back(2)?;
            break;
        }
    }
    let offset = match input.index(b"\r\n\r\n") {
        Ok(offset) => offset,
        Err(e) if e.is_underflow() => {
            if input.left_length() > MAX_HEAD {
                return Err(HttpError::HeadTooLarge(input.left_length()).into());
            }
            return Err(Unpack::NeedMoreData);
        }
        Err(e) => return Err(e.into()),
    };
    if offset > MAX_HEAD {
        return Err(HttpError::HeadTooLarge(offset).into());
    }
    let raw = input.read(offset)?;
    input.skip(4)?;

    let text = String::from_utf8_lossy(&raw);
    let mut lines = text.split("\r\n");
    let start = lines.next().unwrap_or_default().to_string();
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = HeaderMap::parse_line(line)?;
        headers.append(name, value);
    }
    Ok(Head { start, headers })
}

fn read_chunked(input: &mut dyn ByteBuffer) -> UnpackResult<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line = input.read_line(b"\r\n")?;
        let line = String::from_utf8_lossy(&line);
        let size_field = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| HttpError::MalformedChunk(format!("size line {:?}", line)))?;
        if size == 0 {
            // trailer fields are read and dropped
            while !input.read_line(b"\r\n")?.is_empty() {}
            return Ok(body);
        }
        body.extend_from_slice(&input.read(size)?);
        if input.read(2)? != b"\r\n" {
            return Err(HttpError::MalformedChunk("missing CRLF after chunk data".into()).into());
        }
    }
}

fn read_body(input: &mut dyn ByteBuffer, headers: &HeaderMap) -> UnpackResult<Vec<u8>> {
    if headers.has_token("Transfer-Encoding", "chunked") {
        return read_chunked(input);
    }
    match headers.content_length()? {
        Some(len) => Ok(input.read(len)?),
        None => Ok(Vec::new()),
    }
}

fn check_version(version: &str) -> Result<(), HttpError> {
    match version {
        "HTTP/1.1" | "HTTP/1.0" => Ok(()),
        other => Err(HttpError::UnsupportedVersion(other.to_string())),
    }
}

/// Parse one request.
pub fn parse_request(input: &mut dyn ByteBuffer) -> UnpackResult<HttpRequest> {
    let head = read_head(input)?;
    let mut parts = head.start.splitn(3, ' ');
    let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(HttpError::MalformedStartLine(head.start.clone()).into());
    };
    check_version(version)?;
    let method = Method::parse(method)?;
    if uri.is_empty() {
        return Err(HttpError::MalformedStartLine(head.start.clone()).into());
    }
    let uri = uri.to_string();
    let body = read_body(input, &head.headers)?;
    Ok(HttpRequest {
        method,
        uri,
        headers: head.headers,
        body: Body::Bytes(body),
    })
}

/// Parse one response. `request` is the method it answers, when known.
pub fn parse_response(
    input: &mut dyn ByteBuffer,
    request: Option<Method>,
) -> UnpackResult<HttpResponse> {
    let head = read_head(input)?;
    let mut parts = head.start.splitn(3, ' ');
    let (Some(version), Some(status)) = (parts.next(), parts.next()) else {
        return Err(HttpError::MalformedStartLine(head.start.clone()).into());
    };
    check_version(version)?;
    let status = status
        .parse::<u16>()
        .ok()
        .filter(|s| (100..1000).contains(s))
        .ok_or_else(|| HttpError::MalformedStartLine(head.start.clone()))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut response = HttpResponse::new(status, reason);
    response.headers = head.headers;
    if request != Some(Method::Head) && !response.is_bodyless_status() {
        response.body = Body::Bytes(read_body(input, &response.headers)?);
    }
    Ok(response)
}

// ============================================================================
// Writing
// ============================================================================

fn write_message(
    start: &str,
    headers: &HeaderMap,
    body: &Body,
    length_allowed: bool,
    send_body: bool,
    out: &mut Vec<u8>,
) -> BufferResult<()> {
    let mut headers = headers.clone();
    let omit = headers.remove(OMIT_CONTENT_LENGTH).is_some();
    if !omit && length_allowed && !headers.has_token("Transfer-Encoding", "chunked") {
        headers.insert("Content-Length", body.len().to_string());
    }
    out.extend_from_slice(start.as_bytes());
    out.extend_from_slice(b"\r\n");
    headers.write_to(out);
    out.extend_from_slice(b"\r\n");
    if send_body {
        body.write_to(out, BODY_CHUNK)?;
    }
    Ok(())
}

/// Serialise a request. Content-Length is always set from the body unless
/// the omit marker is present.
pub fn write_request(req: &HttpRequest, out: &mut Vec<u8>) -> BufferResult<()> {
    let start = format!("{} {} HTTP/1.1", req.method, req.uri);
    write_message(&start, &req.headers, &req.body, true, true, out)
}

/// Serialise a response. `head_only` answers a HEAD request: the length
/// is announced but no body follows.
pub fn write_response(resp: &HttpResponse, head_only: bool, out: &mut Vec<u8>) -> BufferResult<()> {
    let start = format!("HTTP/1.1 {} {}", resp.status, resp.reason);
    let bodyless = resp.is_bodyless_status();
    let length_allowed = !(bodyless && resp.status != 304);
    write_message(
        &start,
        &resp.headers,
        &resp.body,
        length_allowed,
        !head_only && !bodyless,
        out,
    )
}

fn outermost_only(name: &str) -> Error {
    Error::Unsupported(format!("{} must be the outermost layer", name))
}

// ============================================================================
// Client layer
// ============================================================================

/// Client side: packs requests, parses responses.
#[derive(Debug, Default)]
pub struct HttpClientProtocol {
    host: Option<String>,
    /// Methods of requests still waiting for a final response
    pending: VecDeque<Method>,
}

impl HttpClientProtocol {
    /// `host` is sent as the Host header when a request has none.
    pub fn new(host: Option<String>) -> Self {
        Self {
            host,
            pending: VecDeque::new(),
        }
    }

    /// Requests sent and not answered yet.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl Protocol for HttpClientProtocol {
    fn name(&self) -> &'static str {
        "http"
    }

    fn unpack_subprotocol(
        &mut self,
        _input: &mut dyn ByteBuffer,
        _output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        Err(outermost_only(self.name()).into())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        let response = parse_response(input, self.pending.front().copied())?;
        // interim responses precede the final one
        if !(100..200).contains(&response.status) || response.status == 101 {
            self.pending.pop_front();
        }
        Ok(Message::Response(response))
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        let Message::Request(mut req) = msg else {
            return Err(Error::Unsupported(format!(
                "http client cannot send a {} message",
                msg.kind()
            )));
        };
        if let Some(host) = &self.host {
            if !req.headers.contains("Host") {
                req.headers.insert("Host", host.clone());
            }
        }
        let mut bytes = Vec::new();
        write_request(&req, &mut bytes)?;
        self.pending.push_back(req.method);
        out.extend(&bytes);
        Ok(())
    }

    fn pack_subprotocol(&mut self, _payload: &mut MemoryBuffer) -> Result<(), Error> {
        Err(outermost_only(self.name()))
    }
}

// ============================================================================
// Server layer
// ============================================================================

/// Server side: parses requests, packs responses with a `Server` header.
#[derive(Debug)]
pub struct HttpServerProtocol {
    server_header: String,
    pending: VecDeque<Method>,
}

impl Default for HttpServerProtocol {
    fn default() -> Self {
        Self::new("KUtil")
    }
}

impl HttpServerProtocol {
    pub fn new(server_header: impl Into<String>) -> Self {
        Self {
            server_header: server_header.into(),
            pending: VecDeque::new(),
        }
    }
}

impl Protocol for HttpServerProtocol {
    fn name(&self) -> &'static str {
        "http-server"
    }

    fn unpack_subprotocol(
        &mut self,
        _input: &mut dyn ByteBuffer,
        _output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        Err(outermost_only(self.name()).into())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        let request = parse_request(input)?;
        log::debug!("[http-server] {} {}", request.method, request.uri);
        self.pending.push_back(request.method);
        Ok(Message::Request(request))
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        let Message::Response(mut resp) = msg else {
            return Err(Error::Unsupported(format!(
                "http server cannot send a {} message",
                msg.kind()
            )));
        };
        if !resp.headers.contains("Server") {
            resp.headers.insert("Server", self.server_header.clone());
        }
        let answered = if resp.status >= 200 || resp.status == 101 {
            self.pending.pop_front()
        } else {
            self.pending.front().copied()
        };
        let mut bytes = Vec::new();
        write_response(&resp, answered == Some(Method::Head), &mut bytes)?;
        out.extend(&bytes);
        Ok(())
    }

    fn pack_subprotocol(&mut self, _payload: &mut MemoryBuffer) -> Result<(), Error> {
        Err(outermost_only(self.name()))
    }

    fn on_failure(&mut self, err: &Error, link: &mut LayerLink) {
        let status = match err {
            Error::Http(e) => e.status(),
            _ => 400,
        };
        log::debug!("[http-server] bad request ({}), answering {}", err, status);
        let resp = HttpResponse::text(status, format!("{}\n", super::reason_phrase(status)))
            .with_header("Connection", "close");
        link.send(Message::Response(resp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Outgoing;

    fn bytes_of_request(req: &HttpRequest) -> Vec<u8> {
        let mut out = Vec::new();
        write_request(req, &mut out).unwrap();
        out
    }

    #[test]
    fn test_request_round_trip() {
        let req = HttpRequest::get("/").with_header("Accept", "text/html");
        let bytes = bytes_of_request(&req);
        assert!(bytes.starts_with(b"GET / HTTP/1.1\r\n"));
        let mut input = MemoryBuffer::from_bytes(bytes);
        let parsed = parse_request(&mut input).unwrap();
        assert_eq!(parsed.method, Method::Get);
        assert_eq!(parsed.uri, "/");
        assert_eq!(parsed.headers.get("accept"), Some("text/html"));
        assert_eq!(parsed.headers.get("content-length"), Some("0"));
        assert_eq!(input.left_length(), 0);
    }

    #[test]
    fn test_content_length_injected_unless_omitted() {
        let resp = HttpResponse::with_status(200).with_body("hello");
        let mut out = Vec::new();
        write_response(&resp, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));

        let resp = resp.with_header(OMIT_CONTENT_LENGTH, "1");
        let mut out = Vec::new();
        write_response(&resp, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.to_ascii_lowercase().contains("content-length"));
    }

    #[test]
    fn test_short_body_needs_more_data() {
        let mut input = MemoryBuffer::from_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc".to_vec());
        assert!(matches!(parse_response(&mut input, None), Err(Unpack::NeedMoreData)));
        let mut input = MemoryBuffer::from_bytes(b"HTTP/1.1 200 OK\r\nContent-Le".to_vec());
        assert!(matches!(parse_response(&mut input, None), Err(Unpack::NeedMoreData)));
    }

    #[test]
    fn test_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\nnext";
        let mut input = MemoryBuffer::from_bytes(raw.to_vec());
        let resp = parse_response(&mut input, Some(Method::Get)).unwrap();
        assert_eq!(resp.body.to_vec().unwrap(), b"Wikipedia");
        assert_eq!(input.read_rest().unwrap(), b"next");

        let mut input = MemoryBuffer::from_bytes(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n".to_vec());
        assert!(matches!(
            parse_response(&mut input, None),
            Err(Unpack::Fail(Error::Http(HttpError::MalformedChunk(_))))
        ));
    }

    #[test]
    fn test_head_and_bodyless_responses() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n";
        let mut input = MemoryBuffer::from_bytes(raw.to_vec());
        let resp = parse_response(&mut input, Some(Method::Head)).unwrap();
        assert!(resp.body.is_empty());

        let raw = b"HTTP/1.1 204 No Content\r\n\r\n";
        let mut input = MemoryBuffer::from_bytes(raw.to_vec());
        assert_eq!(parse_response(&mut input, None).unwrap().status, 204);
    }

    #[test]
    fn test_bad_requests() {
        let mut input = MemoryBuffer::from_bytes(b"BREW /pot HTTP/1.1\r\n\r\n".to_vec());
        assert!(matches!(
            parse_request(&mut input),
            Err(Unpack::Fail(Error::Http(HttpError::UnknownMethod(_))))
        ));
        let mut input = MemoryBuffer::from_bytes(b"GET /\r\n\r\n".to_vec());
        assert!(matches!(
            parse_request(&mut input),
            Err(Unpack::Fail(Error::Http(HttpError::MalformedStartLine(_))))
        ));
        let mut input = MemoryBuffer::from_bytes(vec![b'a'; MAX_HEAD + 10]);
        assert!(matches!(
            parse_request(&mut input),
            Err(Unpack::Fail(Error::Http(HttpError::HeadTooLarge(_))))
        ));
    }

    #[test]
    fn test_leading_empty_lines_skipped() {
        let mut input = MemoryBuffer::from_bytes(b"\r\n\r\nGET /x HTTP/1.1\r\n\r\n".to_vec());
        assert_eq!(parse_request(&mut input).unwrap().uri, "/x");
    }

    #[test]
    fn test_client_layer_adds_host_and_tracks_head() {
        let mut http = HttpClientProtocol::new(Some("example.com".into()));
        let mut out = MemoryBuffer::new();
        http.pack_data(Message::Request(HttpRequest::new(Method::Head, "/")), &mut out)
            .unwrap();
        assert!(String::from_utf8_lossy(out.as_slice()).contains("Host: example.com\r\n"));
        assert_eq!(http.in_flight(), 1);

        let mut input = MemoryBuffer::from_bytes(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n".to_vec());
        match http.unpack_data(&mut input).unwrap() {
            Message::Response(r) => assert!(r.body.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(http.in_flight(), 0);
    }

    #[test]
    fn test_server_layer_headers_and_failure() {
        let mut http = HttpServerProtocol::default();
        let mut out = MemoryBuffer::new();
        http.pack_data(Message::Response(HttpResponse::with_status(404)), &mut out)
            .unwrap();
        let text = String::from_utf8_lossy(out.as_slice()).into_owned();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Server: KUtil\r\n"));

        let mut link = LayerLink::new(1);
        http.on_failure(&Error::Http(HttpError::HeadTooLarge(1)), &mut link);
        let (queued, _, _) = link.into_parts();
        match &queued[0] {
            Outgoing::Message(Message::Response(r)) => {
                assert_eq!(r.status, 431);
                assert_eq!(r.headers.get("connection"), Some("close"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
