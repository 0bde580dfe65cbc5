// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1 requests and responses.

use super::{HeaderMap, HttpError};
use crate::buffer::{BufferResult, SharedBuffer};
use std::fmt;

// ============================================================================
// Method
// ============================================================================

/// Request method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Options,
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Trace,
        Method::Connect,
        Method::Patch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Patch => "PATCH",
        }
    }

    /// Methods are case-sensitive tokens.
    pub fn parse(token: &str) -> Result<Self, HttpError> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == token)
            .ok_or_else(|| HttpError::UnknownMethod(token.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Body
// ============================================================================

/// Message body: owned bytes, or a shared buffer streamed on write.
#[derive(Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    Buffer(SharedBuffer),
}

impl Default for Body {
    fn default() -> Self {
        Self::Bytes(Vec::new())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Buffer(b) => f
                .debug_tuple("Buffer")
                .field(&b.lock().full_length())
                .finish(),
        }
    }
}

impl Body {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Buffer(b) => b.lock().full_length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whole body as bytes.
    pub fn to_vec(&self) -> BufferResult<Vec<u8>> {
        match self {
            Self::Bytes(b) => Ok(b.clone()),
            Self::Buffer(b) => b.lock().export(),
        }
    }

    /// Append the body to `out`, `chunk` bytes at a time for buffers.
    pub fn write_to(&self, out: &mut Vec<u8>, chunk: usize) -> BufferResult<()> {
        match self {
            Self::Bytes(b) => out.extend_from_slice(b),
            Self::Buffer(b) => {
                let mut buf = b.lock();
                let saved = buf.pointer();
                buf.reset_pointer()?;
                while buf.left_length() > 0 {
                    let n = buf.left_length().min(chunk.max(1));
                    out.extend_from_slice(&buf.read(n)?);
                }
                buf.reset_pointer()?;
                buf.skip(saved)?;
            }
        }
        Ok(())
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        match self.to_vec() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                log::debug!("[http] body unreadable: {}", e);
                String::new()
            }
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Body {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

impl From<SharedBuffer> for Body {
    fn from(b: SharedBuffer) -> Self {
        Self::Buffer(b)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Headers and body shared by requests and responses.
pub trait HttpThing {
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn body(&self) -> &Body;
    fn body_mut(&mut self) -> &mut Body;

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers_mut().insert(name, value);
    }
}

/// HTTP/1.1 request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Request target as sent (path and query)
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    /// Builder: add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Builder: set the body
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Target without the query string.
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(&self.uri, |(p, _)| p)
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// Upgrade header asks for a WebSocket.
    pub fn wants_websocket(&self) -> bool {
        self.headers.has_token("Upgrade", "websocket")
    }
}

impl HttpThing for HttpRequest {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
    fn body(&self) -> &Body {
        &self.body
    }
    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
}

/// HTTP/1.1 response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpResponse {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    /// Response with the standard reason phrase for `status`.
    pub fn with_status(status: u16) -> Self {
        Self::new(status, reason_phrase(status))
    }

    /// `200 OK` with an HTML body.
    pub fn html(body: impl Into<Body>) -> Self {
        Self::with_status(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body)
    }

    /// Plain-text response.
    pub fn text(status: u16, body: impl Into<Body>) -> Self {
        Self::with_status(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    /// Builder: add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Builder: set the body
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// 1xx, 204 and 304 never carry a body.
    pub fn is_bodyless_status(&self) -> bool {
        (100..200).contains(&self.status) || self.status == 204 || self.status == 304
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpThing for HttpResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
    fn body(&self) -> &Body {
        &self.body
    }
    fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
}

/// Standard reason phrase (RFC 9110 section 15).
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Content Too Large",
        414 => "URI Too Long",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{shared, MemoryBuffer};

    #[test]
    fn test_method_tokens() {
        for m in Method::ALL {
            assert_eq!(Method::parse(m.as_str()), Ok(m));
        }
        assert!(Method::parse("get").is_err());
        assert!(Method::parse("BREW").is_err());
    }

    #[test]
    fn test_request_target() {
        let req = HttpRequest::get("/search?q=rust&page=2");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("q=rust&page=2"));
        assert_eq!(HttpRequest::get("/").query(), None);
    }

    #[test]
    fn test_buffer_body_streams_and_keeps_pointer() {
        let buf = shared(MemoryBuffer::from_bytes(b"0123456789".to_vec()));
        buf.lock().skip(3).unwrap();
        let body = Body::from(buf.clone());
        assert_eq!(body.len(), 10);
        let mut out = Vec::new();
        body.write_to(&mut out, 4).unwrap();
        assert_eq!(out, b"0123456789");
        assert_eq!(buf.lock().pointer(), 3);
    }

    #[test]
    fn test_response_helpers() {
        let resp = HttpResponse::with_status(405);
        assert_eq!(resp.reason, "Method not Allowed");
        assert!(HttpResponse::with_status(204).is_bodyless_status());
        assert!(!HttpResponse::html("<p>").is_bodyless_status());
        assert_eq!(HttpResponse::html("<p>").header("content-type"), Some("text/html; charset=utf-8"));
    }
}
