// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP, WebSocket and SSE codec errors.

use std::fmt;

/// Codec failure. Incomplete input is never an error: it surfaces as
/// [`crate::protocol::Unpack::NeedMoreData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Request or status line does not parse.
    MalformedStartLine(String),
    /// Header line without a colon, or with an invalid name.
    MalformedHeader(String),
    /// Method outside the HTTP/1.1 set.
    UnknownMethod(String),
    /// Only HTTP/1.1 (and 1.0 on responses) is spoken.
    UnsupportedVersion(String),
    /// Content-Length missing where required, or not a number.
    InvalidLength(String),
    /// Bad chunk size line or chunk terminator.
    MalformedChunk(String),
    /// Request or response head above the limit (bytes seen so far).
    HeadTooLarge(usize),
    /// Upgrade request or response failed validation.
    BadUpgrade(String),
    /// WebSocket framing violation (RFC 6455 section 5).
    WebSocket(String),
    /// WebSocket frame or message above the limit (size, limit).
    FrameTooLarge(u64, usize),
    /// WebSocket text message that is not UTF-8.
    InvalidUtf8,
}

impl HttpError {
    /// Status a server answers this failure with.
    pub fn status(&self) -> u16 {
        match self {
            Self::HeadTooLarge(_) => 431,
            Self::UnknownMethod(_) => 501,
            Self::UnsupportedVersion(_) => 505,
            _ => 400,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedStartLine(line) => write!(f, "malformed start line: {:?}", line),
            Self::MalformedHeader(line) => write!(f, "malformed header: {:?}", line),
            Self::UnknownMethod(m) => write!(f, "unknown method {:?}", m),
            Self::UnsupportedVersion(v) => write!(f, "unsupported HTTP version {:?}", v),
            Self::InvalidLength(msg) => write!(f, "invalid body length: {}", msg),
            Self::MalformedChunk(msg) => write!(f, "malformed chunk: {}", msg),
            Self::HeadTooLarge(n) => write!(f, "message head exceeds limit ({} bytes)", n),
            Self::BadUpgrade(msg) => write!(f, "bad upgrade: {}", msg),
            Self::WebSocket(msg) => write!(f, "websocket protocol error: {}", msg),
            Self::FrameTooLarge(len, max) => {
                write!(f, "websocket payload of {} bytes exceeds {}", len, max)
            }
            Self::InvalidUtf8 => write!(f, "websocket text message is not UTF-8"),
        }
    }
}

impl std::error::Error for HttpError {}
