// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-level error type.

use crate::buffer::BufferError;
use crate::http::HttpError;
use crate::tls::TlsError;
use std::fmt;
use std::io;

/// Errors surfaced by connections, codecs and buffers.
#[derive(Debug)]
pub enum Error {
    /// Buffer operation failed.
    Buffer(BufferError),
    /// Socket-level failure.
    Io(io::Error),
    /// TLS failure; carries the alert that was (or would be) sent.
    Tls(TlsError),
    /// HTTP, WebSocket or SSE codec failure.
    Http(HttpError),
    /// Peer closed the connection, or the connection was closed locally.
    ConnectionClosed,
    /// Secure channel not established yet.
    NotEstablished,
    /// Operation not supported in the current configuration or state.
    Unsupported(String),
    /// A blocking operation timed out.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(e) => write!(f, "buffer error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Tls(e) => write!(f, "TLS error: {}", e),
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::NotEstablished => write!(f, "secure channel not established"),
            Self::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Tls(e) => Some(e),
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        Self::Tls(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_and_source() {
        let e = Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(e.to_string(), "I/O error: reset");
        assert!(e.source().is_some());
        assert!(Error::Timeout.source().is_none());
        assert_eq!(Error::ConnectionClosed.to_string(), "connection closed");
    }
}
