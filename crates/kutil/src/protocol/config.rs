// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection configuration.
//!
//! # Example
//!
//! ```
//! use kutil::protocol::ConnectionConfig;
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::default()
//!     .with_connect_timeout(Duration::from_secs(3))
//!     .with_read_timeout(Some(Duration::from_secs(30)));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

/// Socket and staging-buffer settings for one connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Timeout for outbound `connect`
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub nodelay: bool,

    /// Largest single `recv` on the receive thread
    pub recv_chunk_size: usize,

    /// Close the connection when nothing arrives for this long (None = never)
    pub read_timeout: Option<Duration>,

    /// Unparsed bytes allowed across all layer inputs before the connection
    /// is closed (anti-OOM protection)
    pub max_staged_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            nodelay: true,
            recv_chunk_size: 1024 * 1024,       // 1 MiB
            read_timeout: None,
            max_staged_bytes: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

impl ConnectionConfig {
    /// Builder: set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set TCP_NODELAY
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Builder: set receive chunk size
    pub fn with_recv_chunk_size(mut self, size: usize) -> Self {
        self.recv_chunk_size = size;
        self
    }

    /// Builder: set read timeout
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Builder: set staging limit
    pub fn with_max_staged_bytes(mut self, size: usize) -> Self {
        self.max_staged_bytes = size;
        self
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if self.recv_chunk_size == 0 {
            return Err("recv_chunk_size must be > 0");
        }
        if self.max_staged_bytes < self.recv_chunk_size {
            return Err("max_staged_bytes must be >= recv_chunk_size");
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err("read_timeout must be > 0 when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.nodelay);
        assert_eq!(config.recv_chunk_size, 1 << 20);
        assert!(config.read_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ConnectionConfig::default()
            .with_recv_chunk_size(0)
            .validate()
            .is_err());
        assert!(ConnectionConfig::default()
            .with_max_staged_bytes(16)
            .validate()
            .is_err());
        assert!(ConnectionConfig::default()
            .with_read_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
    }
}
