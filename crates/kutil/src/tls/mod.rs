// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS 1.2 / 1.3 client.
//!
//! [`TlsProtocol`] is a [`crate::protocol::Protocol`] layer: it sits on top
//! of TCP, runs the client handshake from `on_connect`, and carries the
//! layers above it (HTTP, WebSocket, SSE) as protected application data.
//!
//! Record protection uses AEAD suites only (AES-GCM, ChaCha20-Poly1305).
//! Key exchange supports X25519, X448, the NIST P curves and the RFC 7919
//! finite-field groups. Server chains are verified with `webpki` against
//! the bundled Mozilla roots unless a [`RootStore`] is configured.
//!
//! # Example
//!
//! ```no_run
//! use kutil::protocol::{Connection, ConnectionConfig, PassThrough, Protocol, TcpProtocol};
//! use kutil::tls::{TlsConfig, TlsProtocol};
//! use std::sync::Arc;
//!
//! let tls = TlsProtocol::new(TlsConfig::new("example.com")).unwrap();
//! let layers: Vec<Box<dyn Protocol>> = vec![Box::new(TcpProtocol::new()), Box::new(tls)];
//! let conn = Connection::connect(
//!     "example.com",
//!     443,
//!     ConnectionConfig::default(),
//!     layers,
//!     Arc::new(PassThrough),
//! )
//! .unwrap();
//! conn.start().unwrap();
//! ```

pub mod alert;
pub mod cipher;
mod config;
mod error;
pub mod extension;
pub mod ffdhe;
mod group;
pub mod handshake;
pub mod keys;
mod layer;
pub mod protect;
pub mod record;
mod state;
pub mod verify;
mod version;

pub use alert::{Alert, AlertLevel};
pub use cipher::{CipherSuite, HashAlg, KeyExchange};
pub use config::TlsConfig;
pub use error::TlsError;
pub use group::{EphemeralKey, NamedGroup};
pub use layer::TlsProtocol;
pub use record::{RawTlsRecord, TlsRecord};
pub use state::{HandshakeState, TlsStatus};
pub use verify::{RootStore, SignatureScheme};
pub use version::TlsVersion;
