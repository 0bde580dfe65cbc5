// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # KUtil - layered network protocol toolkit
//!
//! Blocking, thread-per-connection networking built from stacked protocol
//! layers, with a TLS 1.2/1.3 client, HTTP/1.1, WebSocket and server-sent
//! events on top, plus the byte buffers everything is parsed from.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kutil::http::HttpConnection;
//!
//! fn main() -> kutil::Result<()> {
//!     let conn = HttpConnection::connect("example.com", 80, |_, resp| {
//!         println!("{} {} ({} bytes)", resp.status, resp.reason, resp.body.len());
//!     })?;
//!     conn.get("/")?;
//!     conn.connection().wait_closed(Some(std::time::Duration::from_secs(5)));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  HttpServer / HttpConnection / HttpsConnection / WebSocketConnection |
//! +---------------------------------------------------------------------+
//! |   http | http-server | websocket | sse        (outermost layer)      |
//! +---------------------------------------------------------------------+
//! |   tls                                          (optional middle)     |
//! +---------------------------------------------------------------------+
//! |   tcp   <-  Connection: socket, receive thread, ProtocolStack        |
//! +---------------------------------------------------------------------+
//! |   buffer (MemoryBuffer, FileBuffer, AppendedBuffer, DataBuffer)      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`buffer`] - positioned byte buffers and the big-endian [`buffer::DataBuffer`] codec
//! - [`sync`] - [`sync::ThreadWaiter`] and [`sync::Semaphore`]
//! - [`protocol`] - layers, stacks and connections
//! - [`tls`] - TLS client layer
//! - [`http`] - HTTP/1.1, WebSocket, SSE, clients and server
//!
//! The crate logs through the `log` facade and installs no logger.

pub mod buffer;
mod error;
pub mod http;
pub mod protocol;
pub mod sync;
pub mod tls;

pub use error::{Error, Result};
