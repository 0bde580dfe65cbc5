// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1, WebSocket and server-sent events.
//!
//! | Type | Layers |
//! |------|--------|
//! | [`HttpConnection`] | `tcp`, `http` |
//! | [`HttpsConnection`] | `tcp`, `tls`, `http` |
//! | [`WebSocketConnection`] | `tcp`, `http`, then `tcp`, `websocket` |
//! | [`HttpServer`] connection | `tcp`, `http-server`, then `websocket` or `sse` |
//!
//! # Example
//!
//! ```no_run
//! use kutil::http::{HttpResponse, HttpServer, Message};
//!
//! let mut server = HttpServer::bind("127.0.0.1:8080", |conn| {
//!     conn.on_data(|conn, msg| {
//!         if let Message::Request(req) = msg {
//!             let resp = match req.path() {
//!                 "/" => HttpResponse::html("<h1>hello</h1>"),
//!                 _ => HttpResponse::with_status(404),
//!             };
//!             let _ = conn.send_response(resp);
//!         }
//!     });
//! })?;
//! server.set_ws_accept(|_, req| req.path() == "/ws");
//! server.listen()?;
//! # Ok::<(), kutil::Error>(())
//! ```

mod client;
mod codec;
mod error;
mod headers;
mod message;
mod server;
mod sse;
pub mod websocket;

pub use crate::protocol::Message;
pub use client::{EstablishedCallback, HttpConnection, HttpsConnection, WebSocketConnection};
pub use codec::{
    parse_request, parse_response, write_request, write_response, HttpClientProtocol,
    HttpServerProtocol, MAX_HEAD,
};
pub use error::HttpError;
pub use headers::{HeaderMap, OMIT_CONTENT_LENGTH};
pub use message::{reason_phrase, Body, HttpRequest, HttpResponse, HttpThing, Method};
pub use server::{
    ConnectionCallback, HttpServer, HttpServerConnection, ServerConfig, UpgradeCallback,
    UpgradePredicate,
};
pub use sse::{sse_response, SseEvent, SseProtocol};
pub use websocket::{Opcode, Role, WebSocketProtocol, WsData, WsFrame};
