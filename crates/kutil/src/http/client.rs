// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client connection types: plain HTTP, HTTPS and WebSocket.

use super::codec::HttpClientProtocol;
use super::websocket::{accept_key, close_code, generate_client_key, WebSocketProtocol, WsData, WsFrame};
use super::{HttpError, HttpRequest, HttpResponse, Opcode};
use crate::error::{Error, Result};
use crate::protocol::{
    Connection, ConnectionConfig, DispatchContext, Dispatcher, LayerEvent, Message, PassThrough,
    Protocol, TcpProtocol,
};
use crate::sync::ThreadWaiter;
use crate::tls::{TlsConfig, TlsProtocol, TlsStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn host_header(host: &str, port: u16, default_port: u16) -> String {
    if port == default_port {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Plain HTTP/1.1 client over `[tcp, http]`.
#[derive(Clone, Debug)]
pub struct HttpConnection {
    conn: Connection,
}

impl HttpConnection {
    /// Connect to `host:port`; every response goes to `on_response`.
    pub fn connect(
        host: &str,
        port: u16,
        on_response: impl Fn(&HttpConnection, HttpResponse) + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::connect_with(host, port, ConnectionConfig::default(), on_response)
    }

    pub fn connect_with(
        host: &str,
        port: u16,
        config: ConnectionConfig,
        on_response: impl Fn(&HttpConnection, HttpResponse) + Send + Sync + 'static,
    ) -> Result<Self> {
        let layers: Vec<Box<dyn Protocol>> = vec![
            Box::new(TcpProtocol::new()),
            Box::new(HttpClientProtocol::new(Some(host_header(host, port, 80)))),
        ];
        let conn = Connection::connect(host, port, config, layers, Arc::new(PassThrough))?;
        conn.on_data(move |conn, msg| {
            if let Message::Response(response) = msg {
                on_response(&HttpConnection { conn: conn.clone() }, response);
            }
        });
        conn.start()?;
        Ok(Self { conn })
    }

    pub fn send(&self, request: HttpRequest) -> Result<bool> {
        self.conn.send_data(Message::Request(request))
    }

    /// Send `GET uri`.
    pub fn get(&self, uri: &str) -> Result<bool> {
        self.send(HttpRequest::get(uri))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn close(&self) {
        self.conn.close();
    }
}

// ============================================================================
// HTTPS
// ============================================================================

/// Called once the TLS handshake completed.
pub type EstablishedCallback = Arc<dyn Fn(&HttpsConnection) + Send + Sync>;

struct HttpsDispatcher {
    status: Arc<Mutex<TlsStatus>>,
    waiter: Arc<ThreadWaiter>,
    on_established: Option<EstablishedCallback>,
}

impl Dispatcher for HttpsDispatcher {
    fn on_layer_event(
        &self,
        ctx: &mut DispatchContext<'_>,
        layer: usize,
        event: LayerEvent,
    ) -> Result<()> {
        if event != LayerEvent::Established {
            return Ok(());
        }
        log::debug!(
            "[https] connection#{} layer {} established",
            ctx.connection().id(),
            layer
        );
        self.waiter.release();
        if let Some(callback) = self.on_established.clone() {
            let status = Arc::clone(&self.status);
            let waiter = Arc::clone(&self.waiter);
            ctx.defer(move |conn| {
                callback(&HttpsConnection {
                    conn: conn.clone(),
                    status,
                    waiter,
                })
            });
        }
        Ok(())
    }
}

/// HTTP/1.1 over TLS: `[tcp, tls, http]`.
///
/// Requests sent before the handshake completes fail with
/// [`Error::NotEstablished`]; wait with [`HttpsConnection::wait_established`]
/// or send from the established callback.
#[derive(Clone)]
pub struct HttpsConnection {
    conn: Connection,
    status: Arc<Mutex<TlsStatus>>,
    waiter: Arc<ThreadWaiter>,
}

impl std::fmt::Debug for HttpsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsConnection")
            .field("conn", &self.conn)
            .field("state", &self.status.lock().state)
            .finish()
    }
}

impl HttpsConnection {
    /// Connect with the default TLS settings for `host`.
    pub fn connect(
        host: &str,
        port: u16,
        on_response: impl Fn(&HttpsConnection, HttpResponse) + Send + Sync + 'static,
        on_established: impl Fn(&HttpsConnection) + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::connect_with(
            host,
            port,
            TlsConfig::new(host),
            ConnectionConfig::default(),
            on_response,
            Some(Arc::new(on_established)),
        )
    }

    pub fn connect_with(
        host: &str,
        port: u16,
        tls: TlsConfig,
        config: ConnectionConfig,
        on_response: impl Fn(&HttpsConnection, HttpResponse) + Send + Sync + 'static,
        on_established: Option<EstablishedCallback>,
    ) -> Result<Self> {
        let tls = TlsProtocol::new(tls)?;
        let status = tls.status();
        let waiter = Arc::new(ThreadWaiter::new());
        let dispatcher = Arc::new(HttpsDispatcher {
            status: Arc::clone(&status),
            waiter: Arc::clone(&waiter),
            on_established,
        });
        let layers: Vec<Box<dyn Protocol>> = vec![
            Box::new(TcpProtocol::new()),
            Box::new(tls),
            Box::new(HttpClientProtocol::new(Some(host_header(host, port, 443)))),
        ];
        let conn = Connection::connect(host, port, config, layers, dispatcher)?;
        let this = Self {
            conn,
            status,
            waiter,
        };

        let (status, waiter) = (Arc::clone(&this.status), Arc::clone(&this.waiter));
        this.conn.on_data(move |conn, msg| {
            if let Message::Response(response) = msg {
                let https = HttpsConnection {
                    conn: conn.clone(),
                    status: Arc::clone(&status),
                    waiter: Arc::clone(&waiter),
                };
                on_response(&https, response);
            }
        });
        let waiter = Arc::clone(&this.waiter);
        this.conn.on_close(move |_, _| waiter.release());
        this.conn.start()?;
        Ok(this)
    }

    /// Block until the handshake completed or the connection closed.
    /// True only when established.
    pub fn wait_established(&self, timeout: Option<Duration>) -> bool {
        self.waiter.wait(timeout);
        self.is_established()
    }

    pub fn is_established(&self) -> bool {
        self.status.lock().is_established()
    }

    /// Snapshot of the TLS session.
    pub fn tls_status(&self) -> TlsStatus {
        self.status.lock().clone()
    }

    pub fn send(&self, request: HttpRequest) -> Result<bool> {
        self.conn.send_data(Message::Request(request))
    }

    pub fn get(&self, uri: &str) -> Result<bool> {
        self.send(HttpRequest::get(uri))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn close(&self) {
        self.conn.close();
    }
}

// ============================================================================
// WebSocket
// ============================================================================

#[derive(Debug, Default)]
struct WsClientState {
    open: AtomicBool,
    waiter: ThreadWaiter,
}

struct WsClientDispatcher {
    expected_accept: String,
    state: Arc<WsClientState>,
}

impl WsClientDispatcher {
    fn on_upgrade(&self, ctx: &mut DispatchContext<'_>, response: HttpResponse) -> Result<Option<Message>> {
        let accepted = response.status == 101
            && response.headers.has_token("Upgrade", "websocket")
            && response.headers.get("Sec-WebSocket-Accept").map(str::trim)
                == Some(self.expected_accept.as_str());
        if !accepted {
            let err = HttpError::BadUpgrade(format!(
                "server answered {} {}",
                response.status, response.reason
            ));
            log::debug!("[websocket] connection#{} {}", ctx.connection().id(), err);
            ctx.close(Some(Error::Http(err)));
            return Ok(None);
        }

        let stack = ctx.stack();
        if let Some(index) = stack.position("http") {
            stack.remove_protocol(index);
        }
        stack.add_protocol(Box::new(WebSocketProtocol::client()));
        self.state.open.store(true, Ordering::Release);
        self.state.waiter.release();
        log::info!("[websocket] connection#{} open", ctx.connection().id());
        Ok(None)
    }
}

impl Dispatcher for WsClientDispatcher {
    fn dispatch(&self, ctx: &mut DispatchContext<'_>, msg: Message) -> Result<Option<Message>> {
        match msg {
            Message::Response(response) if !self.state.open.load(Ordering::Acquire) => {
                self.on_upgrade(ctx, response)
            }
            Message::WsFrame(frame) => match frame.opcode {
                Opcode::Ping => {
                    ctx.send(Message::WsFrame(WsFrame::pong(frame.payload)))?;
                    Ok(None)
                }
                Opcode::Close => {
                    let code = frame.close_code().unwrap_or(close_code::NORMAL);
                    ctx.send(Message::WsFrame(WsFrame::close(code, "")))?;
                    ctx.close(None);
                    Ok(None)
                }
                _ => Ok(None),
            },
            other => Ok(Some(other)),
        }
    }
}

/// WebSocket client: HTTP upgrade handshake, then masked frames.
#[derive(Clone, Debug)]
pub struct WebSocketConnection {
    conn: Connection,
    state: Arc<WsClientState>,
}

impl WebSocketConnection {
    /// Connect and send the upgrade request for `path`. Messages go to
    /// `on_message`; use [`WebSocketConnection::wait_open`] before sending.
    pub fn connect(
        host: &str,
        port: u16,
        path: &str,
        on_message: impl Fn(&WebSocketConnection, WsData) + Send + Sync + 'static,
    ) -> Result<Self> {
        let key = generate_client_key()?;
        let state = Arc::new(WsClientState::default());
        let dispatcher = Arc::new(WsClientDispatcher {
            expected_accept: accept_key(&key),
            state: Arc::clone(&state),
        });
        let layers: Vec<Box<dyn Protocol>> = vec![
            Box::new(TcpProtocol::new()),
            Box::new(HttpClientProtocol::new(Some(host_header(host, port, 80)))),
        ];
        let conn = Connection::connect(host, port, ConnectionConfig::default(), layers, dispatcher)?;
        let this = Self { conn, state };

        let state = Arc::clone(&this.state);
        this.conn.on_data(move |conn, msg| {
            if let Message::WsData(data) = msg {
                let ws = WebSocketConnection {
                    conn: conn.clone(),
                    state: Arc::clone(&state),
                };
                on_message(&ws, data);
            }
        });
        let state = Arc::clone(&this.state);
        this.conn.on_close(move |_, _| state.waiter.release());
        this.conn.start()?;

        let upgrade = HttpRequest::get(path)
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Key", key)
            .with_header("Sec-WebSocket-Version", "13");
        this.conn.send_data(Message::Request(upgrade))?;
        Ok(this)
    }

    /// Block until the upgrade completed or failed. True when open.
    pub fn wait_open(&self, timeout: Option<Duration>) -> bool {
        self.state.waiter.wait(timeout);
        self.is_open()
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire) && !self.conn.is_closed()
    }

    pub fn send(&self, data: WsData) -> Result<bool> {
        if !self.state.open.load(Ordering::Acquire) {
            return Err(Error::NotEstablished);
        }
        self.conn.send_data(Message::WsData(data))
    }

    pub fn send_text(&self, text: &str) -> Result<bool> {
        self.send(WsData::text(text))
    }

    pub fn send_binary(&self, payload: impl Into<Vec<u8>>) -> Result<bool> {
        self.send(WsData::binary(payload))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Send a normal close frame, then close the socket.
    pub fn close(&self) {
        if self.is_open() {
            let _ = self
                .conn
                .send_data(Message::WsFrame(WsFrame::close(close_code::NORMAL, "")));
        }
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_header_port() {
        assert_eq!(host_header("example.com", 80, 80), "example.com");
        assert_eq!(host_header("example.com", 8080, 80), "example.com:8080");
        assert_eq!(host_header("example.com", 443, 443), "example.com");
    }

    #[test]
    fn test_connect_refused() {
        // bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        assert!(HttpConnection::connect("127.0.0.1", port, |_, _| {}).is_err());
    }
}
