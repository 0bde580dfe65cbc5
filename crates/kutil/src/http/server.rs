// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1 server with WebSocket and SSE upgrades.
//!
//! The listener is non-blocking and polled by a dedicated accept thread.
//! Every accepted socket becomes a [`Connection`] with `[tcp, http-server]`
//! layers and its own receive thread.
//!
//! Upgrade predicates run on the receive thread while the connection's
//! stack is locked: they must decide, not send.

use super::codec::HttpServerProtocol;
use super::sse::{sse_response, SseProtocol};
use super::websocket::{accept_key, close_code, is_valid_client_key, WebSocketProtocol, WsData, WsFrame};
use super::{HttpError, HttpRequest, HttpResponse, Method, Opcode, SseEvent};
use crate::error::{Error, Result};
use crate::protocol::{
    Connection, ConnectionConfig, DispatchContext, Dispatcher, Message, Protocol, TcpProtocol,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Settings of every accepted connection
    pub connection: ConnectionConfig,
    /// `listen(2)` backlog
    pub backlog: i32,
    /// Value of the `Server` response header
    pub server_header: String,
    /// Sleep between polls of the non-blocking listener
    pub accept_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            backlog: 128,
            server_header: "KUtil".to_string(),
            accept_poll: Duration::from_millis(10),
        }
    }
}

impl ServerConfig {
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_server_header(mut self, value: impl Into<String>) -> Self {
        self.server_header = value.into();
        self
    }

    pub fn with_accept_poll(mut self, poll: Duration) -> Self {
        self.accept_poll = poll;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        self.connection.validate()?;
        if self.backlog <= 0 {
            return Err("backlog must be > 0");
        }
        if self.server_header.is_empty() {
            return Err("server_header cannot be empty");
        }
        if self.accept_poll.is_zero() {
            return Err("accept_poll must be > 0");
        }
        Ok(())
    }
}

// ============================================================================
// Server connection
// ============================================================================

#[derive(Debug, Default)]
struct UpgradeState {
    ws: AtomicBool,
    sse: AtomicBool,
}

/// Accepted connection plus its upgrade state.
#[derive(Clone)]
pub struct HttpServerConnection {
    conn: Connection,
    state: Arc<UpgradeState>,
}

impl fmt::Debug for HttpServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerConnection")
            .field("conn", &self.conn)
            .field("ws", &self.did_upgrade_to_ws())
            .field("sse", &self.did_upgrade_to_sse())
            .finish()
    }
}

impl HttpServerConnection {
    fn new(conn: Connection, state: Arc<UpgradeState>) -> Self {
        Self { conn, state }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn id(&self) -> u64 {
        self.conn.id()
    }

    pub fn did_upgrade_to_ws(&self) -> bool {
        self.state.ws.load(Ordering::Acquire)
    }

    pub fn did_upgrade_to_sse(&self) -> bool {
        self.state.sse.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Send any message from the outermost layer.
    pub fn send_data(&self, msg: Message) -> Result<bool> {
        self.conn.send_data(msg)
    }

    pub fn send_response(&self, response: HttpResponse) -> Result<bool> {
        self.conn.send_data(Message::Response(response))
    }

    /// Send a WebSocket message (after upgrade).
    pub fn send_ws(&self, data: WsData) -> Result<bool> {
        self.conn.send_data(Message::WsData(data))
    }

    pub fn send_text(&self, text: &str) -> Result<bool> {
        self.send_ws(WsData::text(text))
    }

    /// Send an event (after SSE upgrade).
    pub fn send_sse(&self, event: SseEvent) -> Result<bool> {
        self.conn.send_data(Message::Sse(event))
    }

    /// Close; WebSocket connections get a normal close frame first.
    pub fn close(&self) {
        if self.did_upgrade_to_ws() && !self.conn.is_closed() {
            let _ = self
                .conn
                .send_data(Message::WsFrame(WsFrame::close(close_code::NORMAL, "")));
        }
        self.conn.close();
    }

    pub fn on_data(&self, listener: impl Fn(&HttpServerConnection, Message) + Send + Sync + 'static) {
        let state = Arc::clone(&self.state);
        self.conn.on_data(move |conn, msg| {
            listener(&HttpServerConnection::new(conn.clone(), Arc::clone(&state)), msg)
        });
    }

    pub fn on_close(
        &self,
        listener: impl FnOnce(&HttpServerConnection, Option<&Error>) + Send + 'static,
    ) {
        let state = Arc::clone(&self.state);
        self.conn.on_close(move |conn, cause| {
            listener(&HttpServerConnection::new(conn.clone(), state), cause)
        });
    }
}

// ============================================================================
// Upgrade handling
// ============================================================================

/// Decides whether a request may upgrade.
pub type UpgradePredicate = Arc<dyn Fn(&HttpServerConnection, &HttpRequest) -> bool + Send + Sync>;

/// Called once an upgrade completed (outside the stack lock).
pub type UpgradeCallback = Arc<dyn Fn(&HttpServerConnection) + Send + Sync>;

/// Called for every accepted connection, before it starts receiving.
pub type ConnectionCallback = Arc<dyn Fn(&HttpServerConnection) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    ws_accept: RwLock<Option<UpgradePredicate>>,
    sse_accept: RwLock<Option<UpgradePredicate>>,
    on_ws: RwLock<Option<UpgradeCallback>>,
    on_sse: RwLock<Option<UpgradeCallback>>,
}

fn check_ws_upgrade(req: &HttpRequest) -> std::result::Result<&str, HttpError> {
    if req.method != Method::Get {
        return Err(HttpError::BadUpgrade(format!("{} cannot upgrade", req.method)));
    }
    if !req.headers.has_token("Connection", "upgrade") {
        return Err(HttpError::BadUpgrade("Connection lacks upgrade".into()));
    }
    if req.headers.get("Sec-WebSocket-Version").map(str::trim) != Some("13") {
        return Err(HttpError::BadUpgrade("Sec-WebSocket-Version must be 13".into()));
    }
    match req.headers.get("Sec-WebSocket-Key") {
        Some(key) if is_valid_client_key(key) => Ok(key.trim()),
        _ => Err(HttpError::BadUpgrade("missing or invalid Sec-WebSocket-Key".into())),
    }
}

struct ServerDispatcher {
    hooks: Arc<Hooks>,
    state: Arc<UpgradeState>,
}

impl ServerDispatcher {
    fn wrap(&self, conn: &Connection) -> HttpServerConnection {
        HttpServerConnection::new(conn.clone(), Arc::clone(&self.state))
    }

    /// Swap the http layer for `layer`.
    fn replace_http_layer(ctx: &mut DispatchContext<'_>, layer: Box<dyn Protocol>) {
        let stack = ctx.stack();
        if let Some(index) = stack.position("http-server") {
            stack.remove_protocol(index);
        }
        stack.add_protocol(layer);
    }

    fn defer_callback(&self, ctx: &mut DispatchContext<'_>, callback: Option<UpgradeCallback>) {
        if let Some(callback) = callback {
            let state = Arc::clone(&self.state);
            ctx.defer(move |conn| callback(&HttpServerConnection::new(conn.clone(), state)));
        }
    }

    fn on_request(&self, ctx: &mut DispatchContext<'_>, req: HttpRequest) -> Result<Option<Message>> {
        let conn = self.wrap(ctx.connection());

        if req.wants_websocket() {
            let key = match check_ws_upgrade(&req) {
                Ok(key) => key.to_string(),
                Err(e) => {
                    log::debug!("[http-server] connection#{} {}", conn.id(), e);
                    let resp = HttpResponse::text(400, format!("{}\n", e))
                        .with_header("Connection", "close");
                    ctx.send(Message::Response(resp))?;
                    ctx.close(Some(Error::Http(e)));
                    return Ok(None);
                }
            };
            let predicate = self.hooks.ws_accept.read().clone();
            if !predicate.is_some_and(|accept| accept(&conn, &req)) {
                return Ok(Some(Message::Request(req)));
            }

            let resp = HttpResponse::with_status(101)
                .with_header("Upgrade", "websocket")
                .with_header("Connection", "Upgrade")
                .with_header("Sec-WebSocket-Accept", accept_key(&key));
            ctx.send(Message::Response(resp))?;
            Self::replace_http_layer(ctx, Box::new(WebSocketProtocol::server()));
            self.state.ws.store(true, Ordering::Release);
            log::info!(
                "[http-server] connection#{} upgraded to websocket on {}",
                conn.id(),
                req.path()
            );
            let callback = self.hooks.on_ws.read().clone();
            self.defer_callback(ctx, callback);
            return Ok(None);
        }

        let predicate = self.hooks.sse_accept.read().clone();
        if predicate.is_some_and(|accept| accept(&conn, &req)) {
            ctx.send(Message::Response(sse_response()))?;
            Self::replace_http_layer(ctx, Box::new(SseProtocol::new()));
            self.state.sse.store(true, Ordering::Release);
            log::info!(
                "[http-server] connection#{} upgraded to event stream on {}",
                conn.id(),
                req.path()
            );
            let callback = self.hooks.on_sse.read().clone();
            self.defer_callback(ctx, callback);
            return Ok(None);
        }

        Ok(Some(Message::Request(req)))
    }

    fn on_control(&self, ctx: &mut DispatchContext<'_>, frame: WsFrame) -> Result<Option<Message>> {
        match frame.opcode {
            Opcode::Ping => {
                ctx.send(Message::WsFrame(WsFrame::pong(frame.payload)))?;
                Ok(None)
            }
            Opcode::Close => {
                let code = frame.close_code().unwrap_or(close_code::NORMAL);
                ctx.send(Message::WsFrame(WsFrame::close(code, "")))?;
                ctx.close(None);
                Ok(Some(Message::WsFrame(frame)))
            }
            _ => Ok(None),
        }
    }
}

impl Dispatcher for ServerDispatcher {
    fn dispatch(&self, ctx: &mut DispatchContext<'_>, msg: Message) -> Result<Option<Message>> {
        match msg {
            Message::Request(req) => self.on_request(ctx, req),
            Message::WsFrame(frame) => self.on_control(ctx, frame),
            Message::Raw(bytes) if self.state.sse.load(Ordering::Acquire) => {
                log::debug!(
                    "[http-server] connection#{} ignoring {} bytes on event stream",
                    ctx.connection().id(),
                    bytes.len()
                );
                Ok(None)
            }
            other => Ok(Some(other)),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Listening HTTP server.
pub struct HttpServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: ServerConfig,
    hooks: Arc<Hooks>,
    on_connection: ConnectionCallback,
    connections: Arc<Mutex<Vec<HttpServerConnection>>>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.local_addr)
            .field("listening", &self.accept_thread.is_some())
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

impl HttpServer {
    /// Bind `addr` (e.g. `"127.0.0.1:8080"`, port 0 for any) with defaults.
    pub fn bind(
        addr: &str,
        on_connection: impl Fn(&HttpServerConnection) + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::bind_with_config(addr, ServerConfig::default(), on_connection)
    }

    pub fn bind_with_config(
        addr: &str,
        config: ServerConfig,
        on_connection: impl Fn(&HttpServerConnection) + Send + Sync + 'static,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|msg| Error::Unsupported(format!("invalid server config: {}", msg)))?;
        let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no address for {}", addr))
        })?;
        let listener = create_tcp_listener(addr, config.backlog)?;
        let local_addr = listener.local_addr()?;
        log::debug!("[http-server] bound {}", local_addr);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            config,
            hooks: Arc::new(Hooks::default()),
            on_connection: Arc::new(on_connection),
            connections: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            accept_thread: None,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept WebSocket upgrades for which `predicate` returns true.
    pub fn set_ws_accept(
        &self,
        predicate: impl Fn(&HttpServerConnection, &HttpRequest) -> bool + Send + Sync + 'static,
    ) {
        *self.hooks.ws_accept.write() = Some(Arc::new(predicate));
    }

    /// Upgrade to an event stream when `predicate` returns true.
    pub fn set_sse_accept(
        &self,
        predicate: impl Fn(&HttpServerConnection, &HttpRequest) -> bool + Send + Sync + 'static,
    ) {
        *self.hooks.sse_accept.write() = Some(Arc::new(predicate));
    }

    pub fn on_ws_established(&self, callback: impl Fn(&HttpServerConnection) + Send + Sync + 'static) {
        *self.hooks.on_ws.write() = Some(Arc::new(callback));
    }

    pub fn on_sse_established(&self, callback: impl Fn(&HttpServerConnection) + Send + Sync + 'static) {
        *self.hooks.on_sse.write() = Some(Arc::new(callback));
    }

    /// Live connections (closed ones are pruned on the next accept).
    pub fn connections(&self) -> Vec<HttpServerConnection> {
        self.connections.lock().clone()
    }

    /// Start the accept thread.
    pub fn listen(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Unsupported("server already listening".into()))?;
        let ctx = AcceptContext {
            config: self.config.clone(),
            hooks: Arc::clone(&self.hooks),
            on_connection: Arc::clone(&self.on_connection),
            connections: Arc::clone(&self.connections),
            shutdown: Arc::clone(&self.shutdown),
        };
        let handle = thread::Builder::new()
            .name("kutil-accept".into())
            .spawn(move || accept_loop(listener, ctx))?;
        self.accept_thread = Some(handle);
        log::debug!("[http-server] listening on {}", self.local_addr);
        Ok(())
    }

    /// Stop accepting and close every live connection.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let connections: Vec<_> = self.connections.lock().drain(..).collect();
        for conn in connections {
            conn.close();
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn create_tcp_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

struct AcceptContext {
    config: ServerConfig,
    hooks: Arc<Hooks>,
    on_connection: ConnectionCallback,
    connections: Arc<Mutex<Vec<HttpServerConnection>>>,
    shutdown: Arc<AtomicBool>,
}

fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    loop {
        if ctx.shutdown.load(Ordering::Acquire) {
            break;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    log::debug!("[http-server] dropping {}: {}", addr, e);
                    continue;
                }
                if let Err(e) = serve(stream, &ctx) {
                    log::debug!("[http-server] connection from {} failed: {}", addr, e);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ctx.config.accept_poll);
            }
            Err(e) => {
                log::debug!("[http-server] accept error: {}", e);
                thread::sleep(ctx.config.accept_poll);
            }
        }
    }
    log::debug!("[http-server] accept loop exiting");
}

fn serve(stream: std::net::TcpStream, ctx: &AcceptContext) -> Result<()> {
    let state = Arc::new(UpgradeState::default());
    let dispatcher = Arc::new(ServerDispatcher {
        hooks: Arc::clone(&ctx.hooks),
        state: Arc::clone(&state),
    });
    let layers: Vec<Box<dyn Protocol>> = vec![
        Box::new(TcpProtocol::new()),
        Box::new(HttpServerProtocol::new(ctx.config.server_header.clone())),
    ];
    let conn = Connection::from_stream(stream, ctx.config.connection.clone(), layers, dispatcher)?;
    let conn = HttpServerConnection::new(conn, state);
    {
        let mut live = ctx.connections.lock();
        live.retain(|c| !c.is_closed());
        live.push(conn.clone());
    }
    (ctx.on_connection)(&conn);
    conn.connection().start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ServerConfig::default().with_backlog(0).validate().is_err());
        assert!(ServerConfig::default()
            .with_server_header("")
            .validate()
            .is_err());
        assert!(ServerConfig::default()
            .with_accept_poll(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_upgrade_validation() {
        let good = HttpRequest::get("/ws")
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "keep-alive, Upgrade")
            .with_header("Sec-WebSocket-Version", "13")
            .with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(check_ws_upgrade(&good).unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");

        let old = good.clone().with_header("Sec-WebSocket-Version", "8");
        assert!(check_ws_upgrade(&old).is_err());
        let short = good.clone().with_header("Sec-WebSocket-Key", "c2hvcnQ=");
        assert!(check_ws_upgrade(&short).is_err());
        let mut post = good;
        post.method = Method::Post;
        assert!(check_ws_upgrade(&post).is_err());
    }

    #[test]
    fn test_bind_reports_port() {
        let mut server = HttpServer::bind("127.0.0.1:0", |_| {}).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.listen().unwrap();
        assert!(server.listen().is_err());
        server.shutdown();
        assert!(server.connections().is_empty());
    }
}
