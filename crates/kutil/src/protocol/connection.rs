// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket-owning connection with a dedicated receive thread.
//!
//! # Threads and locks
//!
//! - The receive thread blocks in `recv`, feeds the staging buffer and
//!   runs parse steps. Each step holds the stack lock; user listeners and
//!   deferred closures run after it is released.
//! - `send_data` may be called from any thread. It packs under the stack
//!   lock and writes under the writer lock, so wire order equals pack order.
//! - Closing is idempotent: the first `close` shuts the socket down (which
//!   unblocks `recv`) and fires every close listener once.

use super::{ConnectionConfig, LayerEvent, LayerLink, Message, Outgoing, Protocol, ProtocolStack, Step};
use crate::error::{Error, Result};
use crate::sync::ThreadWaiter;
use parking_lot::Mutex;
use socket2::{Domain, Socket, Type};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Receives every message the dispatcher forwards.
pub type DataListener = Arc<dyn Fn(&Connection, Message) + Send + Sync>;

/// Fired once when the connection closes, with the cause if any.
pub type CloseListener = Box<dyn FnOnce(&Connection, Option<&Error>) + Send>;

type Deferred = Box<dyn FnOnce(&Connection) + Send>;

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-connection pre-dispatch hook.
///
/// Runs on the receive thread with the stack locked. It may answer,
/// mutate the stack, or swallow the message; whatever it returns goes to
/// the data listeners.
pub trait Dispatcher: Send + Sync {
    /// Decide what happens to a message from the outermost layer.
    fn dispatch(&self, _ctx: &mut DispatchContext<'_>, msg: Message) -> Result<Option<Message>> {
        Ok(Some(msg))
    }

    /// A layer raised an event.
    fn on_layer_event(
        &self,
        _ctx: &mut DispatchContext<'_>,
        _layer: usize,
        _event: LayerEvent,
    ) -> Result<()> {
        Ok(())
    }
}

/// Dispatcher forwarding every message unchanged.
#[derive(Debug, Default)]
pub struct PassThrough;

impl Dispatcher for PassThrough {}

/// What a dispatcher (or a layer link) may do while the stack is locked.
pub struct DispatchContext<'a> {
    conn: &'a Connection,
    stack: &'a mut ProtocolStack,
    deferred: Vec<Deferred>,
    close: Option<Option<Error>>,
}

impl<'a> DispatchContext<'a> {
    fn new(conn: &'a Connection, stack: &'a mut ProtocolStack) -> Self {
        Self {
            conn,
            stack,
            deferred: Vec::new(),
            close: None,
        }
    }

    /// Connection being dispatched.
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// The locked protocol stack.
    pub fn stack(&mut self) -> &mut ProtocolStack {
        &mut *self.stack
    }

    /// Pack `msg` at the outermost layer and write it.
    ///
    /// Returns `Ok(false)` when the connection is closed or closing.
    pub fn send(&mut self, msg: Message) -> Result<bool> {
        let top = self
            .stack
            .outermost()
            .ok_or_else(|| Error::Unsupported("empty protocol stack".into()))?;
        self.send_from(top, msg)
    }

    /// Pack `msg` at `layer` and write it.
    pub fn send_from(&mut self, layer: usize, msg: Message) -> Result<bool> {
        if self.closing() {
            return Ok(false);
        }
        let bytes = self.stack.pack(layer, msg)?;
        Ok(self.write(&bytes))
    }

    /// Run `f` once the stack lock is released.
    pub fn defer(&mut self, f: impl FnOnce(&Connection) + Send + 'static) {
        self.deferred.push(Box::new(f));
    }

    /// Close the connection once the current step is done.
    pub fn close(&mut self, cause: Option<Error>) {
        if self.close.is_none() {
            self.close = Some(cause);
        }
    }

    fn closing(&self) -> bool {
        self.close.is_some() || self.conn.is_closed()
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        match self.conn.write_bytes(bytes) {
            Ok(()) => true,
            Err(e) => {
                self.close(Some(Error::Io(e)));
                false
            }
        }
    }

    /// Apply what a layer queued on its link.
    fn apply_link(&mut self, link: LayerLink, dispatcher: &dyn Dispatcher) {
        let layer = link.layer();
        let (outgoing, events, close) = link.into_parts();
        for out in outgoing {
            if self.closing() {
                break;
            }
            let packed = match out {
                Outgoing::Message(msg) => self.stack.pack(layer, msg),
                Outgoing::Raw(bytes) => self.stack.pack_raw(layer, bytes),
            };
            match packed {
                Ok(bytes) => {
                    self.write(&bytes);
                }
                Err(e) => {
                    self.close(Some(e));
                    return;
                }
            }
        }
        for event in events {
            if let Err(e) = dispatcher.on_layer_event(self, layer, event) {
                self.close(Some(e));
            }
        }
        if close {
            self.close(None);
        }
    }

    fn fail_layer(&mut self, layer: usize, err: Error, dispatcher: &dyn Dispatcher) {
        log::debug!(
            "[connection#{}] layer {} failed: {}",
            self.conn.id(),
            layer,
            err
        );
        let mut link = LayerLink::new(layer);
        if let Some(protocol) = self.stack.layer_mut(layer) {
            protocol.on_failure(&err, &mut link);
        }
        self.apply_link(link, dispatcher);
        self.close(Some(err));
    }

    fn into_parts(self) -> (Vec<Deferred>, Option<Option<Error>>) {
        (self.deferred, self.close)
    }
}

// ============================================================================
// Connection
// ============================================================================

struct Shared {
    id: u64,
    config: ConnectionConfig,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    writer: Mutex<TcpStream>,
    /// Separate handle so shutdown never waits on a blocked write.
    control: TcpStream,
    reader: Mutex<Option<TcpStream>>,
    stack: Mutex<ProtocolStack>,
    dispatcher: Arc<dyn Dispatcher>,
    data_listeners: Mutex<Vec<DataListener>>,
    /// `None` once the close listeners fired.
    close_listeners: Mutex<Option<Vec<CloseListener>>>,
    closed: AtomicBool,
    closed_waiter: ThreadWaiter,
}

/// Cheap, cloneable handle to a live connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Resolve `host`, connect, and build a connection with `layers`.
    ///
    /// The receive thread is not running until [`Connection::start`].
    pub fn connect(
        host: &str,
        port: u16,
        config: ConnectionConfig,
        layers: Vec<Box<dyn Protocol>>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        let stream = open_stream(host, port, &config)?;
        Self::from_stream(stream, config, layers, dispatcher)
    }

    /// Wrap an already connected stream (used by the accept loop).
    pub fn from_stream(
        stream: TcpStream,
        config: ConnectionConfig,
        layers: Vec<Box<dyn Protocol>>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.read_timeout)?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let writer = stream.try_clone()?;
        let control = stream.try_clone()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "[connection#{}] open {} -> {}",
            id,
            local_addr,
            peer_addr
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                peer_addr,
                local_addr,
                writer: Mutex::new(writer),
                control,
                reader: Mutex::new(Some(stream)),
                stack: Mutex::new(ProtocolStack::with_layers(layers)),
                dispatcher,
                data_listeners: Mutex::new(Vec::new()),
                close_listeners: Mutex::new(Some(Vec::new())),
                closed: AtomicBool::new(false),
                closed_waiter: ThreadWaiter::new(),
            }),
        })
    }

    /// Let every layer open (e.g. send a ClientHello), then spawn the
    /// receive thread.
    pub fn start(&self) -> Result<()> {
        let reader = self
            .shared
            .reader
            .lock()
            .take()
            .ok_or_else(|| Error::Unsupported("connection already started".into()))?;

        let dispatcher = Arc::clone(&self.shared.dispatcher);
        let (deferred, close) = {
            let mut stack = self.shared.stack.lock();
            let mut ctx = DispatchContext::new(self, &mut stack);
            for layer in 0..ctx.stack.len() {
                let mut link = LayerLink::new(layer);
                let result = match ctx.stack.layer_mut(layer) {
                    Some(protocol) => protocol.on_connect(&mut link),
                    None => Ok(()),
                };
                ctx.apply_link(link, dispatcher.as_ref());
                if let Err(e) = result {
                    ctx.fail_layer(layer, e, dispatcher.as_ref());
                }
                if ctx.closing() {
                    break;
                }
            }
            ctx.into_parts()
        };
        for f in deferred {
            f(self);
        }
        if let Some(cause) = close {
            self.close_with(cause);
            return Err(Error::ConnectionClosed);
        }

        let conn = self.clone();
        thread::Builder::new()
            .name(format!("kutil-conn-{}", self.shared.id))
            .spawn(move || conn.receive_loop(reader))?;
        Ok(())
    }

    /// Unique connection id (process-wide counter).
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Register a data listener.
    pub fn on_data(&self, listener: impl Fn(&Connection, Message) + Send + Sync + 'static) {
        self.shared.data_listeners.lock().push(Arc::new(listener));
    }

    /// Register a close listener. Fires at once (without cause) when the
    /// connection is already closed.
    pub fn on_close(&self, listener: impl FnOnce(&Connection, Option<&Error>) + Send + 'static) {
        let mut guard = self.shared.close_listeners.lock();
        match guard.as_mut() {
            Some(listeners) => listeners.push(Box::new(listener)),
            None => {
                drop(guard);
                listener(self, None);
            }
        }
    }

    /// Run `f` with the locked protocol stack.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut ProtocolStack) -> R) -> R {
        let mut stack = self.shared.stack.lock();
        f(&mut *stack)
    }

    /// Send `msg` from the outermost layer.
    ///
    /// `Ok(false)` means the connection is closed (or the write closed it).
    /// Packing errors are returned and leave the connection open.
    pub fn send_data(&self, msg: Message) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let top = self
            .with_stack(|stack| stack.outermost())
            .ok_or_else(|| Error::Unsupported("empty protocol stack".into()))?;
        self.send_from(top, msg)
    }

    /// Send `msg` starting at layer `layer`.
    pub fn send_from(&self, layer: usize, msg: Message) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let written = {
            let mut stack = self.shared.stack.lock();
            let bytes = stack.pack(layer, msg)?;
            self.write_bytes(&bytes)
        };
        self.finish_write(written)
    }

    /// Write bytes straight to the socket, below every layer.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let written = {
            let _stack = self.shared.stack.lock();
            self.write_bytes(bytes)
        };
        self.finish_write(written)
    }

    fn finish_write(&self, written: io::Result<()>) -> Result<bool> {
        match written {
            Ok(()) => Ok(true),
            Err(e) => {
                self.close_with(Some(Error::Io(e)));
                Ok(false)
            }
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.shared.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Close without a cause.
    pub fn close(&self) {
        self.close_with(None);
    }

    /// Close the socket once and fire the close listeners with `cause`.
    pub fn close_with(&self, cause: Option<Error>) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &cause {
            None => log::debug!("[connection#{}] closed", self.shared.id),
            Some(Error::ConnectionClosed) => {
                log::debug!("[connection#{}] closed by peer", self.shared.id)
            }
            Some(e) => log::debug!("[connection#{}] closed: {}", self.shared.id, e),
        }
        let _ = self.shared.control.shutdown(Shutdown::Both);

        let listeners = self.shared.close_listeners.lock().take().unwrap_or_default();
        for listener in listeners {
            listener(self, cause.as_ref());
        }
        self.shared.closed_waiter.release();
    }

    /// Block until the connection is closed. `false` on timeout.
    pub fn wait_closed(&self, timeout: Option<Duration>) -> bool {
        self.shared.closed_waiter.wait(timeout)
    }

    // ------------------------------------------------------------------------
    // Receive thread
    // ------------------------------------------------------------------------

    fn receive_loop(self, mut reader: TcpStream) {
        let id = self.shared.id;
        let mut chunk = vec![0u8; self.shared.config.recv_chunk_size];
        loop {
            if self.is_closed() {
                break;
            }
            let n = match reader.read(&mut chunk) {
                Ok(0) => {
                    self.close_with(Some(Error::ConnectionClosed));
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    self.close_with(Some(Error::Timeout));
                    break;
                }
                Err(e) => {
                    self.close_with(Some(Error::Io(e)));
                    break;
                }
            };

            self.shared.stack.lock().feed(&chunk[..n]);
            if !self.process() {
                break;
            }
            // Layers move bytes upward while parsing, so the cap covers
            // every layer input, not only the staging buffer.
            let buffered = self.shared.stack.lock().buffered();
            if buffered > self.shared.config.max_staged_bytes {
                log::warn!(
                    "[connection#{}] {} unparsed bytes buffered, closing",
                    id,
                    buffered
                );
                self.close_with(Some(Error::Unsupported(format!(
                    "buffered input exceeded {} bytes",
                    self.shared.config.max_staged_bytes
                ))));
                break;
            }
        }
        log::debug!("[connection#{}] receive thread exiting", id);
    }

    /// Run parse steps until the stack is idle. `false` once closed.
    fn process(&self) -> bool {
        let dispatcher = Arc::clone(&self.shared.dispatcher);
        loop {
            let mut deliver = None;
            let (deferred, close) = {
                let mut stack = self.shared.stack.lock();
                let step = stack.unpack_next();
                let mut ctx = DispatchContext::new(self, &mut stack);
                match step {
                    Step::Idle => return true,
                    Step::Message(msg) => match dispatcher.dispatch(&mut ctx, msg) {
                        Ok(out) => deliver = out,
                        Err(e) => ctx.close(Some(e)),
                    },
                    Step::Control { layer, msg } => {
                        let mut link = LayerLink::new(layer);
                        let result = match ctx.stack.layer_mut(layer) {
                            Some(protocol) => protocol.on_data_inner(msg, &mut link),
                            None => Ok(()),
                        };
                        ctx.apply_link(link, dispatcher.as_ref());
                        if let Err(e) = result {
                            ctx.fail_layer(layer, e, dispatcher.as_ref());
                        }
                    }
                    Step::Failure { layer, err } => {
                        ctx.fail_layer(layer, err, dispatcher.as_ref());
                    }
                }
                ctx.into_parts()
            };

            for f in deferred {
                f(self);
            }
            if let Some(msg) = deliver {
                self.deliver(msg);
            }
            if let Some(cause) = close {
                self.close_with(cause);
                return false;
            }
            if self.is_closed() {
                return false;
            }
        }
    }

    fn deliver(&self, msg: Message) {
        let listeners = self.shared.data_listeners.lock().clone();
        let Some((last, rest)) = listeners.split_last() else {
            log::debug!(
                "[connection#{}] no data listener, dropping {}",
                self.shared.id,
                msg.kind()
            );
            return;
        };
        for listener in rest {
            listener(self, msg.clone());
        }
        last(self, msg);
    }
}

fn open_stream(host: &str, port: u16, config: &ConnectionConfig) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(socket2::Protocol::TCP))?;
        match socket.connect_timeout(&addr.into(), config.connect_timeout) {
            Ok(()) => return Ok(socket.into()),
            Err(e) => {
                log::debug!("[connection] connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(Error::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}:{}", host, port),
        )
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TcpProtocol;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn tcp_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let conn = Connection::connect(
            "127.0.0.1",
            port,
            ConnectionConfig::default(),
            vec![Box::new(TcpProtocol::new())],
            Arc::new(PassThrough),
        )
        .unwrap();
        let (peer, _) = listener.accept().unwrap();
        (conn, peer)
    }

    #[test]
    fn test_raw_round_trip() {
        let (conn, mut peer) = tcp_pair();
        let (tx, rx) = mpsc::channel();
        conn.on_data(move |_, msg| {
            if let Message::Raw(bytes) = msg {
                let _ = tx.send(bytes);
            }
        });
        conn.start().unwrap();

        assert!(conn.send_data(Message::Raw(b"ping".to_vec())).unwrap());
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").unwrap();
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, b"pong");
        conn.close();
    }

    #[test]
    fn test_peer_close_fires_listener_once() {
        let (conn, peer) = tcp_pair();
        let (tx, rx) = mpsc::channel();
        conn.on_close(move |_, cause| {
            let _ = tx.send(matches!(cause, Some(Error::ConnectionClosed)));
        });
        conn.start().unwrap();
        drop(peer);

        assert!(conn.wait_closed(Some(Duration::from_secs(5))));
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
        conn.close();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_send_after_close_returns_false() {
        let (conn, _peer) = tcp_pair();
        conn.start().unwrap();
        conn.close();
        assert!(conn.is_closed());
        assert!(!conn.send_data(Message::Raw(b"late".to_vec())).unwrap());

        let (tx, rx) = mpsc::channel();
        conn.on_close(move |_, cause| {
            let _ = tx.send(cause.is_none());
        });
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_pack_error_keeps_connection_open() {
        let (conn, _peer) = tcp_pair();
        conn.start().unwrap();
        let err = conn
            .send_data(Message::WsData(crate::http::WsData::text("x")))
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(!conn.is_closed());
        conn.close();
    }

    #[test]
    fn test_start_twice_fails() {
        let (conn, _peer) = tcp_pair();
        conn.start().unwrap();
        assert!(conn.start().is_err());
        conn.close();
    }
}
