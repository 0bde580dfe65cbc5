// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Layered protocol core.
//!
//! A [`Connection`] owns a socket, a receive thread and a [`ProtocolStack`]:
//! an ordered list of [`Protocol`] layers, lowest (TCP) first.
//!
//! # Data flow
//!
//! ```text
//!  recv()  ->  staging  --unpack_subprotocol-->  input[1]  --...-->  input[n-1]
//!                layer 0                            layer 1            layer n-1
//!                                                                  unpack_data -> Message
//!                                                                       |
//!                                                 Dispatcher::dispatch  v
//!                                                                  on-data listeners
//!
//!  send_data(msg)  ->  layer n-1 pack_data  ->  pack_subprotocol (n-2 .. 0)  ->  send()
//! ```
//!
//! Middle layers move complete units (a TLS record, a whole TCP read) into
//! the input buffer of the layer above. A middle layer that meets one of
//! its own control units (a TLS handshake record) stops the parse with
//! [`Unpack::Stop`]; the unit is handed to that layer's
//! [`Protocol::on_data_inner`] and never reaches the layers above.

mod config;
mod connection;
mod stack;
mod tcp;

pub use config::ConnectionConfig;
pub use connection::{
    CloseListener, Connection, DataListener, DispatchContext, Dispatcher, PassThrough,
};
pub use stack::{ProtocolStack, Step};
pub use tcp::TcpProtocol;

use crate::buffer::{BufferError, ByteBuffer, MemoryBuffer};
use crate::error::Error;
use crate::http::{HttpError, HttpRequest, HttpResponse, SseEvent, WsData, WsFrame};
use crate::tls::{TlsError, TlsRecord};

// ============================================================================
// Messages
// ============================================================================

/// Typed unit produced by `unpack_data` and consumed by `pack_data`.
#[derive(Clone, Debug)]
pub enum Message {
    /// Opaque bytes (TCP payload, SSE input).
    Raw(Vec<u8>),
    /// TLS record (handshake, alert, change-cipher-spec).
    Tls(TlsRecord),
    /// HTTP request.
    Request(HttpRequest),
    /// HTTP response.
    Response(HttpResponse),
    /// Single WebSocket frame (control frames, or data frames to send).
    WsFrame(WsFrame),
    /// Reassembled WebSocket message.
    WsData(WsData),
    /// Server-sent event.
    Sse(SseEvent),
}

impl Message {
    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw",
            Self::Tls(_) => "tls",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::WsFrame(_) => "ws-frame",
            Self::WsData(_) => "ws-data",
            Self::Sse(_) => "sse",
        }
    }
}

// ============================================================================
// Parse control
// ============================================================================

/// Non-success outcomes of an unpack call.
#[derive(Debug)]
pub enum Unpack {
    /// Input is incomplete; wait for more bytes. The stack rewinds the
    /// input pointer, so the layer must not rely on partial consumption.
    NeedMoreData,
    /// The layer extracted one of its own control units; deliver it to
    /// [`Protocol::on_data_inner`] of the same layer.
    Stop(Message),
    /// Unrecoverable parse failure; the connection closes.
    Fail(Error),
}

impl From<BufferError> for Unpack {
    fn from(e: BufferError) -> Self {
        if e.is_underflow() {
            Self::NeedMoreData
        } else {
            Self::Fail(Error::Buffer(e))
        }
    }
}

impl From<Error> for Unpack {
    fn from(e: Error) -> Self {
        Self::Fail(e)
    }
}

impl From<TlsError> for Unpack {
    fn from(e: TlsError) -> Self {
        Self::Fail(Error::Tls(e))
    }
}

impl From<HttpError> for Unpack {
    fn from(e: HttpError) -> Self {
        Self::Fail(Error::Http(e))
    }
}

/// Result of an unpack call.
pub type UnpackResult<T> = Result<T, Unpack>;

// ============================================================================
// Layer link
// ============================================================================

/// Event a layer raises towards the connection's dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerEvent {
    /// The layer finished its handshake and carries application data.
    Established,
}

/// Something a layer wants written to the socket.
#[derive(Debug)]
pub enum Outgoing {
    /// Pack at the layer itself, then through every layer below.
    Message(Message),
    /// Bytes already framed by the layer; only layers below wrap them.
    Raw(Vec<u8>),
}

/// Indexed back-reference from a layer to its connection.
///
/// Layers never hold the connection. The stack hands them a link while it
/// calls them; everything queued on the link is applied once the call
/// returns, in order.
#[derive(Debug)]
pub struct LayerLink {
    layer: usize,
    outgoing: Vec<Outgoing>,
    events: Vec<LayerEvent>,
    close: bool,
}

impl LayerLink {
    /// Link for the layer at `layer`.
    pub fn new(layer: usize) -> Self {
        Self {
            layer,
            outgoing: Vec::new(),
            events: Vec::new(),
            close: false,
        }
    }

    /// Index of the layer in its stack.
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Queue a message packed from this layer down.
    pub fn send(&mut self, msg: Message) {
        self.outgoing.push(Outgoing::Message(msg));
    }

    /// Queue bytes already framed by this layer.
    pub fn send_raw(&mut self, bytes: Vec<u8>) {
        self.outgoing.push(Outgoing::Raw(bytes));
    }

    /// Raise an event to the dispatcher.
    pub fn emit(&mut self, event: LayerEvent) {
        self.events.push(event);
    }

    /// Close the connection after the queued output is written.
    pub fn request_close(&mut self) {
        self.close = true;
    }

    /// True once [`LayerLink::request_close`] was called.
    pub fn close_requested(&self) -> bool {
        self.close
    }

    pub(crate) fn into_parts(self) -> (Vec<Outgoing>, Vec<LayerEvent>, bool) {
        (self.outgoing, self.events, self.close)
    }
}

// ============================================================================
// Protocol trait
// ============================================================================

/// One layer of a connection's protocol stack.
pub trait Protocol: Send {
    /// Name used in logs and for [`ProtocolStack::position`].
    fn name(&self) -> &'static str;

    /// Consume one unit from `input` and append what it carries for the
    /// layer above to `output`.
    ///
    /// Called repeatedly while it returns `Ok` and consumes input.
    fn unpack_subprotocol(
        &mut self,
        input: &mut dyn ByteBuffer,
        output: &mut MemoryBuffer,
    ) -> UnpackResult<()>;

    /// Parse one typed message from `input` (outermost layer only).
    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message>;

    /// Serialise `msg` into `out`.
    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error>;

    /// Wrap the bytes produced by the layer above, in place.
    fn pack_subprotocol(&mut self, payload: &mut MemoryBuffer) -> Result<(), Error>;

    /// Connection started; the layer may queue an opening message.
    fn on_connect(&mut self, _link: &mut LayerLink) -> Result<(), Error> {
        Ok(())
    }

    /// A control unit this layer stopped the parse with.
    fn on_data_inner(&mut self, msg: Message, _link: &mut LayerLink) -> Result<(), Error> {
        log::debug!("[{}] dropping control message {}", self.name(), msg.kind());
        Ok(())
    }

    /// This layer failed; last chance to tell the peer before close.
    fn on_failure(&mut self, _err: &Error, _link: &mut LayerLink) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_maps_to_need_more_data() {
        let u: Unpack = BufferError::NotFound.into();
        assert!(matches!(u, Unpack::NeedMoreData));
        let u: Unpack = BufferError::OutOfBoundsRead {
            requested: 2,
            available: 0,
        }
        .into();
        assert!(matches!(u, Unpack::NeedMoreData));
        let u: Unpack = BufferError::Destroyed.into();
        assert!(matches!(u, Unpack::Fail(Error::Buffer(BufferError::Destroyed))));
    }

    #[test]
    fn test_link_keeps_order() {
        let mut link = LayerLink::new(1);
        link.send_raw(vec![1]);
        link.send(Message::Raw(vec![2]));
        link.emit(LayerEvent::Established);
        link.request_close();
        assert_eq!(link.layer(), 1);
        let (out, events, close) = link.into_parts();
        assert!(matches!(out[0], Outgoing::Raw(_)));
        assert!(matches!(out[1], Outgoing::Message(Message::Raw(_))));
        assert_eq!(events, vec![LayerEvent::Established]);
        assert!(close);
    }
}
