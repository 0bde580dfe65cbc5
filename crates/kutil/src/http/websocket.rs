// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket framing (RFC 6455 section 5) and the WebSocket protocol layer.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use super::HttpError;
use crate::buffer::{ByteBuffer, DataBuffer, MemoryBuffer};
use crate::error::Error;
use crate::protocol::{LayerLink, Message, Protocol, UnpackResult};
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default largest accepted message (frame payload or reassembled message).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Close status codes used by this crate.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

/// `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// True when `key` is the base64 encoding of exactly 16 bytes.
pub fn is_valid_client_key(key: &str) -> bool {
    base64::engine::general_purpose::STANDARD
        .decode(key.trim())
        .map(|raw| raw.len() == 16)
        .unwrap_or(false)
}

/// Fresh random `Sec-WebSocket-Key`.
pub fn generate_client_key() -> Result<String, Error> {
    let mut raw = [0u8; 16];
    fill_random(&mut raw)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(raw))
}

fn fill_random(out: &mut [u8]) -> Result<(), Error> {
    SystemRandom::new()
        .fill(out)
        .map_err(|_| Error::Unsupported("system random source failed".into()))
}

/// XOR `payload` with `key`, cyclically. Masking and unmasking are the same.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

fn ws_error(msg: impl Into<String>) -> HttpError {
    HttpError::WebSocket(msg.into())
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, HttpError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(ws_error(format!("unknown opcode 0x{:x}", other))),
        }
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// One WebSocket frame. `payload` is always stored unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    pub fin: bool,
    pub opcode: Opcode,
    /// Masking key used on the wire, if any.
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl WsFrame {
    fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, text.into().into_bytes())
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, payload.into())
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Ping, payload.into())
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Pong, payload.into())
    }

    /// Close frame carrying `code` and a UTF-8 `reason`.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        // control payloads are limited to 125 bytes
        payload.truncate(125);
        Self::new(Opcode::Close, payload)
    }

    /// Status code of a close frame, when present.
    pub fn close_code(&self) -> Option<u16> {
        match (self.opcode, self.payload.as_slice()) {
            (Opcode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.opcode == Opcode::Binary
    }

    /// Wire form, masked with `self.mask` when set.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 14);
        out.push(u8::from(self.fin) << 7 | self.opcode as u8);
        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        if len < 126 {
            out.push(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        match self.mask {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }
        out
    }

    /// Read one frame, unmasking its payload.
    pub fn parse(input: &mut dyn ByteBuffer, max_payload: usize) -> UnpackResult<Self> {
        let mut data = DataBuffer::new(input);
        let b0 = data.read_u8()?;
        let b1 = data.read_u8()?;
        if b0 & 0x70 != 0 {
            return Err(ws_error("reserved bits set without extension").into());
        }
        let fin = b0 & 0x80 != 0;
        let opcode = Opcode::from_u8(b0 & 0x0F)?;
        let len = match b1 & 0x7F {
            126 => data.read_u16()? as u64,
            127 => {
                let len = data.read_u64()?;
                if len >> 63 != 0 {
                    return Err(ws_error("64-bit length with most significant bit set").into());
                }
                len
            }
            short => short as u64,
        };
        if opcode.is_control() && (len > 125 || !fin) {
            return Err(ws_error("oversized or fragmented control frame").into());
        }
        if len > max_payload as u64 {
            return Err(HttpError::FrameTooLarge(len, max_payload).into());
        }
        let mask = if b1 & 0x80 != 0 {
            let raw = data.read_bytes(4)?;
            Some([raw[0], raw[1], raw[2], raw[3]])
        } else {
            None
        };
        let mut payload = data.read_bytes(len as usize)?;
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }
        Ok(Self {
            fin,
            opcode,
            mask,
            payload,
        })
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A complete (reassembled) WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsData {
    pub payload: Vec<u8>,
    pub is_binary: bool,
}

impl WsData {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: text.into().into_bytes(),
            is_binary: false,
        }
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            is_binary: true,
        }
    }

    /// Payload as text, for text messages.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_binary {
            return None;
        }
        std::str::from_utf8(&self.payload).ok()
    }

    fn into_frame(self) -> WsFrame {
        if self.is_binary {
            WsFrame::binary(self.payload)
        } else {
            WsFrame::new(Opcode::Text, self.payload)
        }
    }
}

/// Joins data frames into messages.
#[derive(Debug)]
pub struct Reassembler {
    first: Option<Opcode>,
    buffer: Vec<u8>,
    max: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Reassembler {
    pub fn new(max: usize) -> Self {
        Self {
            first: None,
            buffer: Vec::new(),
            max,
        }
    }

    /// True while a fragmented message is open.
    pub fn in_progress(&self) -> bool {
        self.first.is_some()
    }

    /// Feed a data frame; returns the message once its final frame arrived.
    pub fn push(&mut self, frame: WsFrame) -> Result<Option<WsData>, HttpError> {
        match (frame.opcode, self.first) {
            (op, _) if op.is_control() => {
                return Err(ws_error("control frame fed to reassembly"));
            }
            (Opcode::Continuation, None) => {
                return Err(ws_error("continuation frame without a message"));
            }
            (Opcode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ws_error("new message inside a fragmented one"));
            }
            (op, None) => self.first = Some(op),
        }
        if self.buffer.len() + frame.payload.len() > self.max {
            let len = (self.buffer.len() + frame.payload.len()) as u64;
            return Err(HttpError::FrameTooLarge(len, self.max));
        }
        self.buffer.extend_from_slice(&frame.payload);
        if !frame.fin {
            return Ok(None);
        }

        let is_binary = self.first.take() == Some(Opcode::Binary);
        let payload = std::mem::take(&mut self.buffer);
        if !is_binary && std::str::from_utf8(&payload).is_err() {
            return Err(HttpError::InvalidUtf8);
        }
        Ok(Some(WsData { payload, is_binary }))
    }
}

// ============================================================================
// Protocol layer
// ============================================================================

/// Endpoint role: clients mask what they send, servers require masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// WebSocket layer, added on top of TCP (or TLS) after an upgrade.
///
/// Control frames come out as [`Message::WsFrame`]; data frames are joined
/// and come out as [`Message::WsData`].
#[derive(Debug)]
pub struct WebSocketProtocol {
    role: Role,
    reassembler: Reassembler,
    max_payload: usize,
}

impl WebSocketProtocol {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            reassembler: Reassembler::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self.reassembler = Reassembler::new(max);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl Protocol for WebSocketProtocol {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn unpack_subprotocol(
        &mut self,
        _input: &mut dyn ByteBuffer,
        _output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        Err(Error::Unsupported("websocket must be the outermost layer".into()).into())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        loop {
            let frame = WsFrame::parse(input, self.max_payload)?;
            match (self.role, frame.mask.is_some()) {
                (Role::Server, false) => return Err(ws_error("unmasked client frame").into()),
                (Role::Client, true) => return Err(ws_error("masked server frame").into()),
                _ => {}
            }
            // fragments already held by the reassembler leave the buffer
            input.reset_before_pointer()?;
            if frame.opcode.is_control() {
                return Ok(Message::WsFrame(frame));
            }
            if let Some(data) = self.reassembler.push(frame)? {
                return Ok(Message::WsData(data));
            }
        }
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        let mut frame = match msg {
            Message::WsFrame(frame) => frame,
            Message::WsData(data) => data.into_frame(),
            Message::Raw(bytes) => WsFrame::binary(bytes),
            other => {
                return Err(Error::Unsupported(format!(
                    "websocket cannot send a {} message",
                    other.kind()
                )))
            }
        };
        frame.mask = match self.role {
            Role::Client => {
                let mut key = [0u8; 4];
                fill_random(&mut key)?;
                Some(key)
            }
            Role::Server => None,
        };
        out.extend(&frame.encode());
        Ok(())
    }

    fn pack_subprotocol(&mut self, _payload: &mut MemoryBuffer) -> Result<(), Error> {
        Err(Error::Unsupported("websocket must be the outermost layer".into()))
    }

    fn on_failure(&mut self, err: &Error, link: &mut LayerLink) {
        let code = match err {
            Error::Http(HttpError::FrameTooLarge(..)) => close_code::MESSAGE_TOO_BIG,
            Error::Http(HttpError::InvalidUtf8) => close_code::INVALID_PAYLOAD,
            _ => close_code::PROTOCOL_ERROR,
        };
        log::debug!("[websocket] closing with {}: {}", code, err);
        link.send(Message::WsFrame(WsFrame::close(code, "")));
    }
}
