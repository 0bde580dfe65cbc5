// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-sent events: encoder and the send-only layer used after upgrade.

use super::headers::{push_field, OMIT_CONTENT_LENGTH};
use super::HttpResponse;
use crate::buffer::{ByteBuffer, MemoryBuffer};
use crate::error::Error;
use crate::protocol::{Message, Protocol, Unpack, UnpackResult};

/// One event of an `text/event-stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: Option<Vec<u8>>,
    pub id: Option<String>,
}

impl Default for SseEvent {
    fn default() -> Self {
        Self::message()
    }
}

impl SseEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: None,
            id: None,
        }
    }

    /// Event of the default `message` type.
    pub fn message() -> Self {
        Self::new("message")
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Wire form. Each line of `data` gets its own `data:` field; line
    /// breaks inside `event` and `id` are dropped.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"event: ");
        push_field(&mut out, &self.event);
        out.extend_from_slice(b"\r\n");
        if let Some(data) = &self.data {
            for line in data_lines(data) {
                out.extend_from_slice(b"data: ");
                out.extend_from_slice(line);
                out.extend_from_slice(b"\r\n");
            }
        }
        if let Some(id) = &self.id {
            out.extend_from_slice(b"id: ");
            push_field(&mut out, id);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Split on CRLF, LF or a lone CR (all end a line in an event stream).
fn data_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => {
                lines.push(&data[start..i]);
                start = i + 1;
            }
            b'\r' => {
                lines.push(&data[start..i]);
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    lines.push(&data[start..]);
    lines
}

/// Response that switches a connection to an event stream.
pub fn sse_response() -> HttpResponse {
    HttpResponse::with_status(200)
        .with_header("Content-Type", "text/event-stream")
        .with_header("Cache-Control", "no-cache")
        .with_header(OMIT_CONTENT_LENGTH, "1")
}

/// Outermost layer of an upgraded SSE connection.
///
/// Events are only sent; anything the client still writes is passed up
/// as raw bytes.
#[derive(Debug, Default)]
pub struct SseProtocol;

impl SseProtocol {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for SseProtocol {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn unpack_subprotocol(
        &mut self,
        _input: &mut dyn ByteBuffer,
        _output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        Err(Error::Unsupported("sse must be the outermost layer".into()).into())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        if input.left_length() == 0 {
            return Err(Unpack::NeedMoreData);
        }
        Ok(Message::Raw(input.read_rest()?))
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        match msg {
            Message::Sse(event) => out.extend(&event.encode()),
            Message::Raw(bytes) => out.extend(&bytes),
            other => {
                return Err(Error::Unsupported(format!(
                    "sse cannot send a {} message",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    fn pack_subprotocol(&mut self, _payload: &mut MemoryBuffer) -> Result<(), Error> {
        Err(Error::Unsupported("sse must be the outermost layer".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_form() {
        let ev = SseEvent::new("update-time")
            .with_data("1700000000")
            .with_id("3");
        assert_eq!(
            ev.encode(),
            b"event: update-time\r\ndata: 1700000000\r\nid: 3\r\n\r\n"
        );
    }

    #[test]
    fn test_multiline_data() {
        let ev = SseEvent::message().with_data("a\nb\r\nc");
        assert_eq!(
            ev.encode(),
            b"event: message\r\ndata: a\r\ndata: b\r\ndata: c\r\n\r\n"
        );
        assert_eq!(SseEvent::default().encode(), b"event: message\r\n\r\n");
    }

    #[test]
    fn test_line_breaks_cannot_inject_fields() {
        let ev = SseEvent::new("x\r\ndata: forged")
            .with_data("one\rtwo")
            .with_id("7\n");
        assert_eq!(
            ev.encode(),
            b"event: xdata: forged\r\ndata: one\r\ndata: two\r\nid: 7\r\n\r\n"
        );
    }

    #[test]
    fn test_upgrade_response_headers() {
        let resp = sse_response();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.get("content-type"), Some("text/event-stream"));
        assert!(resp.headers.contains(OMIT_CONTENT_LENGTH));
    }

    #[test]
    fn test_layer_packs_events() {
        let mut sse = SseProtocol::new();
        let mut out = MemoryBuffer::new();
        sse.pack_data(Message::Sse(SseEvent::new("x").with_id("1")), &mut out)
            .unwrap();
        assert_eq!(out.as_slice(), b"event: x\r\nid: 1\r\n\r\n");
        assert!(sse
            .pack_data(Message::Request(crate::http::HttpRequest::get("/")), &mut out)
            .is_err());
    }
}
