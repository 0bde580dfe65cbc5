// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record framing.
//!
//! ```text
//! +------+---------+--------+---------------------------------+
//! | type | version | length | body (payload [mac] [padding])  |
//! |  1   |    2    |   2    |            length               |
//! +------+---------+--------+---------------------------------+
//! ```

use super::{Alert, TlsError, TlsVersion};
use crate::buffer::{ByteBuffer, DataBuffer};
use crate::protocol::{Unpack, UnpackResult};

/// Content type bytes.
pub mod content_type {
    pub const CHANGE_CIPHER_SPEC: u8 = 20;
    pub const ALERT: u8 = 21;
    pub const HANDSHAKE: u8 = 22;
    pub const APPLICATION_DATA: u8 = 23;
    pub const HEARTBEAT: u8 = 24;
}

/// Largest plaintext fragment.
pub const MAX_PLAINTEXT: usize = 1 << 14;

/// Largest record body accepted before decryption.
pub const MAX_CIPHERTEXT: usize = MAX_PLAINTEXT + 2048;

pub const HEADER_LEN: usize = 5;

/// One record as framed on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTlsRecord {
    pub content_type: u8,
    pub version: u16,
    pub payload: Vec<u8>,
    pub mac: Option<Vec<u8>>,
    pub padding: Option<Vec<u8>>,
}

impl RawTlsRecord {
    pub fn new(content_type: u8, version: u16, payload: Vec<u8>) -> Self {
        Self {
            content_type,
            version,
            payload,
            mac: None,
            padding: None,
        }
    }

    /// Read one record from `buf`.
    ///
    /// `mac_len` bytes are split off the end of the body when non-zero.
    /// With `block_padding`, the last body byte gives the padding length
    /// and `pad_len + 1` bytes are split off before the MAC.
    pub fn read(
        buf: &mut dyn ByteBuffer,
        mac_len: usize,
        block_padding: bool,
    ) -> UnpackResult<Self> {
        let mut r = DataBuffer::new(buf);
        let content_type = r.read_u8()?;
        let version = r.read_u16()?;
        if TlsVersion::from_wire(version).is_none() {
            return Err(TlsError::ProtocolVersion(version).into());
        }
        let len = r.read_u16()? as usize;
        if len > MAX_CIPHERTEXT {
            return Err(TlsError::RecordOverflow(len).into());
        }
        let mut body = r.read_bytes(len)?;

        let padding = if block_padding {
            let pad_len = *body.last().ok_or_else(|| Unpack::from(short_body()))? as usize;
            if pad_len + 1 > body.len() {
                return Err(TlsError::BadRecordMac.into());
            }
            Some(body.split_off(body.len() - pad_len - 1))
        } else {
            None
        };
        let mac = if mac_len > 0 {
            if mac_len > body.len() {
                return Err(TlsError::BadRecordMac.into());
            }
            Some(body.split_off(body.len() - mac_len))
        } else {
            None
        };

        Ok(Self {
            content_type,
            version,
            payload: body,
            mac,
            padding,
        })
    }

    pub fn body_len(&self) -> usize {
        self.payload.len()
            + self.mac.as_ref().map_or(0, Vec::len)
            + self.padding.as_ref().map_or(0, Vec::len)
    }

    /// Header and body as sent.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body_len());
        out.push(self.content_type);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(self.body_len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        if let Some(mac) = &self.mac {
            out.extend_from_slice(mac);
        }
        if let Some(padding) = &self.padding {
            out.extend_from_slice(padding);
        }
        out
    }
}

fn short_body() -> TlsError {
    TlsError::Decode("empty record body".into())
}

/// Handshake message with its type, body kept undecoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHandshake {
    pub msg_type: u8,
    pub body: Vec<u8>,
}

impl RawHandshake {
    /// Type, u24 length and body, as hashed into the transcript.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.push(self.msg_type);
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&self.body);
        out
    }
}

/// Decrypted record, typed by content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TlsRecord {
    ChangeCipherSpec,
    Alert(Alert),
    /// Complete handshake messages; may span several records.
    Handshake(Vec<RawHandshake>),
    Application(Vec<u8>),
    Heartbeat(Vec<u8>),
}

impl TlsRecord {
    pub fn content_type(&self) -> u8 {
        use content_type::*;
        match self {
            Self::ChangeCipherSpec => CHANGE_CIPHER_SPEC,
            Self::Alert(_) => ALERT,
            Self::Handshake(_) => HANDSHAKE,
            Self::Application(_) => APPLICATION_DATA,
            Self::Heartbeat(_) => HEARTBEAT,
        }
    }

    /// Record payload.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::ChangeCipherSpec => vec![1],
            Self::Alert(alert) => alert.to_bytes().to_vec(),
            Self::Handshake(msgs) => msgs.iter().flat_map(RawHandshake::encode).collect(),
            Self::Application(data) | Self::Heartbeat(data) => data.clone(),
        }
    }
}

/// Reassembles handshake messages split across records.
#[derive(Debug, Default)]
pub struct HandshakeJoiner {
    pending: Vec<u8>,
}

impl HandshakeJoiner {
    pub fn push(&mut self, fragment: &[u8]) {
        self.pending.extend_from_slice(fragment);
    }

    /// True while a message is partially received.
    pub fn is_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take every complete message.
    pub fn drain(&mut self) -> Result<Vec<RawHandshake>, TlsError> {
        let mut out = Vec::new();
        let mut at = 0;
        while self.pending.len() - at >= 4 {
            let header = &self.pending[at..at + 4];
            let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
            if len > MAX_HANDSHAKE {
                return Err(TlsError::Decode(format!("handshake message of {} bytes", len)));
            }
            if self.pending.len() - at - 4 < len {
                break;
            }
            out.push(RawHandshake {
                msg_type: header[0],
                body: self.pending[at + 4..at + 4 + len].to_vec(),
            });
            at += 4 + len;
        }
        self.pending.drain(..at);
        Ok(out)
    }
}

/// Largest handshake message accepted (certificate chains included).
const MAX_HANDSHAKE: usize = 1 << 18;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;

    #[test]
    fn test_read_plain_record() {
        let mut buf = MemoryBuffer::from_bytes(vec![22, 3, 3, 0, 2, 0xAA, 0xBB, 0x99]);
        let rec = RawTlsRecord::read(&mut buf, 0, false).unwrap();
        assert_eq!(rec.content_type, 22);
        assert_eq!(rec.payload, vec![0xAA, 0xBB]);
        assert_eq!(buf.pointer(), 7);
        assert_eq!(rec.to_bytes(), vec![22, 3, 3, 0, 2, 0xAA, 0xBB]);
    }

    #[test]
    fn test_alert_record_round_trip() {
        let wire = vec![21, 3, 3, 0, 2, 2, 50];
        let mut buf = MemoryBuffer::from_bytes(wire.clone());
        let rec = RawTlsRecord::read(&mut buf, 0, false).unwrap();
        let alert = Alert::parse(&rec.payload).unwrap();
        assert_eq!(alert.level, crate::tls::AlertLevel::Fatal);
        assert_eq!(alert.code, 50);
        let again = RawTlsRecord::new(21, 0x0303, alert.to_bytes().to_vec());
        assert_eq!(again.to_bytes(), wire);
    }

    #[test]
    fn test_short_record_needs_more() {
        let mut buf = MemoryBuffer::from_bytes(vec![22, 3, 3, 0, 4, 1]);
        assert!(matches!(
            RawTlsRecord::read(&mut buf, 0, false),
            Err(Unpack::NeedMoreData)
        ));
        let mut buf = MemoryBuffer::from_bytes(vec![22, 3]);
        assert!(matches!(
            RawTlsRecord::read(&mut buf, 0, false),
            Err(Unpack::NeedMoreData)
        ));
    }

    #[test]
    fn test_bad_version_is_protocol_version() {
        let mut buf = MemoryBuffer::from_bytes(vec![22, 0x7F, 0x01, 0, 0]);
        match RawTlsRecord::read(&mut buf, 0, false) {
            Err(Unpack::Fail(crate::Error::Tls(e))) => assert_eq!(e.alert_code(), Some(70)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_oversized_record() {
        let mut buf = MemoryBuffer::from_bytes(vec![23, 3, 3, 0xFF, 0xFF]);
        match RawTlsRecord::read(&mut buf, 0, false) {
            Err(Unpack::Fail(crate::Error::Tls(e))) => assert_eq!(e.alert_code(), Some(22)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mac_and_padding_split() {
        // payload "hi", 2-byte mac, padding of 2 (+ length byte)
        let mut buf = MemoryBuffer::from_bytes(vec![23, 3, 3, 0, 7, b'h', b'i', 0xA1, 0xA2, 2, 2, 2]);
        let rec = RawTlsRecord::read(&mut buf, 2, true).unwrap();
        assert_eq!(rec.payload, b"hi");
        assert_eq!(rec.mac, Some(vec![0xA1, 0xA2]));
        assert_eq!(rec.padding, Some(vec![2, 2, 2]));
        assert_eq!(rec.body_len(), 7);
    }

    #[test]
    fn test_joiner_across_records() {
        let msg = RawHandshake {
            msg_type: 2,
            body: vec![9; 10],
        }
        .encode();
        let mut joiner = HandshakeJoiner::default();
        joiner.push(&msg[..6]);
        assert!(joiner.drain().unwrap().is_empty());
        assert!(joiner.is_partial());
        joiner.push(&msg[6..]);
        joiner.push(&[14, 0, 0, 0]);
        let msgs = joiner.drain().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].body, vec![9; 10]);
        assert_eq!(msgs[1].msg_type, 14);
        assert!(!joiner.is_partial());
    }
}
