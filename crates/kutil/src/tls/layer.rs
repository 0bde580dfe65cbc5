// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS as a protocol layer.

use super::record::{content_type, TlsRecord};
use super::state::{ClientSession, HandshakeState, TlsStatus};
use super::{Alert, TlsConfig, TlsError};
use crate::buffer::{ByteBuffer, MemoryBuffer};
use crate::error::Error;
use crate::protocol::{LayerLink, Message, Protocol, Unpack, UnpackResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Client-side TLS layer.
///
/// Handshake, alert and change-cipher-spec records stop the parse and are
/// handled in [`Protocol::on_data_inner`]; decrypted application data flows
/// to the layer above (or out as [`Message::Raw`] when TLS is outermost).
#[derive(Debug)]
pub struct TlsProtocol {
    session: ClientSession,
}

impl TlsProtocol {
    pub fn new(config: TlsConfig) -> Result<Self, TlsError> {
        Ok(Self {
            session: ClientSession::new(config)?,
        })
    }

    /// Shared view of the session state.
    pub fn status(&self) -> Arc<Mutex<TlsStatus>> {
        self.session.status()
    }

    pub fn state(&self) -> HandshakeState {
        self.session.state()
    }

    pub fn is_established(&self) -> bool {
        self.session.is_established()
    }

    /// Read one record. `Some` carries application data; `None` means a
    /// handshake fragment was buffered.
    fn unpack_record(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Option<Vec<u8>>> {
        let (ty, data) = self.session.read_record(input)?;
        match ty {
            content_type::APPLICATION_DATA => {
                if !self.session.is_established() {
                    return Err(TlsError::UnexpectedMessage(
                        "application data before the handshake finished".into(),
                    )
                    .into());
                }
                Ok(Some(data))
            }
            content_type::HANDSHAKE => {
                let msgs = self.session.push_handshake(&data)?;
                if msgs.is_empty() {
                    Ok(None)
                } else {
                    Err(Unpack::Stop(Message::Tls(TlsRecord::Handshake(msgs))))
                }
            }
            content_type::ALERT => Err(Unpack::Stop(Message::Tls(TlsRecord::Alert(
                Alert::parse(&data)?,
            )))),
            content_type::CHANGE_CIPHER_SPEC => {
                if data != [1] {
                    return Err(TlsError::Decode("change_cipher_spec body".into()).into());
                }
                Err(Unpack::Stop(Message::Tls(TlsRecord::ChangeCipherSpec)))
            }
            content_type::HEARTBEAT => Err(Unpack::Stop(Message::Tls(TlsRecord::Heartbeat(data)))),
            other => Err(TlsError::UnexpectedMessage(format!("content type {}", other)).into()),
        }
    }

    fn seal_application(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.session.is_established() {
            log::debug!(
                "[tls] {} refusing application data in state {}",
                self.session.config().server_name,
                self.session.state()
            );
            return Err(Error::NotEstablished);
        }
        Ok(self.session.frame(content_type::APPLICATION_DATA, data)?)
    }
}

impl Protocol for TlsProtocol {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn unpack_subprotocol(
        &mut self,
        input: &mut dyn ByteBuffer,
        output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        if let Some(data) = self.unpack_record(input)? {
            output.extend(&data);
        }
        Ok(())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        loop {
            if let Some(data) = self.unpack_record(input)? {
                return Ok(Message::Raw(data));
            }
            // fragment is in the joiner; never parse it twice
            input.reset_before_pointer()?;
        }
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        let bytes = match msg {
            Message::Raw(data) => self.seal_application(&data)?,
            Message::Tls(record) => self.session.frame(record.content_type(), &record.payload())?,
            other => {
                return Err(Error::Unsupported(format!(
                    "tls layer cannot pack a {} message",
                    other.kind()
                )))
            }
        };
        out.extend(&bytes);
        Ok(())
    }

    fn pack_subprotocol(&mut self, payload: &mut MemoryBuffer) -> Result<(), Error> {
        let inner = payload.take();
        let sealed = self.seal_application(&inner)?;
        payload.extend(&sealed);
        Ok(())
    }

    fn on_connect(&mut self, link: &mut LayerLink) -> Result<(), Error> {
        Ok(self.session.start(link)?)
    }

    fn on_data_inner(&mut self, msg: Message, link: &mut LayerLink) -> Result<(), Error> {
        match msg {
            Message::Tls(record) => Ok(self.session.handle(record, link)?),
            other => Err(Error::Unsupported(format!(
                "tls layer got a {} control message",
                other.kind()
            ))),
        }
    }

    fn on_failure(&mut self, err: &Error, link: &mut LayerLink) {
        let code = match err {
            Error::Tls(e) => e.alert_code(),
            _ => Some(super::alert::codes::INTERNAL_ERROR),
        };
        log::debug!("[tls] layer failure: {}", err);
        self.session.fail(code, link);
    }
}
