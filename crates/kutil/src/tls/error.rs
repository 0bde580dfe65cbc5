// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS error types.
//!
//! Every error knows the alert it translates to (see [`TlsError::alert_code`]).

use super::alert::{codes, Alert};
use crate::buffer::BufferError;
use super::TlsVersion;
use std::fmt;

/// TLS failures, each mapped to an outgoing alert.
#[derive(Debug, Clone)]
pub enum TlsError {
    /// Malformed message (decode_error, 50)
    Decode(String),
    /// Message not valid in the current state (unexpected_message, 10)
    UnexpectedMessage(String),
    /// Field value out of range or inconsistent (illegal_parameter, 47)
    IllegalParameter(String),
    /// No acceptable parameters (handshake_failure, 40)
    HandshakeFailure(String),
    /// Certificate chain failed verification (bad_certificate, 42)
    BadCertificate(String),
    /// Server sent no certificate although one is required; the alert
    /// depends on the negotiated version (41 / 40 / 116)
    MissingCertificate(TlsVersion),
    /// Unsupported or unparseable protocol version (protocol_version, 70)
    ProtocolVersion(u16),
    /// Record failed authentication (bad_record_mac, 20)
    BadRecordMac,
    /// Record longer than allowed (record_overflow, 22)
    RecordOverflow(usize),
    /// Signature or Finished check failed (decrypt_error, 51)
    DecryptError(String),
    /// Parameters below the security floor (insufficient_security, 71)
    InsufficientSecurity(String),
    /// Extension not allowed in this message (unsupported_extension, 110)
    UnsupportedExtension(u16),
    /// Local failure (internal_error, 80)
    Internal(String),
    /// Peer sent a fatal alert; nothing is sent back
    AlertReceived(Alert),
}

impl TlsError {
    /// Alert to send before closing, `None` when the peer already alerted.
    pub fn alert_code(&self) -> Option<u8> {
        Some(match self {
            Self::Decode(_) => codes::DECODE_ERROR,
            Self::UnexpectedMessage(_) => codes::UNEXPECTED_MESSAGE,
            Self::IllegalParameter(_) => codes::ILLEGAL_PARAMETER,
            Self::HandshakeFailure(_) => codes::HANDSHAKE_FAILURE,
            Self::BadCertificate(_) => codes::BAD_CERTIFICATE,
            Self::MissingCertificate(version) => match version {
                TlsVersion::Ssl3 => codes::NO_CERTIFICATE,
                TlsVersion::Tls13 => codes::CERTIFICATE_REQUIRED,
                _ => codes::HANDSHAKE_FAILURE,
            },
            Self::ProtocolVersion(_) => codes::PROTOCOL_VERSION,
            Self::BadRecordMac => codes::BAD_RECORD_MAC,
            Self::RecordOverflow(_) => codes::RECORD_OVERFLOW,
            Self::DecryptError(_) => codes::DECRYPT_ERROR,
            Self::InsufficientSecurity(_) => codes::INSUFFICIENT_SECURITY,
            Self::UnsupportedExtension(_) => codes::UNSUPPORTED_EXTENSION,
            Self::Internal(_) => codes::INTERNAL_ERROR,
            Self::AlertReceived(_) => return None,
        })
    }
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "decode error: {}", msg),
            Self::UnexpectedMessage(msg) => write!(f, "unexpected message: {}", msg),
            Self::IllegalParameter(msg) => write!(f, "illegal parameter: {}", msg),
            Self::HandshakeFailure(msg) => write!(f, "handshake failure: {}", msg),
            Self::BadCertificate(msg) => write!(f, "bad certificate: {}", msg),
            Self::MissingCertificate(v) => write!(f, "server sent no certificate ({})", v),
            Self::ProtocolVersion(v) => write!(f, "unsupported protocol version 0x{:04x}", v),
            Self::BadRecordMac => write!(f, "record authentication failed"),
            Self::RecordOverflow(len) => write!(f, "record of {} bytes exceeds the limit", len),
            Self::DecryptError(msg) => write!(f, "decrypt error: {}", msg),
            Self::InsufficientSecurity(msg) => write!(f, "insufficient security: {}", msg),
            Self::UnsupportedExtension(ty) => write!(f, "unsupported extension 0x{:04x}", ty),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
            Self::AlertReceived(alert) => write!(f, "peer sent alert {}", alert),
        }
    }
}

impl std::error::Error for TlsError {}

/// A complete message that runs short or carries bad data is malformed.
impl From<BufferError> for TlsError {
    fn from(e: BufferError) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_mapping() {
        assert_eq!(TlsError::Decode("x".into()).alert_code(), Some(50));
        assert_eq!(TlsError::Internal("x".into()).alert_code(), Some(80));
        assert_eq!(TlsError::IllegalParameter("x".into()).alert_code(), Some(47));
        assert_eq!(TlsError::BadCertificate("x".into()).alert_code(), Some(42));
        assert_eq!(TlsError::ProtocolVersion(0x0305).alert_code(), Some(70));
        assert_eq!(TlsError::HandshakeFailure("x".into()).alert_code(), Some(40));
    }

    #[test]
    fn test_missing_certificate_depends_on_version() {
        assert_eq!(
            TlsError::MissingCertificate(TlsVersion::Ssl3).alert_code(),
            Some(41)
        );
        assert_eq!(
            TlsError::MissingCertificate(TlsVersion::Tls12).alert_code(),
            Some(40)
        );
        assert_eq!(
            TlsError::MissingCertificate(TlsVersion::Tls13).alert_code(),
            Some(116)
        );
    }

    #[test]
    fn test_received_alert_is_not_answered() {
        let e = TlsError::AlertReceived(Alert::fatal(40));
        assert_eq!(e.alert_code(), None);
    }
}
