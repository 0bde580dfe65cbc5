// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Alert protocol (RFC 8446 section 6, RFC 5246 section 7.2).

use super::{TlsError, TlsVersion};
use std::fmt;

/// Alert codes.
pub mod codes {
    pub const CLOSE_NOTIFY: u8 = 0;
    pub const UNEXPECTED_MESSAGE: u8 = 10;
    pub const BAD_RECORD_MAC: u8 = 20;
    pub const DECRYPTION_FAILED: u8 = 21;
    pub const RECORD_OVERFLOW: u8 = 22;
    pub const DECOMPRESSION_FAILURE: u8 = 30;
    pub const HANDSHAKE_FAILURE: u8 = 40;
    pub const NO_CERTIFICATE: u8 = 41;
    pub const BAD_CERTIFICATE: u8 = 42;
    pub const UNSUPPORTED_CERTIFICATE: u8 = 43;
    pub const CERTIFICATE_REVOKED: u8 = 44;
    pub const CERTIFICATE_EXPIRED: u8 = 45;
    pub const CERTIFICATE_UNKNOWN: u8 = 46;
    pub const ILLEGAL_PARAMETER: u8 = 47;
    pub const UNKNOWN_CA: u8 = 48;
    pub const ACCESS_DENIED: u8 = 49;
    pub const DECODE_ERROR: u8 = 50;
    pub const DECRYPT_ERROR: u8 = 51;
    pub const EXPORT_RESTRICTION: u8 = 60;
    pub const PROTOCOL_VERSION: u8 = 70;
    pub const INSUFFICIENT_SECURITY: u8 = 71;
    pub const INTERNAL_ERROR: u8 = 80;
    pub const INAPPROPRIATE_FALLBACK: u8 = 86;
    pub const USER_CANCELED: u8 = 90;
    pub const NO_RENEGOTIATION: u8 = 100;
    pub const MISSING_EXTENSION: u8 = 109;
    pub const UNSUPPORTED_EXTENSION: u8 = 110;
    pub const CERTIFICATE_UNOBTAINABLE: u8 = 111;
    pub const UNRECOGNIZED_NAME: u8 = 112;
    pub const BAD_CERTIFICATE_STATUS_RESPONSE: u8 = 113;
    pub const BAD_CERTIFICATE_HASH_VALUE: u8 = 114;
    pub const UNKNOWN_PSK_IDENTITY: u8 = 115;
    pub const CERTIFICATE_REQUIRED: u8 = 116;
    pub const NO_APPLICATION_PROTOCOL: u8 = 120;
}

/// Alert level byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    fn from_wire(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Warning),
            2 => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// Levels a code may be sent with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fatality {
    WarningOnly,
    FatalOnly,
    Either,
}

impl Fatality {
    fn allows(self, level: AlertLevel) -> bool {
        match self {
            Self::WarningOnly => level == AlertLevel::Warning,
            Self::FatalOnly => level == AlertLevel::Fatal,
            Self::Either => true,
        }
    }
}

/// Static description of a known alert code.
#[derive(Clone, Copy, Debug)]
pub struct AlertInfo {
    pub code: u8,
    pub name: &'static str,
    pub fatality: Fatality,
    /// Oldest version the code exists in.
    pub since: TlsVersion,
}

const fn info(code: u8, name: &'static str, fatality: Fatality, since: TlsVersion) -> AlertInfo {
    AlertInfo {
        code,
        name,
        fatality,
        since,
    }
}

use codes::*;
use Fatality::{Either, FatalOnly, WarningOnly};
use TlsVersion::{Ssl3, Tls10, Tls12, Tls13};

static ALERTS: &[AlertInfo] = &[
    info(CLOSE_NOTIFY, "close_notify", Either, Ssl3),
    info(UNEXPECTED_MESSAGE, "unexpected_message", FatalOnly, Ssl3),
    info(BAD_RECORD_MAC, "bad_record_mac", FatalOnly, Ssl3),
    info(DECRYPTION_FAILED, "decryption_failed", FatalOnly, Tls10),
    info(RECORD_OVERFLOW, "record_overflow", FatalOnly, Tls10),
    info(DECOMPRESSION_FAILURE, "decompression_failure", FatalOnly, Ssl3),
    info(HANDSHAKE_FAILURE, "handshake_failure", FatalOnly, Ssl3),
    info(NO_CERTIFICATE, "no_certificate", Either, Ssl3),
    info(BAD_CERTIFICATE, "bad_certificate", Either, Ssl3),
    info(UNSUPPORTED_CERTIFICATE, "unsupported_certificate", Either, Ssl3),
    info(CERTIFICATE_REVOKED, "certificate_revoked", Either, Ssl3),
    info(CERTIFICATE_EXPIRED, "certificate_expired", Either, Ssl3),
    info(CERTIFICATE_UNKNOWN, "certificate_unknown", Either, Ssl3),
    info(ILLEGAL_PARAMETER, "illegal_parameter", FatalOnly, Ssl3),
    info(UNKNOWN_CA, "unknown_ca", FatalOnly, Tls10),
    info(ACCESS_DENIED, "access_denied", FatalOnly, Tls10),
    info(DECODE_ERROR, "decode_error", FatalOnly, Tls10),
    info(DECRYPT_ERROR, "decrypt_error", Either, Tls10),
    info(EXPORT_RESTRICTION, "export_restriction", FatalOnly, Tls10),
    info(PROTOCOL_VERSION, "protocol_version", FatalOnly, Tls10),
    info(INSUFFICIENT_SECURITY, "insufficient_security", FatalOnly, Tls10),
    info(INTERNAL_ERROR, "internal_error", FatalOnly, Tls10),
    info(INAPPROPRIATE_FALLBACK, "inappropriate_fallback", FatalOnly, Tls10),
    info(USER_CANCELED, "user_canceled", Either, Tls10),
    info(NO_RENEGOTIATION, "no_renegotiation", WarningOnly, Tls10),
    info(MISSING_EXTENSION, "missing_extension", FatalOnly, Tls13),
    info(UNSUPPORTED_EXTENSION, "unsupported_extension", FatalOnly, Tls12),
    info(CERTIFICATE_UNOBTAINABLE, "certificate_unobtainable", Either, Tls12),
    info(UNRECOGNIZED_NAME, "unrecognized_name", Either, Tls12),
    info(
        BAD_CERTIFICATE_STATUS_RESPONSE,
        "bad_certificate_status_response",
        FatalOnly,
        Tls12,
    ),
    info(BAD_CERTIFICATE_HASH_VALUE, "bad_certificate_hash_value", FatalOnly, Tls12),
    info(UNKNOWN_PSK_IDENTITY, "unknown_psk_identity", FatalOnly, Tls12),
    info(CERTIFICATE_REQUIRED, "certificate_required", FatalOnly, Tls13),
    info(NO_APPLICATION_PROTOCOL, "no_application_protocol", FatalOnly, Tls13),
];

/// Look up a known code.
pub fn lookup(code: u8) -> Option<&'static AlertInfo> {
    ALERTS.iter().find(|a| a.code == code)
}

/// One alert record body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub code: u8,
}

impl Alert {
    /// Alert to send. Unknown codes and levels the code forbids are refused.
    pub fn new(level: AlertLevel, code: u8) -> Result<Self, TlsError> {
        let info = lookup(code)
            .ok_or_else(|| TlsError::Internal(format!("cannot send unknown alert {}", code)))?;
        if !info.fatality.allows(level) {
            return Err(TlsError::Internal(format!(
                "alert {} cannot be sent at level {:?}",
                info.name, level
            )));
        }
        Ok(Self { level, code })
    }

    /// Fatal alert for a code that is known to allow it.
    ///
    /// Falls back to internal_error for codes that cannot be sent fatally.
    pub fn fatal(code: u8) -> Self {
        Self::new(AlertLevel::Fatal, code).unwrap_or(Self {
            level: AlertLevel::Fatal,
            code: INTERNAL_ERROR,
        })
    }

    /// Warning-level close_notify.
    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            code: CLOSE_NOTIFY,
        }
    }

    /// Parse a received alert body. Unknown codes are accepted.
    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        if body.len() != 2 {
            return Err(TlsError::Decode(format!(
                "alert body of {} bytes",
                body.len()
            )));
        }
        let level = AlertLevel::from_wire(body[0])
            .ok_or_else(|| TlsError::Decode(format!("alert level {}", body[0])))?;
        if lookup(body[1]).is_none() {
            log::warn!("[tls] received unknown alert code {}", body[1]);
        }
        Ok(Self {
            level,
            code: body[1],
        })
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        [self.level as u8, self.code]
    }

    /// TLS 1.3 treats every alert except close_notify and user_canceled
    /// as fatal regardless of the level byte.
    pub fn is_fatal(&self, version: Option<TlsVersion>) -> bool {
        if version == Some(TlsVersion::Tls13) {
            return !matches!(self.code, CLOSE_NOTIFY | USER_CANCELED);
        }
        self.level == AlertLevel::Fatal
    }

    pub fn name(&self) -> &'static str {
        lookup(self.code).map_or("unknown", |i| i.name)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) {:?}", self.name(), self.code, self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_policy() {
        assert!(Alert::new(AlertLevel::Fatal, ILLEGAL_PARAMETER).is_ok());
        assert!(Alert::new(AlertLevel::Warning, ILLEGAL_PARAMETER).is_err());
        assert!(Alert::new(AlertLevel::Warning, NO_RENEGOTIATION).is_ok());
        assert!(Alert::new(AlertLevel::Fatal, NO_RENEGOTIATION).is_err());
        assert!(Alert::new(AlertLevel::Warning, CLOSE_NOTIFY).is_ok());
        assert!(Alert::new(AlertLevel::Fatal, 200).is_err());
    }

    #[test]
    fn test_unknown_code_received() {
        let alert = Alert::parse(&[2, 200]).unwrap();
        assert_eq!(alert.code, 200);
        assert_eq!(alert.name(), "unknown");
        assert!(Alert::parse(&[3, 0]).is_err());
        assert!(Alert::parse(&[1]).is_err());
    }

    #[test]
    fn test_table() {
        assert_eq!(lookup(CERTIFICATE_REQUIRED).unwrap().since, TlsVersion::Tls13);
        assert_eq!(lookup(BAD_CERTIFICATE).unwrap().name, "bad_certificate");
        assert!(ALERTS.len() >= 15 && ALERTS.len() <= 40);
        assert_eq!(Alert::fatal(47).to_bytes(), [2, 47]);
        assert_eq!(Alert::fatal(NO_RENEGOTIATION).code, INTERNAL_ERROR);
    }

    #[test]
    fn test_tls13_fatality() {
        let warn_bad_cert = Alert {
            level: AlertLevel::Warning,
            code: BAD_CERTIFICATE,
        };
        assert!(!warn_bad_cert.is_fatal(Some(TlsVersion::Tls12)));
        assert!(warn_bad_cert.is_fatal(Some(TlsVersion::Tls13)));
        assert!(!Alert::close_notify().is_fatal(Some(TlsVersion::Tls13)));
    }
}
