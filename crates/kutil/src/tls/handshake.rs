// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handshake message codecs.
//!
//! Messages travel as [`RawHandshake`] (type + body) through the record
//! layer and are decoded here once the negotiated version and key
//! exchange are known.

use super::extension::{self, encode_extensions, parse_extensions, Extension, ExtensionContext};
use super::record::RawHandshake;
use super::{KeyExchange, NamedGroup, SignatureScheme, TlsError, TlsVersion};
use crate::buffer::{ByteBuffer, ByteBufferExt, MemoryBuffer};

/// Handshake type bytes.
pub mod msg_type {
    pub const HELLO_REQUEST: u8 = 0;
    pub const CLIENT_HELLO: u8 = 1;
    pub const SERVER_HELLO: u8 = 2;
    pub const NEW_SESSION_TICKET: u8 = 4;
    pub const END_OF_EARLY_DATA: u8 = 5;
    pub const ENCRYPTED_EXTENSIONS: u8 = 8;
    pub const CERTIFICATE: u8 = 11;
    pub const SERVER_KEY_EXCHANGE: u8 = 12;
    pub const CERTIFICATE_REQUEST: u8 = 13;
    pub const SERVER_HELLO_DONE: u8 = 14;
    pub const CERTIFICATE_VERIFY: u8 = 15;
    pub const CLIENT_KEY_EXCHANGE: u8 = 16;
    pub const FINISHED: u8 = 20;
    pub const KEY_UPDATE: u8 = 24;
    pub const MESSAGE_HASH: u8 = 254;
}

/// ServerHello.random value that marks a HelloRetryRequest.
pub const HELLO_RETRY_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// Last 8 bytes of ServerHello.random when a 1.3-capable server
/// negotiates TLS 1.2.
pub const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x01";

/// Same marker for TLS 1.1 and below.
pub const DOWNGRADE_TLS11: [u8; 8] = *b"DOWNGRD\x00";

fn finish(buf: &MemoryBuffer, what: &str) -> Result<(), TlsError> {
    if buf.left_length() != 0 {
        return Err(TlsError::Decode(format!(
            "{} trailing bytes after {}",
            buf.left_length(),
            what
        )));
    }
    Ok(())
}

fn read_random(buf: &mut MemoryBuffer) -> Result<[u8; 32], TlsError> {
    let bytes = buf.read(32)?;
    let mut random = [0u8; 32];
    random.copy_from_slice(&bytes);
    Ok(random)
}

// ============================================================================
// Hellos
// ============================================================================

/// ClientHello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn encode(&self) -> RawHandshake {
        let mut buf = MemoryBuffer::new();
        buf.extend(&self.legacy_version.to_be_bytes());
        buf.extend(&self.random);
        buf.extend(&[self.session_id.len() as u8]);
        buf.extend(&self.session_id);
        buf.extend(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for id in &self.cipher_suites {
            buf.extend(&id.to_be_bytes());
        }
        buf.extend(&[self.compression_methods.len() as u8]);
        buf.extend(&self.compression_methods);
        encode_extensions(&self.extensions, &mut buf);
        RawHandshake {
            msg_type: msg_type::CLIENT_HELLO,
            body: buf.into_inner(),
        }
    }

    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let legacy_version = buf.data().read_u16()?;
        let random = read_random(&mut buf)?;
        let mut r = buf.data();
        let session_id = r.read_vec(1)?;
        let suites = r.read_vec(2)?;
        let compression_methods = r.read_vec(1)?;
        let extensions = if buf.left_length() > 0 {
            parse_extensions(&mut buf, ExtensionContext::ClientHello)?
        } else {
            Vec::new()
        };
        finish(&buf, "ClientHello")?;
        Ok(Self {
            legacy_version,
            random,
            session_id,
            cipher_suites: suites
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
            compression_methods,
            extensions,
        })
    }
}

/// ServerHello, or HelloRetryRequest when `random` is the magic value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let legacy_version = buf.data().read_u16()?;
        let random = read_random(&mut buf)?;
        let mut r = buf.data();
        let session_id = r.read_vec(1)?;
        if session_id.len() > 32 {
            return Err(TlsError::Decode("session id longer than 32 bytes".into()));
        }
        let cipher_suite = r.read_u16()?;
        let compression_method = r.read_u8()?;
        let ctx = if random == HELLO_RETRY_RANDOM {
            ExtensionContext::HelloRetryRequest
        } else {
            ExtensionContext::ServerHello
        };
        // TLS 1.2 servers may omit the extension block entirely
        let extensions = if buf.left_length() > 0 {
            parse_extensions(&mut buf, ctx)?
        } else {
            Vec::new()
        };
        finish(&buf, "ServerHello")?;
        Ok(Self {
            legacy_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    pub fn encode(&self) -> RawHandshake {
        let mut buf = MemoryBuffer::new();
        buf.extend(&self.legacy_version.to_be_bytes());
        buf.extend(&self.random);
        buf.extend(&[self.session_id.len() as u8]);
        buf.extend(&self.session_id);
        buf.extend(&self.cipher_suite.to_be_bytes());
        buf.extend(&[self.compression_method]);
        if !self.extensions.is_empty() {
            encode_extensions(&self.extensions, &mut buf);
        }
        RawHandshake {
            msg_type: msg_type::SERVER_HELLO,
            body: buf.into_inner(),
        }
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_RANDOM
    }

    /// Version from supported_versions, else the legacy field.
    pub fn selected_version(&self) -> u16 {
        match extension::find(&self.extensions, extension::ext_type::SUPPORTED_VERSIONS) {
            Some(Extension::SelectedVersion(v)) => *v,
            _ => self.legacy_version,
        }
    }

    /// Highest version the downgrade marker says the server supports.
    pub fn downgrade_marker(&self) -> Option<TlsVersion> {
        let tail = &self.random[24..];
        if tail == DOWNGRADE_TLS12 {
            Some(TlsVersion::Tls13)
        } else if tail == DOWNGRADE_TLS11 {
            Some(TlsVersion::Tls12)
        } else {
            None
        }
    }
}

/// EncryptedExtensions (TLS 1.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

impl EncryptedExtensions {
    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let extensions = parse_extensions(&mut buf, ExtensionContext::EncryptedExtensions)?;
        finish(&buf, "EncryptedExtensions")?;
        Ok(Self { extensions })
    }
}

// ============================================================================
// Certificates
// ============================================================================

/// Certificate type negotiated for the chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CertificateType {
    #[default]
    X509 = 0,
    RawPublicKey = 2,
}

/// One certificate (or raw public key) with its TLS 1.3 extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateEntry {
    pub data: Vec<u8>,
    pub extensions: Vec<Extension>,
}

/// Certificate message, leaf first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    /// Request context (TLS 1.3, empty for server certificates)
    pub context: Vec<u8>,
    pub cert_type: CertificateType,
    pub entries: Vec<CertificateEntry>,
}

impl Certificate {
    /// Empty certificate list, sent when no client certificate is available.
    pub fn empty(context: Vec<u8>) -> Self {
        Self {
            context,
            cert_type: CertificateType::X509,
            entries: Vec::new(),
        }
    }

    pub fn parse(
        body: &[u8],
        version: TlsVersion,
        cert_type: CertificateType,
    ) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let tls13 = version == TlsVersion::Tls13;
        let context = if tls13 {
            buf.data().read_vec(1)?
        } else {
            Vec::new()
        };
        let list = buf.data().read_vec(3)?;
        finish(&buf, "Certificate")?;

        let mut list = MemoryBuffer::from_bytes(list);
        let mut entries = Vec::new();
        while list.left_length() > 0 {
            let data = list.data().read_vec(3)?;
            if data.is_empty() {
                return Err(TlsError::Decode("empty certificate entry".into()));
            }
            let extensions = if tls13 {
                parse_extensions(&mut list, ExtensionContext::Certificate)?
            } else {
                Vec::new()
            };
            entries.push(CertificateEntry { data, extensions });
        }
        Ok(Self {
            context,
            cert_type,
            entries,
        })
    }

    pub fn encode(&self, version: TlsVersion) -> RawHandshake {
        let tls13 = version == TlsVersion::Tls13;
        let mut list = MemoryBuffer::new();
        for entry in &self.entries {
            list.extend(&(entry.data.len() as u32).to_be_bytes()[1..]);
            list.extend(&entry.data);
            if tls13 {
                encode_extensions(&entry.extensions, &mut list);
            }
        }
        let mut buf = MemoryBuffer::new();
        if tls13 {
            buf.extend(&[self.context.len() as u8]);
            buf.extend(&self.context);
        }
        buf.extend(&(list.full_length() as u32).to_be_bytes()[1..]);
        buf.extend(list.as_slice());
        RawHandshake {
            msg_type: msg_type::CERTIFICATE,
            body: buf.into_inner(),
        }
    }

    /// DER blobs, leaf first.
    pub fn chain(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|e| e.data.clone()).collect()
    }
}

/// CertificateRequest in either version's shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequest {
    pub context: Vec<u8>,
    /// ClientCertificateType list (TLS 1.2)
    pub certificate_types: Vec<u8>,
    pub schemes: Vec<SignatureScheme>,
    /// Distinguished names (TLS 1.2) kept raw
    pub authorities: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl CertificateRequest {
    pub fn parse(body: &[u8], version: TlsVersion) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let req = if version == TlsVersion::Tls13 {
            let context = buf.data().read_vec(1)?;
            let extensions = parse_extensions(&mut buf, ExtensionContext::CertificateRequest)?;
            let schemes = match extension::find(&extensions, extension::ext_type::SIGNATURE_ALGORITHMS) {
                Some(Extension::SignatureAlgorithms(s)) => s.clone(),
                _ => {
                    return Err(TlsError::Decode(
                        "CertificateRequest without signature_algorithms".into(),
                    ))
                }
            };
            Self {
                context,
                certificate_types: Vec::new(),
                schemes,
                authorities: Vec::new(),
                extensions,
            }
        } else {
            let mut r = buf.data();
            let certificate_types = r.read_vec(1)?;
            let schemes = if version >= TlsVersion::Tls12 {
                r.read_vec(2)?
                    .chunks_exact(2)
                    .map(|c| SignatureScheme::from_wire(u16::from_be_bytes([c[0], c[1]])))
                    .collect()
            } else {
                Vec::new()
            };
            let authorities = r.read_vec(2)?;
            Self {
                context: Vec::new(),
                certificate_types,
                schemes,
                authorities,
                extensions: Vec::new(),
            }
        };
        finish(&buf, "CertificateRequest")?;
        Ok(req)
    }
}

// ============================================================================
// Key exchange
// ============================================================================

/// Server ephemeral parameters (TLS 1.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerKeyExchangeParams {
    Ecdhe { group: NamedGroup, public: Vec<u8> },
    Dhe { p: Vec<u8>, g: Vec<u8>, ys: Vec<u8> },
}

/// ServerKeyExchange (TLS 1.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub params: ServerKeyExchangeParams,
    /// Encoded params, the signed portion
    pub raw_params: Vec<u8>,
    pub scheme: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

/// ECParameters.curve_type for named curves.
const NAMED_CURVE: u8 = 3;

impl ServerKeyExchange {
    pub fn parse(body: &[u8], kx: KeyExchange, version: TlsVersion) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let params = {
            let mut r = buf.data();
            match kx {
                KeyExchange::Ecdhe | KeyExchange::EcdhAnon => {
                    let curve_type = r.read_u8()?;
                    if curve_type != NAMED_CURVE {
                        return Err(TlsError::IllegalParameter(format!(
                            "curve type {}",
                            curve_type
                        )));
                    }
                    let group = NamedGroup::from_wire(r.read_u16()?);
                    let public = r.read_vec(1)?;
                    ServerKeyExchangeParams::Ecdhe { group, public }
                }
                KeyExchange::Dhe | KeyExchange::DhAnon => ServerKeyExchangeParams::Dhe {
                    p: r.read_vec(2)?,
                    g: r.read_vec(2)?,
                    ys: r.read_vec(2)?,
                },
                other => {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "ServerKeyExchange with {:?} key exchange",
                        other
                    )))
                }
            }
        };
        let raw_params = body[..buf.pointer()].to_vec();

        let anonymous = matches!(kx, KeyExchange::DhAnon | KeyExchange::EcdhAnon);
        let (scheme, signature) = if anonymous {
            (None, Vec::new())
        } else {
            let mut r = buf.data();
            let scheme = if version >= TlsVersion::Tls12 {
                Some(SignatureScheme::from_wire(r.read_u16()?))
            } else {
                None
            };
            (scheme, r.read_vec(2)?)
        };
        finish(&buf, "ServerKeyExchange")?;
        Ok(Self {
            params,
            raw_params,
            scheme,
            signature,
        })
    }

    /// Bytes covered by the signature.
    pub fn signed_message(&self, client_random: &[u8; 32], server_random: &[u8; 32]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(64 + self.raw_params.len());
        msg.extend_from_slice(client_random);
        msg.extend_from_slice(server_random);
        msg.extend_from_slice(&self.raw_params);
        msg
    }
}

/// ClientKeyExchange; exactly one variant per key exchange family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientKeyExchange {
    /// SRP client public value A
    Srp(Vec<u8>),
    /// RSA-encrypted premaster secret
    Rsa(Vec<u8>),
    /// DH public value Yc
    Dh(Vec<u8>),
    /// EC point
    Ecdh(Vec<u8>),
}

impl ClientKeyExchange {
    pub fn encode(&self, version: TlsVersion) -> RawHandshake {
        let mut buf = MemoryBuffer::new();
        let (value, len_width) = match self {
            Self::Srp(v) | Self::Dh(v) => (v, 2),
            // SSL 3.0 and TLS 1.0 send the bare ciphertext
            Self::Rsa(v) if version <= TlsVersion::Tls10 => (v, 0),
            Self::Rsa(v) => (v, 2),
            Self::Ecdh(v) => (v, 1),
        };
        if len_width == 2 {
            buf.extend(&(value.len() as u16).to_be_bytes());
        } else if len_width == 1 {
            buf.extend(&[value.len() as u8]);
        }
        buf.extend(value);
        RawHandshake {
            msg_type: msg_type::CLIENT_KEY_EXCHANGE,
            body: buf.into_inner(),
        }
    }

    pub fn parse(body: &[u8], kx: KeyExchange, version: TlsVersion) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let mut r = buf.data();
        let msg = match kx {
            KeyExchange::Srp => Self::Srp(r.read_vec(2)?),
            KeyExchange::Rsa if version <= TlsVersion::Tls10 => Self::Rsa(r.buffer().read_rest()?),
            KeyExchange::Rsa => Self::Rsa(r.read_vec(2)?),
            KeyExchange::Dhe | KeyExchange::DhAnon => Self::Dh(r.read_vec(2)?),
            KeyExchange::Ecdhe | KeyExchange::EcdhAnon => Self::Ecdh(r.read_vec(1)?),
            KeyExchange::Tls13 => {
                return Err(TlsError::UnexpectedMessage(
                    "ClientKeyExchange in TLS 1.3".into(),
                ))
            }
        };
        finish(&buf, "ClientKeyExchange")?;
        Ok(msg)
    }
}

// ============================================================================
// Authentication and finish
// ============================================================================

/// CertificateVerify (TLS 1.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateVerify {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        let mut buf = MemoryBuffer::from_bytes(body);
        let mut r = buf.data();
        let scheme = SignatureScheme::from_wire(r.read_u16()?);
        let signature = r.read_vec(2)?;
        finish(&buf, "CertificateVerify")?;
        Ok(Self { scheme, signature })
    }

    /// Content the server signs: 64 spaces, context string, zero byte,
    /// transcript hash.
    pub fn server_signed_content(transcript_hash: &[u8]) -> Vec<u8> {
        let mut content = vec![0x20u8; 64];
        content.extend_from_slice(b"TLS 1.3, server CertificateVerify");
        content.push(0);
        content.extend_from_slice(transcript_hash);
        content
    }
}

/// Finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn encode(&self) -> RawHandshake {
        RawHandshake {
            msg_type: msg_type::FINISHED,
            body: self.verify_data.clone(),
        }
    }
}

/// KeyUpdate request flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyUpdate {
    NotRequested = 0,
    Requested = 1,
}

impl KeyUpdate {
    pub fn parse(body: &[u8]) -> Result<Self, TlsError> {
        match body {
            [0] => Ok(Self::NotRequested),
            [1] => Ok(Self::Requested),
            _ => Err(TlsError::IllegalParameter("KeyUpdate value".into())),
        }
    }

    pub fn encode(self) -> RawHandshake {
        RawHandshake {
            msg_type: msg_type::KEY_UPDATE,
            body: vec![self as u8],
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Decoded handshake message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeMessage {
    HelloRequest,
    ServerHello(ServerHello),
    EncryptedExtensions(EncryptedExtensions),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    Finished(Finished),
    NewSessionTicket,
    KeyUpdate(KeyUpdate),
}

/// What the decoder needs to know about the session so far.
#[derive(Clone, Copy, Debug)]
pub struct DecodeContext {
    pub version: TlsVersion,
    pub kx: Option<KeyExchange>,
    pub cert_type: CertificateType,
}

impl HandshakeMessage {
    /// Decode a message a server may send to a client.
    pub fn parse(raw: &RawHandshake, ctx: &DecodeContext) -> Result<Self, TlsError> {
        use msg_type::*;
        let body = raw.body.as_slice();
        let empty = |name: &str| {
            if body.is_empty() {
                Ok(())
            } else {
                Err(TlsError::Decode(format!("{} with a body", name)))
            }
        };
        Ok(match raw.msg_type {
            HELLO_REQUEST => {
                empty("HelloRequest")?;
                Self::HelloRequest
            }
            SERVER_HELLO => Self::ServerHello(ServerHello::parse(body)?),
            ENCRYPTED_EXTENSIONS => Self::EncryptedExtensions(EncryptedExtensions::parse(body)?),
            CERTIFICATE => {
                Self::Certificate(Certificate::parse(body, ctx.version, ctx.cert_type)?)
            }
            SERVER_KEY_EXCHANGE => {
                let kx = ctx.kx.ok_or_else(|| {
                    TlsError::UnexpectedMessage("ServerKeyExchange before ServerHello".into())
                })?;
                Self::ServerKeyExchange(ServerKeyExchange::parse(body, kx, ctx.version)?)
            }
            CERTIFICATE_REQUEST => {
                Self::CertificateRequest(CertificateRequest::parse(body, ctx.version)?)
            }
            SERVER_HELLO_DONE => {
                empty("ServerHelloDone")?;
                Self::ServerHelloDone
            }
            CERTIFICATE_VERIFY => Self::CertificateVerify(CertificateVerify::parse(body)?),
            FINISHED => Self::Finished(Finished {
                verify_data: body.to_vec(),
            }),
            NEW_SESSION_TICKET => Self::NewSessionTicket,
            KEY_UPDATE => Self::KeyUpdate(KeyUpdate::parse(body)?),
            other => {
                return Err(TlsError::UnexpectedMessage(format!(
                    "handshake type {} from server",
                    other
                )))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HelloRequest => "HelloRequest",
            Self::ServerHello(sh) if sh.is_hello_retry_request() => "HelloRetryRequest",
            Self::ServerHello(_) => "ServerHello",
            Self::EncryptedExtensions(_) => "EncryptedExtensions",
            Self::Certificate(_) => "Certificate",
            Self::ServerKeyExchange(_) => "ServerKeyExchange",
            Self::CertificateRequest(_) => "CertificateRequest",
            Self::ServerHelloDone => "ServerHelloDone",
            Self::CertificateVerify(_) => "CertificateVerify",
            Self::Finished(_) => "Finished",
            Self::NewSessionTicket => "NewSessionTicket",
            Self::KeyUpdate(_) => "KeyUpdate",
        }
    }
}
