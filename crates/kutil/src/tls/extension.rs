// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hello extensions.
//!
//! Every extension is a `(u16 type, u16 length, body)` triple inside a list
//! with its own u16 length. The body shape of some extensions depends on
//! the message carrying them, hence [`ExtensionContext`].

use super::{NamedGroup, SignatureScheme, TlsError};
use crate::buffer::{BufferResult, ByteBuffer, ByteBufferExt, DataBuffer, MemoryBuffer};

/// Extension type codes.
pub mod ext_type {
    pub const SERVER_NAME: u16 = 0;
    pub const SUPPORTED_GROUPS: u16 = 10;
    pub const EC_POINT_FORMATS: u16 = 11;
    pub const SIGNATURE_ALGORITHMS: u16 = 13;
    pub const HEARTBEAT: u16 = 15;
    pub const PADDING: u16 = 21;
    pub const SUPPORTED_VERSIONS: u16 = 43;
    pub const COOKIE: u16 = 44;
    pub const KEY_SHARE: u16 = 51;
    pub const RENEGOTIATION_INFO: u16 = 0xff01;
}

/// Message an extension list belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionContext {
    ClientHello,
    ServerHello,
    HelloRetryRequest,
    EncryptedExtensions,
    Certificate,
    CertificateRequest,
}

/// One key_share entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

/// Parsed extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extension {
    /// Host name (client), or the empty acknowledgement (server).
    ServerName(Option<String>),
    SupportedGroups(Vec<NamedGroup>),
    EcPointFormats(Vec<u8>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    /// Offered versions (ClientHello).
    SupportedVersions(Vec<u16>),
    /// Chosen version (ServerHello, HelloRetryRequest).
    SelectedVersion(u16),
    /// Offered shares (ClientHello).
    KeyShares(Vec<KeyShareEntry>),
    /// Chosen share (ServerHello).
    KeyShare(KeyShareEntry),
    /// Group the server wants a share for (HelloRetryRequest).
    KeyShareRequest(NamedGroup),
    Cookie(Vec<u8>),
    RenegotiationInfo(Vec<u8>),
    /// Any other extension, body kept as received.
    Opaque { ext_type: u16, data: Vec<u8> },
}

impl Extension {
    pub fn ext_type(&self) -> u16 {
        use ext_type::*;
        match self {
            Self::ServerName(_) => SERVER_NAME,
            Self::SupportedGroups(_) => SUPPORTED_GROUPS,
            Self::EcPointFormats(_) => EC_POINT_FORMATS,
            Self::SignatureAlgorithms(_) => SIGNATURE_ALGORITHMS,
            Self::SupportedVersions(_) | Self::SelectedVersion(_) => SUPPORTED_VERSIONS,
            Self::KeyShares(_) | Self::KeyShare(_) | Self::KeyShareRequest(_) => KEY_SHARE,
            Self::Cookie(_) => COOKIE,
            Self::RenegotiationInfo(_) => RENEGOTIATION_INFO,
            Self::Opaque { ext_type, .. } => *ext_type,
        }
    }

    /// Body without the type/length header.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = MemoryBuffer::new();
        // only values too long for their length field can fail
        if let Err(e) = self.write_body(&mut buf.data()) {
            log::warn!("[tls] extension {} not encodable: {}", self.ext_type(), e);
        }
        buf.into_inner()
    }

    fn write_body(&self, w: &mut DataBuffer<'_>) -> BufferResult<()> {
        match self {
            Self::ServerName(None) => Ok(()),
            Self::ServerName(Some(host)) => {
                let name = host.as_bytes();
                w.write_u16((name.len() + 3) as u16)?;
                w.write_u8(0)?;
                w.write_vec(name, 2)
            }
            Self::SupportedGroups(groups) => {
                let ids: Vec<u8> = groups.iter().flat_map(|g| g.wire().to_be_bytes()).collect();
                w.write_vec(&ids, 2)
            }
            Self::EcPointFormats(formats) => w.write_vec(formats, 1),
            Self::SignatureAlgorithms(schemes) => {
                let ids: Vec<u8> = schemes.iter().flat_map(|s| s.wire().to_be_bytes()).collect();
                w.write_vec(&ids, 2)
            }
            Self::SupportedVersions(versions) => {
                let ids: Vec<u8> = versions.iter().flat_map(|v| v.to_be_bytes()).collect();
                w.write_vec(&ids, 1)
            }
            Self::SelectedVersion(v) => w.write_u16(*v),
            Self::KeyShares(entries) => {
                let mut inner = MemoryBuffer::new();
                for e in entries {
                    write_share(&mut inner.data(), e)?;
                }
                w.write_vec(inner.as_slice(), 2)
            }
            Self::KeyShare(entry) => write_share(w, entry),
            Self::KeyShareRequest(group) => w.write_u16(group.wire()),
            Self::Cookie(cookie) => w.write_vec(cookie, 2),
            Self::RenegotiationInfo(data) => w.write_vec(data, 1),
            Self::Opaque { data, .. } => w.write_bytes(data),
        }
    }

    /// Parse one extension body.
    pub fn parse(ext_type: u16, body: &[u8], ctx: ExtensionContext) -> Result<Self, TlsError> {
        use ext_type::*;
        use ExtensionContext as C;

        let allowed = match ext_type {
            SERVER_NAME => matches!(ctx, C::ClientHello | C::ServerHello | C::EncryptedExtensions),
            SUPPORTED_GROUPS => matches!(ctx, C::ClientHello | C::EncryptedExtensions),
            EC_POINT_FORMATS => matches!(ctx, C::ClientHello | C::ServerHello),
            SIGNATURE_ALGORITHMS => matches!(ctx, C::ClientHello | C::CertificateRequest),
            SUPPORTED_VERSIONS => {
                matches!(ctx, C::ClientHello | C::ServerHello | C::HelloRetryRequest)
            }
            KEY_SHARE => matches!(ctx, C::ClientHello | C::ServerHello | C::HelloRetryRequest),
            COOKIE => matches!(ctx, C::ClientHello | C::HelloRetryRequest),
            RENEGOTIATION_INFO => matches!(ctx, C::ClientHello | C::ServerHello),
            _ => true,
        };
        if !allowed {
            return Err(TlsError::UnsupportedExtension(ext_type));
        }

        let mut buf = MemoryBuffer::from_bytes(body);
        let mut r = buf.data();
        let ext = match (ext_type, ctx) {
            (SERVER_NAME, _) if body.is_empty() => Self::ServerName(None),
            (SERVER_NAME, _) => {
                let list = r.read_vec(2)?;
                let mut list = MemoryBuffer::from_bytes(list);
                let mut host = None;
                while list.left_length() > 0 {
                    let mut l = list.data();
                    let kind = l.read_u8()?;
                    let name = l.read_vec(2)?;
                    if kind == 0 {
                        host = Some(String::from_utf8(name).map_err(|_| {
                            TlsError::Decode("server_name is not UTF-8".into())
                        })?);
                    }
                }
                Self::ServerName(host)
            }
            (SUPPORTED_GROUPS, _) => Self::SupportedGroups(
                u16_list(&r.read_vec(2)?)?
                    .into_iter()
                    .map(NamedGroup::from_wire)
                    .collect(),
            ),
            (EC_POINT_FORMATS, _) => Self::EcPointFormats(r.read_vec(1)?),
            (SIGNATURE_ALGORITHMS, _) => Self::SignatureAlgorithms(
                u16_list(&r.read_vec(2)?)?
                    .into_iter()
                    .map(SignatureScheme::from_wire)
                    .collect(),
            ),
            (SUPPORTED_VERSIONS, C::ClientHello) => {
                Self::SupportedVersions(u16_list(&r.read_vec(1)?)?)
            }
            (SUPPORTED_VERSIONS, _) => Self::SelectedVersion(r.read_u16()?),
            (KEY_SHARE, C::ClientHello) => {
                let list = r.read_vec(2)?;
                let mut list = MemoryBuffer::from_bytes(list);
                let mut entries = Vec::new();
                while list.left_length() > 0 {
                    entries.push(read_share(&mut list)?);
                }
                Self::KeyShares(entries)
            }
            (KEY_SHARE, C::HelloRetryRequest) => {
                Self::KeyShareRequest(NamedGroup::from_wire(r.read_u16()?))
            }
            (KEY_SHARE, _) => Self::KeyShare(read_share(r.buffer())?),
            (COOKIE, _) => {
                let cookie = r.read_vec(2)?;
                if cookie.is_empty() {
                    return Err(TlsError::Decode("empty cookie".into()));
                }
                Self::Cookie(cookie)
            }
            (RENEGOTIATION_INFO, _) => Self::RenegotiationInfo(r.read_vec(1)?),
            _ => {
                return Ok(Self::Opaque {
                    ext_type,
                    data: body.to_vec(),
                })
            }
        };
        if buf.left_length() != 0 {
            return Err(TlsError::Decode(format!(
                "{} trailing bytes in extension {}",
                buf.left_length(),
                ext_type
            )));
        }
        Ok(ext)
    }
}

fn write_share(w: &mut DataBuffer<'_>, entry: &KeyShareEntry) -> BufferResult<()> {
    w.write_u16(entry.group.wire())?;
    w.write_vec(&entry.key_exchange, 2)
}

fn read_share(buf: &mut dyn ByteBuffer) -> Result<KeyShareEntry, TlsError> {
    let mut r = DataBuffer::new(buf);
    let group = NamedGroup::from_wire(r.read_u16()?);
    let key_exchange = r.read_vec(2)?;
    if key_exchange.is_empty() {
        return Err(TlsError::Decode("empty key share".into()));
    }
    Ok(KeyShareEntry {
        group,
        key_exchange,
    })
}

fn u16_list(bytes: &[u8]) -> Result<Vec<u16>, TlsError> {
    if bytes.len() % 2 != 0 {
        return Err(TlsError::Decode("odd length u16 list".into()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// Encode a full extension list with its u16 length.
pub fn encode_extensions(exts: &[Extension], out: &mut MemoryBuffer) {
    let mut inner = MemoryBuffer::new();
    for ext in exts {
        let body = ext.encode_body();
        inner.extend(&ext.ext_type().to_be_bytes());
        inner.extend(&(body.len() as u16).to_be_bytes());
        inner.extend(&body);
    }
    out.extend(&(inner.full_length() as u16).to_be_bytes());
    out.extend(inner.as_slice());
}

/// Parse an extension list (with its u16 length) from `buf`.
///
/// Duplicate extension types are illegal.
pub fn parse_extensions(
    buf: &mut dyn ByteBuffer,
    ctx: ExtensionContext,
) -> Result<Vec<Extension>, TlsError> {
    let list = DataBuffer::new(buf).read_vec(2)?;
    let mut list = MemoryBuffer::from_bytes(list);
    let mut exts: Vec<Extension> = Vec::new();
    while list.left_length() > 0 {
        let mut r = list.data();
        let ty = r.read_u16()?;
        let body = r.read_vec(2)?;
        if exts.iter().any(|e| e.ext_type() == ty) {
            return Err(TlsError::IllegalParameter(format!(
                "duplicate extension {}",
                ty
            )));
        }
        exts.push(Extension::parse(ty, &body, ctx)?);
    }
    Ok(exts)
}

/// Find an extension by type.
pub fn find(exts: &[Extension], ty: u16) -> Option<&Extension> {
    exts.iter().find(|e| e.ext_type() == ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(exts: &[Extension], ctx: ExtensionContext) -> Vec<Extension> {
        let mut out = MemoryBuffer::new();
        encode_extensions(exts, &mut out);
        parse_extensions(&mut out, ctx).unwrap()
    }

    #[test]
    fn test_client_hello_extensions() {
        let exts = vec![
            Extension::ServerName(Some("example.com".into())),
            Extension::SupportedGroups(vec![NamedGroup::X25519, NamedGroup::Ffdhe2048]),
            Extension::SupportedVersions(vec![0x0304, 0x0303]),
            Extension::KeyShares(vec![KeyShareEntry {
                group: NamedGroup::X25519,
                key_exchange: vec![7; 32],
            }]),
            Extension::Opaque {
                ext_type: ext_type::HEARTBEAT,
                data: vec![1],
            },
        ];
        assert_eq!(reparse(&exts, ExtensionContext::ClientHello), exts);
    }

    #[test]
    fn test_server_name_wire_form() {
        let body = Extension::ServerName(Some("ab".into())).encode_body();
        assert_eq!(body, vec![0, 5, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_context_shapes() {
        let sh = Extension::parse(ext_type::SUPPORTED_VERSIONS, &[3, 4], ExtensionContext::ServerHello)
            .unwrap();
        assert_eq!(sh, Extension::SelectedVersion(0x0304));
        let hrr = Extension::parse(ext_type::KEY_SHARE, &[0, 23], ExtensionContext::HelloRetryRequest)
            .unwrap();
        assert_eq!(hrr, Extension::KeyShareRequest(NamedGroup::Secp256r1));
    }

    #[test]
    fn test_extension_in_wrong_message() {
        let err = Extension::parse(ext_type::COOKIE, &[0, 1, 9], ExtensionContext::ServerHello)
            .unwrap_err();
        assert_eq!(err.alert_code(), Some(110));
    }

    #[test]
    fn test_duplicates_and_trailing_bytes() {
        let mut out = MemoryBuffer::new();
        encode_extensions(
            &[Extension::Cookie(vec![1]), Extension::Cookie(vec![2])],
            &mut out,
        );
        let err = parse_extensions(&mut out, ExtensionContext::HelloRetryRequest).unwrap_err();
        assert_eq!(err.alert_code(), Some(47));

        let err = Extension::parse(ext_type::SUPPORTED_VERSIONS, &[3, 4, 0], ExtensionContext::ServerHello)
            .unwrap_err();
        assert_eq!(err.alert_code(), Some(50));
    }
}
