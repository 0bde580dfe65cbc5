// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Certificate chain and handshake signature verification.
//!
//! Chains are checked by `webpki` against a [`RootStore`]. The default
//! store is built once per process from the `webpki-roots` bundle.

use super::TlsError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use x509_parser::prelude::*;

// ============================================================================
// Signature schemes
// ============================================================================

/// signature_algorithms code point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    RsaPssSha256,
    RsaPssSha384,
    RsaPssSha512,
    Ed25519,
    RsaPkcs1Sha1,
    EcdsaSha1,
    Unknown(u16),
}

impl SignatureScheme {
    /// Schemes offered by default, strongest first within each family.
    pub const DEFAULT: [SignatureScheme; 9] = [
        SignatureScheme::EcdsaP256Sha256,
        SignatureScheme::EcdsaP384Sha384,
        SignatureScheme::Ed25519,
        SignatureScheme::RsaPssSha256,
        SignatureScheme::RsaPssSha384,
        SignatureScheme::RsaPssSha512,
        SignatureScheme::RsaPkcs1Sha256,
        SignatureScheme::RsaPkcs1Sha384,
        SignatureScheme::RsaPkcs1Sha512,
    ];

    pub fn from_wire(id: u16) -> Self {
        match id {
            0x0401 => Self::RsaPkcs1Sha256,
            0x0501 => Self::RsaPkcs1Sha384,
            0x0601 => Self::RsaPkcs1Sha512,
            0x0403 => Self::EcdsaP256Sha256,
            0x0503 => Self::EcdsaP384Sha384,
            0x0804 => Self::RsaPssSha256,
            0x0805 => Self::RsaPssSha384,
            0x0806 => Self::RsaPssSha512,
            0x0807 => Self::Ed25519,
            0x0201 => Self::RsaPkcs1Sha1,
            0x0203 => Self::EcdsaSha1,
            other => Self::Unknown(other),
        }
    }

    pub fn wire(self) -> u16 {
        match self {
            Self::RsaPkcs1Sha256 => 0x0401,
            Self::RsaPkcs1Sha384 => 0x0501,
            Self::RsaPkcs1Sha512 => 0x0601,
            Self::EcdsaP256Sha256 => 0x0403,
            Self::EcdsaP384Sha384 => 0x0503,
            Self::RsaPssSha256 => 0x0804,
            Self::RsaPssSha384 => 0x0805,
            Self::RsaPssSha512 => 0x0806,
            Self::Ed25519 => 0x0807,
            Self::RsaPkcs1Sha1 => 0x0201,
            Self::EcdsaSha1 => 0x0203,
            Self::Unknown(id) => id,
        }
    }

    /// TLS 1.3 forbids PKCS#1 v1.5 and SHA-1 in CertificateVerify.
    pub fn allowed_in_tls13(self) -> bool {
        matches!(
            self,
            Self::EcdsaP256Sha256
                | Self::EcdsaP384Sha384
                | Self::RsaPssSha256
                | Self::RsaPssSha384
                | Self::RsaPssSha512
                | Self::Ed25519
        )
    }

    /// webpki algorithms implementing this scheme. ECDSA code points from
    /// TLS 1.2 do not bind the curve, so every curve is tried.
    fn algorithms(self) -> &'static [&'static webpki::SignatureAlgorithm] {
        match self {
            Self::RsaPkcs1Sha256 => RSA_PKCS1_SHA256,
            Self::RsaPkcs1Sha384 => RSA_PKCS1_SHA384,
            Self::RsaPkcs1Sha512 => RSA_PKCS1_SHA512,
            Self::EcdsaP256Sha256 => ECDSA_SHA256,
            Self::EcdsaP384Sha384 => ECDSA_SHA384,
            Self::RsaPssSha256 => RSA_PSS_SHA256,
            Self::RsaPssSha384 => RSA_PSS_SHA384,
            Self::RsaPssSha512 => RSA_PSS_SHA512,
            Self::Ed25519 => ED25519,
            Self::RsaPkcs1Sha1 | Self::EcdsaSha1 | Self::Unknown(_) => &[],
        }
    }
}

type Algorithms = &'static [&'static webpki::SignatureAlgorithm];

static RSA_PKCS1_SHA256: Algorithms = &[&webpki::RSA_PKCS1_2048_8192_SHA256];
static RSA_PKCS1_SHA384: Algorithms = &[&webpki::RSA_PKCS1_2048_8192_SHA384];
static RSA_PKCS1_SHA512: Algorithms = &[&webpki::RSA_PKCS1_2048_8192_SHA512];
static ECDSA_SHA256: Algorithms = &[&webpki::ECDSA_P256_SHA256, &webpki::ECDSA_P384_SHA256];
static ECDSA_SHA384: Algorithms = &[&webpki::ECDSA_P384_SHA384, &webpki::ECDSA_P256_SHA384];
static RSA_PSS_SHA256: Algorithms = &[&webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY];
static RSA_PSS_SHA384: Algorithms = &[&webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY];
static RSA_PSS_SHA512: Algorithms = &[&webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY];
static ED25519: Algorithms = &[&webpki::ED25519];

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:04x})", self, self.wire())
    }
}

/// Algorithms accepted on certificates in a chain.
static CHAIN_ALGORITHMS: &[&webpki::SignatureAlgorithm] = &[
    &webpki::ECDSA_P256_SHA256,
    &webpki::ECDSA_P256_SHA384,
    &webpki::ECDSA_P384_SHA256,
    &webpki::ECDSA_P384_SHA384,
    &webpki::ED25519,
    &webpki::RSA_PKCS1_2048_8192_SHA256,
    &webpki::RSA_PKCS1_2048_8192_SHA384,
    &webpki::RSA_PKCS1_2048_8192_SHA512,
    &webpki::RSA_PKCS1_3072_8192_SHA384,
    &webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY,
    &webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY,
    &webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY,
];

// ============================================================================
// Root store
// ============================================================================

#[derive(Clone, Debug)]
struct OwnedAnchor {
    subject: Vec<u8>,
    spki: Vec<u8>,
    name_constraints: Option<Vec<u8>>,
}

/// Set of trust anchors.
#[derive(Clone, Debug, Default)]
pub struct RootStore {
    anchors: Vec<OwnedAnchor>,
}

static BUNDLED: OnceLock<Arc<RootStore>> = OnceLock::new();

impl RootStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Process-wide store built from the bundled Mozilla roots.
    pub fn bundled() -> Arc<RootStore> {
        BUNDLED
            .get_or_init(|| {
                let anchors: Vec<OwnedAnchor> = webpki_roots::TLS_SERVER_ROOTS
                    .iter()
                    .map(|ta| OwnedAnchor {
                        subject: ta.subject.as_ref().to_vec(),
                        spki: ta.subject_public_key_info.as_ref().to_vec(),
                        name_constraints: ta.name_constraints.as_ref().map(|n| n.as_ref().to_vec()),
                    })
                    .collect();
                log::debug!("[tls] loaded {} bundled trust anchors", anchors.len());
                Arc::new(RootStore { anchors })
            })
            .clone()
    }

    /// Store holding every certificate of a PEM bundle.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self, TlsError> {
        let blocks = ::pem::parse_many(pem_data)
            .map_err(|e| TlsError::Internal(format!("root store PEM: {}", e)))?;
        let mut store = Self::empty();
        for block in blocks.iter().filter(|b| b.tag() == "CERTIFICATE") {
            store.add_der(block.contents())?;
        }
        if store.is_empty() {
            return Err(TlsError::Internal("root store PEM holds no certificate".into()));
        }
        Ok(store)
    }

    /// Add one DER certificate as trust anchor.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), TlsError> {
        let ta = webpki::TrustAnchor::try_from_cert_der(der)
            .map_err(|e| TlsError::Internal(format!("trust anchor: {:?}", e)))?;
        self.anchors.push(OwnedAnchor {
            subject: ta.subject.to_vec(),
            spki: ta.spki.to_vec(),
            name_constraints: ta.name_constraints.map(<[u8]>::to_vec),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    fn trust_anchors(&self) -> Vec<webpki::TrustAnchor<'_>> {
        self.anchors
            .iter()
            .map(|a| webpki::TrustAnchor {
                subject: &a.subject,
                spki: &a.spki,
                name_constraints: a.name_constraints.as_deref(),
            })
            .collect()
    }
}

// ============================================================================
// Verification
// ============================================================================

fn bad_cert(what: &str, e: webpki::Error) -> TlsError {
    TlsError::BadCertificate(format!("{}: {:?}", what, e))
}

/// Verify `chain` (leaf first, as received) for `server_name`.
pub fn verify_chain(
    roots: &RootStore,
    chain: &[Vec<u8>],
    server_name: &str,
    now: SystemTime,
) -> Result<(), TlsError> {
    let leaf = chain
        .first()
        .ok_or_else(|| TlsError::BadCertificate("empty certificate chain".into()))?;
    let cert = webpki::EndEntityCert::try_from(leaf.as_slice())
        .map_err(|e| bad_cert("leaf certificate", e))?;
    let intermediates: Vec<&[u8]> = chain[1..].iter().map(Vec::as_slice).collect();
    let anchors = roots.trust_anchors();
    let time = webpki::Time::try_from(now)
        .map_err(|_| TlsError::Internal("system clock before 1970".into()))?;

    cert.verify_is_valid_tls_server_cert(
        CHAIN_ALGORITHMS,
        &webpki::TlsServerTrustAnchors(&anchors),
        &intermediates,
        time,
    )
    .map_err(|e| bad_cert("chain", e))?;

    let name = webpki::DnsNameRef::try_from_ascii_str(server_name)
        .map_err(|_| TlsError::Internal(format!("'{}' is not a DNS name", server_name)))?;
    cert.verify_is_valid_for_dns_name(name)
        .map_err(|e| bad_cert(server_name, e))?;

    log::debug!("[tls] verified chain for {}: {}", server_name, describe(leaf));
    Ok(())
}

/// Check a handshake signature made with the leaf certificate's key.
pub fn verify_signature(
    leaf: &[u8],
    scheme: SignatureScheme,
    message: &[u8],
    signature: &[u8],
) -> Result<(), TlsError> {
    let algorithms = scheme.algorithms();
    if algorithms.is_empty() {
        return Err(TlsError::IllegalParameter(format!(
            "signature scheme {} not supported",
            scheme
        )));
    }
    let cert = webpki::EndEntityCert::try_from(leaf)
        .map_err(|e| bad_cert("leaf certificate", e))?;
    for alg in algorithms {
        if cert.verify_signature(alg, message, signature).is_ok() {
            return Ok(());
        }
    }
    Err(TlsError::DecryptError(format!(
        "{} signature does not verify",
        scheme
    )))
}

/// One-line summary of a certificate for logs.
pub fn describe(der: &[u8]) -> String {
    match X509Certificate::from_der(der) {
        Ok((_, cert)) => format!(
            "subject='{}' issuer='{}' not_after={}",
            cert.subject(),
            cert.issuer(),
            cert.validity().not_after
        ),
        Err(e) => format!("<unparseable certificate: {}>", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_wire_ids() {
        for s in SignatureScheme::DEFAULT {
            assert_eq!(SignatureScheme::from_wire(s.wire()), s);
            assert!(!s.algorithms().is_empty());
        }
        assert_eq!(SignatureScheme::from_wire(0x0201), SignatureScheme::RsaPkcs1Sha1);
        assert!(!SignatureScheme::RsaPkcs1Sha256.allowed_in_tls13());
        assert!(SignatureScheme::RsaPssSha256.allowed_in_tls13());
    }

    #[test]
    fn test_bundled_roots_loaded_once() {
        let a = RootStore::bundled();
        let b = RootStore::bundled();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.len() > 50);
    }

    #[test]
    fn test_empty_chain_is_bad_certificate() {
        let err = verify_chain(&RootStore::empty(), &[], "example.com", SystemTime::now())
            .unwrap_err();
        assert_eq!(err.alert_code(), Some(42));
    }

    #[test]
    fn test_garbage_leaf() {
        let err = verify_chain(
            &RootStore::bundled(),
            &[vec![0x30, 0x03, 0x02, 0x01, 0x00]],
            "example.com",
            SystemTime::now(),
        )
        .unwrap_err();
        assert_eq!(err.alert_code(), Some(42));
        assert!(describe(&[1, 2, 3]).starts_with("<unparseable"));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = verify_signature(&[], SignatureScheme::RsaPkcs1Sha1, b"m", b"s").unwrap_err();
        assert_eq!(err.alert_code(), Some(47));
    }

    #[test]
    fn test_pem_without_certificate() {
        assert!(RootStore::from_pem(b"not pem").is_err());
    }
}
