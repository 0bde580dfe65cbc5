// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cipher suite table.
//!
//! Suites marked `implemented` have record protection and a key exchange
//! in this crate and may be offered. The others are known so that a
//! server's choice can be classified and rejected cleanly.

use super::TlsVersion;
use std::fmt;

/// Key exchange family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyExchange {
    /// TLS 1.3 (negotiated through key_share)
    Tls13,
    Ecdhe,
    Dhe,
    Rsa,
    DhAnon,
    EcdhAnon,
    Srp,
}

/// Server authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// Signature algorithm chosen by extension (TLS 1.3)
    Any,
    Rsa,
    Ecdsa,
    Dss,
    Anonymous,
}

/// Bulk encryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkCipher {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
    Aes128Cbc,
    Aes256Cbc,
    TripleDesCbc,
}

/// PRF / transcript hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
    Sha384,
}

impl HashAlg {
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    pub(crate) fn digest_alg(self) -> &'static ring::digest::Algorithm {
        match self {
            Self::Sha256 => &ring::digest::SHA256,
            Self::Sha384 => &ring::digest::SHA384,
        }
    }

    pub(crate) fn hmac_alg(self) -> ring::hmac::Algorithm {
        match self {
            Self::Sha256 => ring::hmac::HMAC_SHA256,
            Self::Sha384 => ring::hmac::HMAC_SHA384,
        }
    }
}

/// Record MAC for non-AEAD suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacAlg {
    /// Integrity comes from the AEAD tag
    Aead,
    Sha1,
    Sha256,
    Sha384,
}

impl MacAlg {
    pub fn len(self) -> usize {
        match self {
            Self::Aead => 0,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// One row of the suite table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CipherSuite {
    pub id: u16,
    pub name: &'static str,
    pub kx: KeyExchange,
    pub auth: Authentication,
    pub bulk: BulkCipher,
    pub hash: HashAlg,
    pub mac: MacAlg,
    /// Record protection and key exchange exist in this crate.
    pub implemented: bool,
}

impl CipherSuite {
    /// Look up a suite by wire id.
    pub fn from_id(id: u16) -> Option<&'static CipherSuite> {
        SUITES.iter().find(|s| s.id == id)
    }

    /// Suites this crate can negotiate, in default preference order.
    pub fn implemented() -> impl Iterator<Item = &'static CipherSuite> {
        SUITES.iter().filter(|s| s.implemented)
    }

    pub fn is_tls13(&self) -> bool {
        self.kx == KeyExchange::Tls13
    }

    /// Whether the suite may be used at `version`.
    pub fn usable_with(&self, version: TlsVersion) -> bool {
        match version {
            TlsVersion::Tls13 => self.is_tls13(),
            TlsVersion::Tls12 => !self.is_tls13(),
            // AEAD suites and SHA-256 MACs start with TLS 1.2
            _ => !self.is_tls13() && !self.is_aead() && self.mac == MacAlg::Sha1,
        }
    }

    pub fn is_aead(&self) -> bool {
        self.mac == MacAlg::Aead
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self.bulk,
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc | BulkCipher::TripleDesCbc
        )
    }

    /// Anonymous suites need no server certificate.
    pub fn is_anonymous(&self) -> bool {
        self.auth == Authentication::Anonymous
    }

    pub fn key_len(&self) -> usize {
        match self.bulk {
            BulkCipher::Aes128Gcm | BulkCipher::Aes128Cbc => 16,
            BulkCipher::Aes256Gcm | BulkCipher::Aes256Cbc | BulkCipher::ChaCha20Poly1305 => 32,
            BulkCipher::TripleDesCbc => 24,
        }
    }

    /// IV bytes derived from the key schedule.
    pub fn fixed_iv_len(&self) -> usize {
        match (self.is_tls13(), self.bulk) {
            (false, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm) => 4,
            (_, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm | BulkCipher::ChaCha20Poly1305) => {
                12
            }
            (_, BulkCipher::TripleDesCbc) => 8,
            _ => 16,
        }
    }

    /// Explicit per-record IV bytes on the wire.
    pub fn record_iv_len(&self) -> usize {
        match (self.is_tls13(), self.bulk) {
            (false, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm) => 8,
            (_, BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc) => 16,
            (_, BulkCipher::TripleDesCbc) => 8,
            _ => 0,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.name, self.id)
    }
}

#[allow(clippy::too_many_arguments)]
const fn suite(
    id: u16,
    name: &'static str,
    kx: KeyExchange,
    auth: Authentication,
    bulk: BulkCipher,
    hash: HashAlg,
    mac: MacAlg,
    implemented: bool,
) -> CipherSuite {
    CipherSuite {
        id,
        name,
        kx,
        auth,
        bulk,
        hash,
        mac,
        implemented,
    }
}

use Authentication as A;
use BulkCipher as B;
use HashAlg as H;
use KeyExchange as K;
use MacAlg as M;

#[rustfmt::skip]
static SUITES: &[CipherSuite] = &[
    // TLS 1.3
    suite(0x1301, "TLS_AES_128_GCM_SHA256", K::Tls13, A::Any, B::Aes128Gcm, H::Sha256, M::Aead, true),
    suite(0x1302, "TLS_AES_256_GCM_SHA384", K::Tls13, A::Any, B::Aes256Gcm, H::Sha384, M::Aead, true),
    suite(0x1303, "TLS_CHACHA20_POLY1305_SHA256", K::Tls13, A::Any, B::ChaCha20Poly1305, H::Sha256, M::Aead, true),
    // TLS 1.2 AEAD
    suite(0xC02B, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", K::Ecdhe, A::Ecdsa, B::Aes128Gcm, H::Sha256, M::Aead, true),
    suite(0xC02C, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", K::Ecdhe, A::Ecdsa, B::Aes256Gcm, H::Sha384, M::Aead, true),
    suite(0xC02F, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", K::Ecdhe, A::Rsa, B::Aes128Gcm, H::Sha256, M::Aead, true),
    suite(0xC030, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", K::Ecdhe, A::Rsa, B::Aes256Gcm, H::Sha384, M::Aead, true),
    suite(0xCCA9, "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", K::Ecdhe, A::Ecdsa, B::ChaCha20Poly1305, H::Sha256, M::Aead, true),
    suite(0xCCA8, "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", K::Ecdhe, A::Rsa, B::ChaCha20Poly1305, H::Sha256, M::Aead, true),
    suite(0x009E, "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256", K::Dhe, A::Rsa, B::Aes128Gcm, H::Sha256, M::Aead, true),
    suite(0x009F, "TLS_DHE_RSA_WITH_AES_256_GCM_SHA384", K::Dhe, A::Rsa, B::Aes256Gcm, H::Sha384, M::Aead, true),
    suite(0xCCAA, "TLS_DHE_RSA_WITH_CHACHA20_POLY1305_SHA256", K::Dhe, A::Rsa, B::ChaCha20Poly1305, H::Sha256, M::Aead, true),
    // Known, never offered
    suite(0x009C, "TLS_RSA_WITH_AES_128_GCM_SHA256", K::Rsa, A::Rsa, B::Aes128Gcm, H::Sha256, M::Aead, false),
    suite(0x009D, "TLS_RSA_WITH_AES_256_GCM_SHA384", K::Rsa, A::Rsa, B::Aes256Gcm, H::Sha384, M::Aead, false),
    suite(0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA", K::Rsa, A::Rsa, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA", K::Rsa, A::Rsa, B::Aes256Cbc, H::Sha256, M::Sha1, false),
    suite(0x003C, "TLS_RSA_WITH_AES_128_CBC_SHA256", K::Rsa, A::Rsa, B::Aes128Cbc, H::Sha256, M::Sha256, false),
    suite(0x000A, "TLS_RSA_WITH_3DES_EDE_CBC_SHA", K::Rsa, A::Rsa, B::TripleDesCbc, H::Sha256, M::Sha1, false),
    suite(0xC013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", K::Ecdhe, A::Rsa, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0xC014, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", K::Ecdhe, A::Rsa, B::Aes256Cbc, H::Sha256, M::Sha1, false),
    suite(0xC027, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", K::Ecdhe, A::Rsa, B::Aes128Cbc, H::Sha256, M::Sha256, false),
    suite(0xC009, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", K::Ecdhe, A::Ecdsa, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0xC00A, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", K::Ecdhe, A::Ecdsa, B::Aes256Cbc, H::Sha256, M::Sha1, false),
    suite(0x0033, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA", K::Dhe, A::Rsa, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0x0039, "TLS_DHE_RSA_WITH_AES_256_CBC_SHA", K::Dhe, A::Rsa, B::Aes256Cbc, H::Sha256, M::Sha1, false),
    suite(0x0034, "TLS_DH_anon_WITH_AES_128_CBC_SHA", K::DhAnon, A::Anonymous, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0xC018, "TLS_ECDH_anon_WITH_AES_128_CBC_SHA", K::EcdhAnon, A::Anonymous, B::Aes128Cbc, H::Sha256, M::Sha1, false),
    suite(0xC01D, "TLS_SRP_SHA_WITH_AES_128_CBC_SHA", K::Srp, A::Anonymous, B::Aes128Cbc, H::Sha256, M::Sha1, false),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let s = CipherSuite::from_id(0xC02F).unwrap();
        assert_eq!(s.kx, KeyExchange::Ecdhe);
        assert!(s.is_aead());
        assert!(!s.is_block());
        assert_eq!(s.key_len(), 16);
        assert_eq!(s.fixed_iv_len(), 4);
        assert_eq!(s.record_iv_len(), 8);
        assert!(CipherSuite::from_id(0xFFFF).is_none());
    }

    #[test]
    fn test_tls13_iv() {
        let s = CipherSuite::from_id(0x1302).unwrap();
        assert!(s.is_tls13());
        assert_eq!(s.fixed_iv_len(), 12);
        assert_eq!(s.record_iv_len(), 0);
        assert_eq!(s.hash.output_len(), 48);
        assert!(s.usable_with(TlsVersion::Tls13));
        assert!(!s.usable_with(TlsVersion::Tls12));
    }

    #[test]
    fn test_classification() {
        let anon = CipherSuite::from_id(0x0034).unwrap();
        assert!(anon.is_anonymous());
        assert!(anon.is_block());
        assert_eq!(anon.mac.len(), 20);
        assert!(CipherSuite::implemented().all(|s| s.is_aead()));
        assert_eq!(CipherSuite::implemented().count(), 12);
    }

    #[test]
    fn test_unique_ids() {
        let mut ids: Vec<u16> = SUITES.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), SUITES.len());
    }
}
