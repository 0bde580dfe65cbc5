// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named groups and ephemeral key agreement.
//!
//! Backends: ring for X25519/P-256/P-384, `p521` and `x448` for the curves
//! ring does not cover, and [`super::ffdhe`] for finite-field groups.

use super::ffdhe::{DhKeyPair, DhParams};
use super::TlsError;
use p521::elliptic_curve::sec1::ToEncodedPoint;
use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use zeroize::Zeroizing;

/// supported_groups / key_share identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NamedGroup {
    Secp256r1,
    Secp384r1,
    Secp521r1,
    X25519,
    X448,
    Ffdhe2048,
    Ffdhe3072,
    Ffdhe4096,
    Ffdhe6144,
    Ffdhe8192,
    Unknown(u16),
}

impl NamedGroup {
    /// Groups the client supports, in preference order.
    pub const SUPPORTED: [NamedGroup; 10] = [
        NamedGroup::X25519,
        NamedGroup::Secp256r1,
        NamedGroup::Secp384r1,
        NamedGroup::Secp521r1,
        NamedGroup::X448,
        NamedGroup::Ffdhe2048,
        NamedGroup::Ffdhe3072,
        NamedGroup::Ffdhe4096,
        NamedGroup::Ffdhe6144,
        NamedGroup::Ffdhe8192,
    ];

    pub fn from_wire(id: u16) -> Self {
        match id {
            23 => Self::Secp256r1,
            24 => Self::Secp384r1,
            25 => Self::Secp521r1,
            29 => Self::X25519,
            30 => Self::X448,
            256 => Self::Ffdhe2048,
            257 => Self::Ffdhe3072,
            258 => Self::Ffdhe4096,
            259 => Self::Ffdhe6144,
            260 => Self::Ffdhe8192,
            other => Self::Unknown(other),
        }
    }

    pub fn wire(self) -> u16 {
        match self {
            Self::Secp256r1 => 23,
            Self::Secp384r1 => 24,
            Self::Secp521r1 => 25,
            Self::X25519 => 29,
            Self::X448 => 30,
            Self::Ffdhe2048 => 256,
            Self::Ffdhe3072 => 257,
            Self::Ffdhe4096 => 258,
            Self::Ffdhe6144 => 259,
            Self::Ffdhe8192 => 260,
            Self::Unknown(id) => id,
        }
    }

    /// Finite-field parameters for ffdhe groups.
    pub fn ffdhe_params(self) -> Option<&'static DhParams> {
        let bits = match self {
            Self::Ffdhe2048 => 2048,
            Self::Ffdhe3072 => 3072,
            Self::Ffdhe4096 => 4096,
            Self::Ffdhe6144 => 6144,
            Self::Ffdhe8192 => 8192,
            _ => return None,
        };
        DhParams::ffdhe(bits)
    }

    pub fn is_ffdhe(self) -> bool {
        self.ffdhe_params().is_some()
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for NamedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secp256r1 => write!(f, "secp256r1"),
            Self::Secp384r1 => write!(f, "secp384r1"),
            Self::Secp521r1 => write!(f, "secp521r1"),
            Self::X25519 => write!(f, "x25519"),
            Self::X448 => write!(f, "x448"),
            Self::Ffdhe2048 => write!(f, "ffdhe2048"),
            Self::Ffdhe3072 => write!(f, "ffdhe3072"),
            Self::Ffdhe4096 => write!(f, "ffdhe4096"),
            Self::Ffdhe6144 => write!(f, "ffdhe6144"),
            Self::Ffdhe8192 => write!(f, "ffdhe8192"),
            Self::Unknown(id) => write!(f, "group#{}", id),
        }
    }
}

enum Secret {
    /// ring keys are consumed by agreement
    Ring(Option<EphemeralPrivateKey>, &'static agreement::Algorithm),
    P521(p521::SecretKey),
    X448(Box<x448::Secret>),
    /// key pair, keep leading zeros of the secret
    Dh(DhKeyPair, bool),
}

/// One ephemeral key pair, used for exactly one agreement.
pub struct EphemeralKey {
    group: NamedGroup,
    public: Vec<u8>,
    secret: Secret,
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("group", &self.group)
            .field("public_len", &self.public.len())
            .finish()
    }
}

fn rng_failure() -> TlsError {
    TlsError::Internal("random generator failed".into())
}

impl EphemeralKey {
    /// Fresh key pair for a named group.
    pub fn generate(group: NamedGroup) -> Result<Self, TlsError> {
        let rng = SystemRandom::new();
        let ring_alg = match group {
            NamedGroup::X25519 => Some(&agreement::X25519),
            NamedGroup::Secp256r1 => Some(&agreement::ECDH_P256),
            NamedGroup::Secp384r1 => Some(&agreement::ECDH_P384),
            _ => None,
        };
        if let Some(alg) = ring_alg {
            let private = EphemeralPrivateKey::generate(alg, &rng).map_err(|_| rng_failure())?;
            let public = private
                .compute_public_key()
                .map_err(|_| TlsError::Internal(format!("{} public key", group)))?
                .as_ref()
                .to_vec();
            return Ok(Self {
                group,
                public,
                secret: Secret::Ring(Some(private), alg),
            });
        }

        match group {
            NamedGroup::Secp521r1 => {
                let secret = loop {
                    let mut bytes = Zeroizing::new([0u8; 66]);
                    rng.fill(bytes.as_mut()).map_err(|_| rng_failure())?;
                    bytes[0] &= 0x01;
                    if let Ok(sk) = p521::SecretKey::from_slice(bytes.as_ref()) {
                        break sk;
                    }
                };
                let public = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Ok(Self {
                    group,
                    public,
                    secret: Secret::P521(secret),
                })
            }
            NamedGroup::X448 => {
                let mut bytes = Zeroizing::new([0u8; 56]);
                rng.fill(bytes.as_mut()).map_err(|_| rng_failure())?;
                let secret = x448::Secret::from_bytes(bytes.as_ref())
                    .ok_or_else(|| TlsError::Internal("x448 secret".into()))?;
                let public = x448::PublicKey::from(&secret).as_bytes().to_vec();
                Ok(Self {
                    group,
                    public,
                    secret: Secret::X448(Box::new(secret)),
                })
            }
            other => match other.ffdhe_params() {
                Some(params) => {
                    let pair = params.generate()?;
                    Ok(Self {
                        group,
                        public: pair.public_key().to_vec(),
                        secret: Secret::Dh(pair, true),
                    })
                }
                None => Err(TlsError::HandshakeFailure(format!(
                    "no key agreement for {}",
                    other
                ))),
            },
        }
    }

    /// Key pair over server-chosen DH parameters (TLS 1.2 DHE).
    pub fn generate_dh(group: NamedGroup, params: &DhParams) -> Result<Self, TlsError> {
        let pair = params.generate()?;
        Ok(Self {
            group,
            public: pair.public_key().to_vec(),
            secret: Secret::Dh(pair, false),
        })
    }

    pub fn group(&self) -> NamedGroup {
        self.group
    }

    /// Public value as sent in key_share / ClientKeyExchange.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Shared secret with `peer`.
    ///
    /// FFDHE key shares keep leading zeros (padded to the prime length);
    /// TLS 1.2 DHE strips them.
    pub fn agree(&mut self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let bad_share = || TlsError::IllegalParameter(format!("invalid {} key share", self.group));
        match &mut self.secret {
            Secret::Ring(private, alg) => {
                let private = private
                    .take()
                    .ok_or_else(|| TlsError::Internal("key share already used".into()))?;
                let peer = UnparsedPublicKey::new(*alg, peer);
                agreement::agree_ephemeral(private, &peer, |s| Zeroizing::new(s.to_vec()))
                    .map_err(|_| bad_share())
            }
            Secret::P521(secret) => {
                let peer = p521::PublicKey::from_sec1_bytes(peer).map_err(|_| bad_share())?;
                let shared = p521::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            Secret::X448(secret) => {
                let peer = x448::PublicKey::from_bytes(peer).ok_or_else(bad_share)?;
                let shared = secret.as_diffie_hellman(&peer).ok_or_else(bad_share)?;
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
            Secret::Dh(pair, padded) => pair.agree(peer, *padded),
        }
    }
}
