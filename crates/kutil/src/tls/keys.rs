// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key schedules.
//!
//! TLS 1.3 derives everything through HKDF (RFC 5869) with the
//! `"tls13 "` label prefix (RFC 8446 section 7.1). TLS 1.2 uses the
//! P_hash PRF (RFC 5246 section 5). Both are built on `ring::hmac`.

use super::cipher::{CipherSuite, HashAlg};
use super::record::RawHandshake;
use super::handshake::msg_type;
use ring::{digest, hmac};
use zeroize::Zeroizing;

/// Secret bytes, wiped on drop.
pub type Secret = Zeroizing<Vec<u8>>;

// ============================================================================
// HKDF
// ============================================================================

fn hmac_sign(hash: HashAlg, key: &[u8], parts: &[&[u8]]) -> Secret {
    let key = hmac::Key::new(hash.hmac_alg(), key);
    let mut ctx = hmac::Context::with_key(&key);
    for p in parts {
        ctx.update(p);
    }
    Zeroizing::new(ctx.sign().as_ref().to_vec())
}

/// HKDF-Extract.
pub fn hkdf_extract(hash: HashAlg, salt: &[u8], ikm: &[u8]) -> Secret {
    hmac_sign(hash, salt, &[ikm])
}

/// HKDF-Expand to `len` bytes.
pub fn hkdf_expand(hash: HashAlg, prk: &[u8], info: &[u8], len: usize) -> Secret {
    let mut out = Zeroizing::new(Vec::with_capacity(len));
    let mut block: Secret = Zeroizing::new(Vec::new());
    let mut counter = 1u8;
    while out.len() < len {
        block = hmac_sign(hash, prk, &[block.as_slice(), info, &[counter]]);
        let take = (len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }
    out
}

/// HKDF-Expand-Label.
pub fn hkdf_expand_label(
    hash: HashAlg,
    secret: &[u8],
    label: &str,
    context: &[u8],
    len: usize,
) -> Secret {
    let full_label = [b"tls13 ".as_slice(), label.as_bytes()].concat();
    let mut info = Vec::with_capacity(4 + full_label.len() + context.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push(full_label.len() as u8);
    info.extend_from_slice(&full_label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);
    hkdf_expand(hash, secret, &info, len)
}

/// Derive-Secret over an already computed transcript hash.
pub fn derive_secret(hash: HashAlg, secret: &[u8], label: &str, transcript_hash: &[u8]) -> Secret {
    hkdf_expand_label(hash, secret, label, transcript_hash, hash.output_len())
}

pub fn hash_of(hash: HashAlg, data: &[u8]) -> Vec<u8> {
    digest::digest(hash.digest_alg(), data).as_ref().to_vec()
}

// ============================================================================
// Transcript
// ============================================================================

/// Handshake messages exchanged so far, hashed on demand.
///
/// The hash algorithm is only known after ServerHello, so messages are
/// kept whole.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    bytes: Vec<u8>,
}

impl Transcript {
    pub fn add(&mut self, msg: &RawHandshake) {
        self.bytes.extend_from_slice(&msg.encode());
    }

    pub fn hash(&self, hash: HashAlg) -> Vec<u8> {
        hash_of(hash, &self.bytes)
    }

    /// Replace ClientHello1 by a synthetic message_hash after a
    /// HelloRetryRequest.
    pub fn replace_with_message_hash(&mut self, hash: HashAlg) {
        let digest = self.hash(hash);
        let synthetic = RawHandshake {
            msg_type: msg_type::MESSAGE_HASH,
            body: digest,
        };
        self.bytes = synthetic.encode();
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Traffic keys
// ============================================================================

/// AEAD key and IV for one direction.
#[derive(Clone)]
pub struct TrafficKeys {
    pub key: Secret,
    pub iv: Vec<u8>,
}

impl std::fmt::Debug for TrafficKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficKeys")
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

/// key/iv for a TLS 1.3 traffic secret.
pub fn traffic_keys(suite: &CipherSuite, secret: &[u8]) -> TrafficKeys {
    TrafficKeys {
        key: hkdf_expand_label(suite.hash, secret, "key", &[], suite.key_len()),
        iv: hkdf_expand_label(suite.hash, secret, "iv", &[], suite.fixed_iv_len()).to_vec(),
    }
}

/// Next-generation traffic secret (KeyUpdate).
pub fn next_traffic_secret(hash: HashAlg, secret: &[u8]) -> Secret {
    hkdf_expand_label(hash, secret, "traffic upd", &[], hash.output_len())
}

/// Finished verify_data for a TLS 1.3 base key.
pub fn finished_verify_data(hash: HashAlg, base_key: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let finished_key = hkdf_expand_label(hash, base_key, "finished", &[], hash.output_len());
    hmac_sign(hash, &finished_key, &[transcript_hash]).to_vec()
}

/// TLS 1.3 secret chain: early, handshake, master.
pub struct KeySchedule13 {
    hash: HashAlg,
    handshake_secret: Secret,
}

/// Traffic secrets of both sides.
pub struct TrafficSecrets {
    pub client: Secret,
    pub server: Secret,
}

impl KeySchedule13 {
    /// Run the schedule up to the handshake secret (no PSK).
    pub fn new(hash: HashAlg, shared_secret: &[u8]) -> Self {
        let zeros = vec![0u8; hash.output_len()];
        let early = hkdf_extract(hash, &zeros, &zeros);
        let derived = derive_secret(hash, &early, "derived", &hash_of(hash, &[]));
        let handshake_secret = hkdf_extract(hash, &derived, shared_secret);
        Self {
            hash,
            handshake_secret,
        }
    }

    pub fn hash(&self) -> HashAlg {
        self.hash
    }

    /// Handshake traffic secrets over the ClientHello..ServerHello hash.
    pub fn handshake_traffic(&self, transcript_hash: &[u8]) -> TrafficSecrets {
        TrafficSecrets {
            client: derive_secret(self.hash, &self.handshake_secret, "c hs traffic", transcript_hash),
            server: derive_secret(self.hash, &self.handshake_secret, "s hs traffic", transcript_hash),
        }
    }

    /// Application traffic secrets over the ClientHello..server Finished hash.
    pub fn application_traffic(&self, transcript_hash: &[u8]) -> TrafficSecrets {
        let zeros = vec![0u8; self.hash.output_len()];
        let derived = derive_secret(self.hash, &self.handshake_secret, "derived", &hash_of(self.hash, &[]));
        let master = hkdf_extract(self.hash, &derived, &zeros);
        TrafficSecrets {
            client: derive_secret(self.hash, &master, "c ap traffic", transcript_hash),
            server: derive_secret(self.hash, &master, "s ap traffic", transcript_hash),
        }
    }
}

// ============================================================================
// TLS 1.2
// ============================================================================

/// P_hash PRF: `len` bytes of PRF(secret, label, seed).
pub fn prf(hash: HashAlg, secret: &[u8], label: &str, seed: &[u8], len: usize) -> Secret {
    let label_seed = [label.as_bytes(), seed].concat();
    let mut out = Zeroizing::new(Vec::with_capacity(len));
    let mut a = hmac_sign(hash, secret, &[label_seed.as_slice()]);
    while out.len() < len {
        let block = hmac_sign(hash, secret, &[a.as_slice(), label_seed.as_slice()]);
        let take = (len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
        a = hmac_sign(hash, secret, &[a.as_slice()]);
    }
    out
}

pub fn master_secret(
    hash: HashAlg,
    pre_master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Secret {
    let seed = [client_random.as_slice(), server_random.as_slice()].concat();
    prf(hash, pre_master, "master secret", &seed, 48)
}

/// Both directions' keys from the TLS 1.2 key block.
pub struct KeyBlock {
    pub client: TrafficKeys,
    pub server: TrafficKeys,
}

/// Key block, split as client/server MAC keys, keys, then fixed IVs.
pub fn key_block(
    suite: &CipherSuite,
    master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> KeyBlock {
    let mac_len = suite.mac.len();
    let key_len = suite.key_len();
    let iv_len = suite.fixed_iv_len();
    let seed = [server_random.as_slice(), client_random.as_slice()].concat();
    let block = prf(
        suite.hash,
        master,
        "key expansion",
        &seed,
        2 * (mac_len + key_len + iv_len),
    );
    let mut at = 2 * mac_len;
    let mut take = |n: usize| {
        let part = block[at..at + n].to_vec();
        at += n;
        part
    };
    let client_key = Zeroizing::new(take(key_len));
    let server_key = Zeroizing::new(take(key_len));
    let client_iv = take(iv_len);
    let server_iv = take(iv_len);
    KeyBlock {
        client: TrafficKeys {
            key: client_key,
            iv: client_iv,
        },
        server: TrafficKeys {
            key: server_key,
            iv: server_iv,
        },
    }
}

/// 12-byte Finished verify_data; `label` is "client finished" or
/// "server finished".
pub fn verify_data12(hash: HashAlg, master: &[u8], label: &str, transcript_hash: &[u8]) -> Vec<u8> {
    prf(hash, master, label, transcript_hash, 12).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_hkdf_rfc5869_case1() {
        let ikm = [0x0bu8; 22];
        let salt = hex("000102030405060708090a0b0c");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");
        let prk = hkdf_extract(HashAlg::Sha256, &salt, &ikm);
        assert_eq!(
            *prk,
            hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5")
        );
        let okm = hkdf_expand(HashAlg::Sha256, &prk, &info, 42);
        assert_eq!(
            *okm,
            hex("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
        );
    }

    #[test]
    fn test_tls13_early_secret() {
        // RFC 8448 simple 1-RTT handshake
        let zeros = [0u8; 32];
        let early = hkdf_extract(HashAlg::Sha256, &zeros, &zeros);
        assert_eq!(
            *early,
            hex("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
        let derived = derive_secret(HashAlg::Sha256, &early, "derived", &hash_of(HashAlg::Sha256, &[]));
        assert_eq!(
            *derived,
            hex("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn test_tls12_prf_sha256() {
        let secret = hex("9bbe436ba940f017b17652849a71db35");
        let seed = hex("a0ba9f936cda311827a6f796ffd5198c");
        let out = prf(HashAlg::Sha256, &secret, "test label", &seed, 100);
        assert_eq!(out.len(), 100);
        assert_eq!(out[..16], hex("e3f229ba727be17b8d122620557cd453")[..]);
    }

    #[test]
    fn test_schedule_shapes() {
        let suite = CipherSuite::from_id(0x1302).unwrap();
        let ks = KeySchedule13::new(suite.hash, &[7u8; 32]);
        let hs = ks.handshake_traffic(&[1u8; 48]);
        assert_eq!(hs.client.len(), 48);
        assert_ne!(*hs.client, *hs.server);
        let ap = ks.application_traffic(&[2u8; 48]);
        assert_ne!(*ap.client, *hs.client);
        let keys = traffic_keys(suite, &ap.client);
        assert_eq!(keys.key.len(), 32);
        assert_eq!(keys.iv.len(), 12);
        let next = next_traffic_secret(suite.hash, &ap.client);
        assert_ne!(*next, *ap.client);
        assert_eq!(finished_verify_data(suite.hash, &hs.server, &[0; 48]).len(), 48);
    }

    #[test]
    fn test_key_block_split() {
        let suite = CipherSuite::from_id(0xC02F).unwrap();
        let kb = key_block(suite, &[1u8; 48], &[2; 32], &[3; 32]);
        assert_eq!(kb.client.key.len(), 16);
        assert_eq!(kb.server.iv.len(), 4);
        assert_ne!(*kb.client.key, *kb.server.key);
        let vd = verify_data12(suite.hash, &[1u8; 48], "client finished", &[0; 32]);
        assert_eq!(vd.len(), 12);
    }

    #[test]
    fn test_message_hash_replacement() {
        let mut t = Transcript::default();
        t.add(&RawHandshake {
            msg_type: 1,
            body: vec![1, 2, 3],
        });
        let ch_hash = t.hash(HashAlg::Sha256);
        t.replace_with_message_hash(HashAlg::Sha256);
        let mut expected = vec![254, 0, 0, 32];
        expected.extend_from_slice(&ch_hash);
        assert_eq!(t.hash(HashAlg::Sha256), hash_of(HashAlg::Sha256, &expected));
    }
}
