// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AEAD record protection.
//!
//! | version | nonce                      | explicit nonce | AAD                          |
//! |---------|----------------------------|----------------|------------------------------|
//! | 1.3     | iv ^ seq                   | none           | record header                |
//! | 1.2 GCM | salt(4) ‖ seq(8)           | seq (8 bytes)  | seq ‖ type ‖ version ‖ length |
//! | 1.2 ChaCha | iv ^ seq                | none           | seq ‖ type ‖ version ‖ length |

use super::cipher::{BulkCipher, CipherSuite};
use super::keys::TrafficKeys;
use super::record::{content_type, RawTlsRecord, MAX_PLAINTEXT};
use super::{TlsError, TlsVersion};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};

const TAG_LEN: usize = 16;

/// One direction of record protection with its sequence number.
pub struct RecordProtector {
    key: LessSafeKey,
    iv: Vec<u8>,
    seq: u64,
    suite: &'static CipherSuite,
    version: TlsVersion,
}

impl std::fmt::Debug for RecordProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProtector")
            .field("suite", &self.suite.name)
            .field("version", &self.version)
            .field("seq", &self.seq)
            .finish()
    }
}

impl RecordProtector {
    pub fn new(
        suite: &'static CipherSuite,
        keys: &TrafficKeys,
        version: TlsVersion,
    ) -> Result<Self, TlsError> {
        let alg = match suite.bulk {
            BulkCipher::Aes128Gcm => &aead::AES_128_GCM,
            BulkCipher::Aes256Gcm => &aead::AES_256_GCM,
            BulkCipher::ChaCha20Poly1305 => &aead::CHACHA20_POLY1305,
            other => {
                return Err(TlsError::Internal(format!(
                    "no record protection for {:?}",
                    other
                )))
            }
        };
        let unbound = UnboundKey::new(alg, &keys.key)
            .map_err(|_| TlsError::Internal("AEAD key length".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            iv: keys.iv.clone(),
            seq: 0,
            suite,
            version,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.seq
    }

    fn next_seq(&mut self) -> Result<u64, TlsError> {
        let seq = self.seq;
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| TlsError::Internal("record sequence exhausted".into()))?;
        Ok(seq)
    }

    fn explicit_nonce(&self) -> bool {
        self.version != TlsVersion::Tls13 && self.suite.record_iv_len() > 0
    }

    fn nonce(&self, seq: u64) -> Nonce {
        let mut nonce = [0u8; NONCE_LEN];
        if self.explicit_nonce() {
            nonce[..4].copy_from_slice(&self.iv[..4]);
            nonce[4..].copy_from_slice(&seq.to_be_bytes());
        } else {
            nonce.copy_from_slice(&self.iv[..NONCE_LEN]);
            for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
                *n ^= s;
            }
        }
        Nonce::assume_unique_for_key(nonce)
    }

    fn aad12(seq: u64, content_type: u8, version: u16, len: usize) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..8].copy_from_slice(&seq.to_be_bytes());
        aad[8] = content_type;
        aad[9..11].copy_from_slice(&version.to_be_bytes());
        aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
        aad
    }

    /// Protect one plaintext fragment.
    pub fn seal(&mut self, ty: u8, plaintext: &[u8]) -> Result<RawTlsRecord, TlsError> {
        if plaintext.len() > MAX_PLAINTEXT {
            return Err(TlsError::Internal("fragment larger than 2^14".into()));
        }
        let seq = self.next_seq()?;
        let nonce = self.nonce(seq);
        let wire_version = self.version.legacy_wire();

        if self.version == TlsVersion::Tls13 {
            let mut inner = Vec::with_capacity(plaintext.len() + 1 + TAG_LEN);
            inner.extend_from_slice(plaintext);
            inner.push(ty);
            let len = (inner.len() + TAG_LEN) as u16;
            let header = [
                content_type::APPLICATION_DATA,
                (wire_version >> 8) as u8,
                wire_version as u8,
                (len >> 8) as u8,
                len as u8,
            ];
            self.key
                .seal_in_place_append_tag(nonce, Aad::from(header), &mut inner)
                .map_err(|_| TlsError::Internal("seal failed".into()))?;
            return Ok(RawTlsRecord::new(content_type::APPLICATION_DATA, wire_version, inner));
        }

        let aad = Self::aad12(seq, ty, wire_version, plaintext.len());
        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(aad), &mut sealed)
            .map_err(|_| TlsError::Internal("seal failed".into()))?;
        let payload = if self.explicit_nonce() {
            let mut p = seq.to_be_bytes().to_vec();
            p.extend_from_slice(&sealed);
            p
        } else {
            sealed
        };
        Ok(RawTlsRecord::new(ty, wire_version, payload))
    }

    /// Remove protection; returns the real content type and plaintext.
    pub fn open(&mut self, record: RawTlsRecord) -> Result<(u8, Vec<u8>), TlsError> {
        let seq = self.next_seq()?;

        if self.version == TlsVersion::Tls13 {
            if record.content_type != content_type::APPLICATION_DATA {
                return Err(TlsError::UnexpectedMessage(format!(
                    "protected record of type {}",
                    record.content_type
                )));
            }
            let len = record.payload.len() as u16;
            let header = [
                record.content_type,
                (record.version >> 8) as u8,
                record.version as u8,
                (len >> 8) as u8,
                len as u8,
            ];
            let mut data = record.payload;
            let plain_len = self
                .key
                .open_in_place(self.nonce(seq), Aad::from(header), &mut data)
                .map_err(|_| TlsError::BadRecordMac)?
                .len();
            data.truncate(plain_len);
            // strip zero padding, then the inner content type
            let end = data
                .iter()
                .rposition(|&b| b != 0)
                .ok_or_else(|| TlsError::UnexpectedMessage("record without content type".into()))?;
            let ty = data[end];
            data.truncate(end);
            if data.len() > MAX_PLAINTEXT {
                return Err(TlsError::RecordOverflow(data.len()));
            }
            return Ok((ty, data));
        }

        let mut data = record.payload;
        let nonce = if self.explicit_nonce() {
            if data.len() < 8 + TAG_LEN {
                return Err(TlsError::BadRecordMac);
            }
            let mut n = [0u8; NONCE_LEN];
            n[..4].copy_from_slice(&self.iv[..4]);
            n[4..].copy_from_slice(&data[..8]);
            data.drain(..8);
            Nonce::assume_unique_for_key(n)
        } else {
            if data.len() < TAG_LEN {
                return Err(TlsError::BadRecordMac);
            }
            self.nonce(seq)
        };
        let aad = Self::aad12(seq, record.content_type, record.version, data.len() - TAG_LEN);
        let plain_len = self
            .key
            .open_in_place(nonce, Aad::from(aad), &mut data)
            .map_err(|_| TlsError::BadRecordMac)?
            .len();
        data.truncate(plain_len);
        Ok((record.content_type, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    fn pair(id: u16, version: TlsVersion) -> (RecordProtector, RecordProtector) {
        let suite = CipherSuite::from_id(id).unwrap();
        let keys = TrafficKeys {
            key: Zeroizing::new(vec![0x42; suite.key_len()]),
            iv: vec![0x24; suite.fixed_iv_len()],
        };
        (
            RecordProtector::new(suite, &keys, version).unwrap(),
            RecordProtector::new(suite, &keys, version).unwrap(),
        )
    }

    #[test]
    fn test_tls13_hides_content_type() {
        let (mut tx, mut rx) = pair(0x1301, TlsVersion::Tls13);
        let rec = tx.seal(content_type::HANDSHAKE, b"hello").unwrap();
        assert_eq!(rec.content_type, content_type::APPLICATION_DATA);
        assert_eq!(rec.version, 0x0303);
        assert_eq!(rec.payload.len(), 5 + 1 + TAG_LEN);
        let (ty, plain) = rx.open(rec).unwrap();
        assert_eq!(ty, content_type::HANDSHAKE);
        assert_eq!(plain, b"hello");
        assert_eq!(rx.sequence(), 1);
    }

    #[test]
    fn test_tls12_gcm_explicit_nonce() {
        let (mut tx, mut rx) = pair(0xC02F, TlsVersion::Tls12);
        tx.seal(content_type::APPLICATION_DATA, b"skip").unwrap();
        let rec = tx.seal(content_type::APPLICATION_DATA, b"data").unwrap();
        assert_eq!(&rec.payload[..8], &1u64.to_be_bytes());
        assert_eq!(rec.payload.len(), 8 + 4 + TAG_LEN);
        // receiver sequence must follow the sender's
        rx.seq = 1;
        let (_, plain) = rx.open(rec).unwrap();
        assert_eq!(plain, b"data");
    }

    #[test]
    fn test_tls12_chacha() {
        let (mut tx, mut rx) = pair(0xCCA8, TlsVersion::Tls12);
        let rec = tx.seal(content_type::HANDSHAKE, b"fin").unwrap();
        assert_eq!(rec.payload.len(), 3 + TAG_LEN);
        assert_eq!(rx.open(rec).unwrap().1, b"fin");
    }

    #[test]
    fn test_tampering_is_bad_record_mac() {
        let (mut tx, mut rx) = pair(0x1303, TlsVersion::Tls13);
        let mut rec = tx.seal(content_type::APPLICATION_DATA, b"x").unwrap();
        rec.payload[0] ^= 1;
        let err = rx.open(rec).unwrap_err();
        assert_eq!(err.alert_code(), Some(20));
    }

    #[test]
    fn test_unimplemented_bulk_cipher() {
        let suite = CipherSuite::from_id(0x002F).unwrap();
        let keys = TrafficKeys {
            key: Zeroizing::new(vec![0; 16]),
            iv: vec![0; 16],
        };
        assert!(RecordProtector::new(suite, &keys, TlsVersion::Tls12).is_err());
    }
}
