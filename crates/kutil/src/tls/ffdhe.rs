// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Finite-field Diffie-Hellman.
//!
//! Named groups are the RFC 7919 safe primes with generator 2. TLS 1.2
//! DHE servers may also send arbitrary `(p, g)`, handled by
//! [`DhParams::custom`].

use super::TlsError;
use num_bigint::BigUint;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::OnceLock;
use zeroize::Zeroizing;

/// ffdhe2048 prime (RFC 7919 appendix A)
const FFDHE2048_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B423861285C97FFFFFFFFFFFFFFFF",
);

/// ffdhe3072 prime (RFC 7919 appendix A)
const FFDHE3072_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B4238611FCFDCDE355B3B6519035B",
    "BC34F4DEF99C023861B46FC9D6E6C9077AD91D2691F7F7EE598CB0FAC186D91C",
    "AEFE130985139270B4130C93BC437944F4FD4452E2D74DD364F2E21E71F54BFF",
    "5CAE82AB9C9DF69EE86D2BC522363A0DABC521979B0DEADA1DBF9A42D5C4484E",
    "0ABCD06BFA53DDEF3C1B20EE3FD59D7C25E41D2B66C62E37FFFFFFFFFFFFFFFF",
);

/// ffdhe4096 prime (RFC 7919 appendix A)
const FFDHE4096_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B4238611FCFDCDE355B3B6519035B",
    "BC34F4DEF99C023861B46FC9D6E6C9077AD91D2691F7F7EE598CB0FAC186D91C",
    "AEFE130985139270B4130C93BC437944F4FD4452E2D74DD364F2E21E71F54BFF",
    "5CAE82AB9C9DF69EE86D2BC522363A0DABC521979B0DEADA1DBF9A42D5C4484E",
    "0ABCD06BFA53DDEF3C1B20EE3FD59D7C25E41D2B669E1EF16E6F52C3164DF4FB",
    "7930E9E4E58857B6AC7D5F42D69F6D187763CF1D5503400487F55BA57E31CC7A",
    "7135C886EFB4318AED6A1E012D9E6832A907600A918130C46DC778F971AD0038",
    "092999A333CB8B7A1A1DB93D7140003C2A4ECEA9F98D0ACC0A8291CDCEC97DCF",
    "8EC9B55A7F88A46B4DB5A851F44182E1C68A007E5E655F6AFFFFFFFFFFFFFFFF",
);

/// ffdhe6144 prime (RFC 7919 appendix A)
const FFDHE6144_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B4238611FCFDCDE355B3B6519035B",
    "BC34F4DEF99C023861B46FC9D6E6C9077AD91D2691F7F7EE598CB0FAC186D91C",
    "AEFE130985139270B4130C93BC437944F4FD4452E2D74DD364F2E21E71F54BFF",
    "5CAE82AB9C9DF69EE86D2BC522363A0DABC521979B0DEADA1DBF9A42D5C4484E",
    "0ABCD06BFA53DDEF3C1B20EE3FD59D7C25E41D2B669E1EF16E6F52C3164DF4FB",
    "7930E9E4E58857B6AC7D5F42D69F6D187763CF1D5503400487F55BA57E31CC7A",
    "7135C886EFB4318AED6A1E012D9E6832A907600A918130C46DC778F971AD0038",
    "092999A333CB8B7A1A1DB93D7140003C2A4ECEA9F98D0ACC0A8291CDCEC97DCF",
    "8EC9B55A7F88A46B4DB5A851F44182E1C68A007E5E0DD9020BFD64B645036C7A",
    "4E677D2C38532A3A23BA4442CAF53EA63BB454329B7624C8917BDD64B1C0FD4C",
    "B38E8C334C701C3ACDAD0657FCCFEC719B1F5C3E4E46041F388147FB4CFDB477",
    "A52471F7A9A96910B855322EDB6340D8A00EF092350511E30ABEC1FFF9E3A26E",
    "7FB29F8C183023C3587E38DA0077D9B4763E4E4B94B2BBC194C6651E77CAF992",
    "EEAAC0232A281BF6B3A739C1226116820AE8DB5847A67CBEF9C9091B462D538C",
    "D72B03746AE77F5E62292C311562A846505DC82DB854338AE49F5235C95B9117",
    "8CCF2DD5CACEF403EC9D1810C6272B045B3B71F9DC6B80D63FDD4A8E9ADB1E69",
    "62A69526D43161C1A41D570D7938DAD4A40E329CD0E40E65FFFFFFFFFFFFFFFF",
);

/// ffdhe8192 prime (RFC 7919 appendix A)
const FFDHE8192_P: &str = concat!(
    "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
    "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
    "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
    "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
    "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
    "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
    "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
    "C58EF1837D1683B2C6F34A26C1B2EFFA886B4238611FCFDCDE355B3B6519035B",
    "BC34F4DEF99C023861B46FC9D6E6C9077AD91D2691F7F7EE598CB0FAC186D91C",
    "AEFE130985139270B4130C93BC437944F4FD4452E2D74DD364F2E21E71F54BFF",
    "5CAE82AB9C9DF69EE86D2BC522363A0DABC521979B0DEADA1DBF9A42D5C4484E",
    "0ABCD06BFA53DDEF3C1B20EE3FD59D7C25E41D2B669E1EF16E6F52C3164DF4FB",
    "7930E9E4E58857B6AC7D5F42D69F6D187763CF1D5503400487F55BA57E31CC7A",
    "7135C886EFB4318AED6A1E012D9E6832A907600A918130C46DC778F971AD0038",
    "092999A333CB8B7A1A1DB93D7140003C2A4ECEA9F98D0ACC0A8291CDCEC97DCF",
    "8EC9B55A7F88A46B4DB5A851F44182E1C68A007E5E0DD9020BFD64B645036C7A",
    "4E677D2C38532A3A23BA4442CAF53EA63BB454329B7624C8917BDD64B1C0FD4C",
    "B38E8C334C701C3ACDAD0657FCCFEC719B1F5C3E4E46041F388147FB4CFDB477",
    "A52471F7A9A96910B855322EDB6340D8A00EF092350511E30ABEC1FFF9E3A26E",
    "7FB29F8C183023C3587E38DA0077D9B4763E4E4B94B2BBC194C6651E77CAF992",
    "EEAAC0232A281BF6B3A739C1226116820AE8DB5847A67CBEF9C9091B462D538C",
    "D72B03746AE77F5E62292C311562A846505DC82DB854338AE49F5235C95B9117",
    "8CCF2DD5CACEF403EC9D1810C6272B045B3B71F9DC6B80D63FDD4A8E9ADB1E69",
    "62A69526D43161C1A41D570D7938DAD4A40E329CCFF46AAA36AD004CF600C838",
    "1E425A31D951AE64FDB23FCEC9509D43687FEB69EDD1CC5E0B8CC3BDF64B10EF",
    "86B63142A3AB8829555B2F747C932665CB2C0F1CC01BD70229388839D2AF05E4",
    "54504AC78B7582822846C0BA35C35F5C59160CC046FD8251541FC68C9C86B022",
    "BB7099876A460E7451A8A93109703FEE1C217E6C3826E52C51AA691E0E423CFC",
    "99E9E31650C1217B624816CDAD9A95F9D5B8019488D9C0A0A1FE3075A577E231",
    "83F81D4A3F2FA4571EFC8CE0BA8A4FE8B6855DFE72B0A66EDED2FBABFBE58A30",
    "FAFABE1C5D71A87E2F741EF8C1FE86FEA6BBFDE530677F0D97D11D49F7A8443D",
    "0822E506A9F4614E011E2A94838FF88CD68C8BB7C5C6424CFFFFFFFFFFFFFFFF",
);

/// Diffie-Hellman domain parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DhParams {
    p: BigUint,
    g: BigUint,
    /// Private exponent size in bits
    exponent_bits: usize,
}

impl DhParams {
    /// RFC 7919 group of `bits` bits (2048, 3072, 4096, 6144 or 8192).
    pub fn ffdhe(bits: usize) -> Option<&'static DhParams> {
        static GROUPS: OnceLock<Vec<DhParams>> = OnceLock::new();
        let groups = GROUPS.get_or_init(|| {
            [
                (FFDHE2048_P, 256),
                (FFDHE3072_P, 320),
                (FFDHE4096_P, 384),
                (FFDHE6144_P, 448),
                (FFDHE8192_P, 512),
            ]
            .iter()
            .filter_map(|(hex, exponent_bits)| {
                Some(DhParams {
                    p: BigUint::parse_bytes(hex.as_bytes(), 16)?,
                    g: BigUint::from(2u32),
                    exponent_bits: *exponent_bits,
                })
            })
            .collect()
        });
        groups.iter().find(|g| g.p.bits() as usize == bits)
    }

    /// Server-chosen parameters (TLS 1.2 ServerKeyExchange).
    pub fn custom(p: &[u8], g: &[u8]) -> Result<Self, TlsError> {
        let p = BigUint::from_bytes_be(p);
        let g = BigUint::from_bytes_be(g);
        let bits = p.bits() as usize;
        if bits < 1024 {
            return Err(TlsError::InsufficientSecurity(format!(
                "DH prime of {} bits",
                bits
            )));
        }
        let one = BigUint::from(1u32);
        if g <= one || g >= &p - &one {
            return Err(TlsError::IllegalParameter("DH generator out of range".into()));
        }
        Ok(Self {
            p,
            g,
            exponent_bits: (bits / 8).clamp(256, 512),
        })
    }

    /// Size of the prime in bytes.
    pub fn len(&self) -> usize {
        (self.p.bits() as usize).div_ceil(8)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prime, big-endian.
    pub fn prime(&self) -> Vec<u8> {
        self.p.to_bytes_be()
    }

    /// Generator, big-endian.
    pub fn generator(&self) -> Vec<u8> {
        self.g.to_bytes_be()
    }

    /// Fresh key pair.
    pub fn generate(&self) -> Result<DhKeyPair, TlsError> {
        let rng = SystemRandom::new();
        let mut bytes = Zeroizing::new(vec![0u8; self.exponent_bits / 8]);
        rng.fill(&mut bytes)
            .map_err(|_| TlsError::Internal("random generator failed".into()))?;
        // Top bit set so the exponent has the full size.
        bytes[0] |= 0x80;
        let private = BigUint::from_bytes_be(&bytes);
        let public = pad(&self.g.modpow(&private, &self.p), self.len());
        Ok(DhKeyPair {
            params: self.clone(),
            private,
            public,
        })
    }
}

/// Ephemeral DH key pair.
#[derive(Debug)]
pub struct DhKeyPair {
    params: DhParams,
    private: BigUint,
    public: Vec<u8>,
}

impl DhKeyPair {
    /// Public value, left-padded to the prime size.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Shared secret with `peer`.
    ///
    /// `padded` keeps leading zeros (TLS 1.3); TLS 1.2 strips them.
    pub fn agree(&self, peer: &[u8], padded: bool) -> Result<Zeroizing<Vec<u8>>, TlsError> {
        let y = BigUint::from_bytes_be(peer);
        let one = BigUint::from(1u32);
        if y <= one || y >= &self.params.p - &one {
            return Err(TlsError::IllegalParameter(
                "DH public value out of range".into(),
            ));
        }
        let z = y.modpow(&self.private, &self.params.p);
        let secret = if padded {
            pad(&z, self.params.len())
        } else {
            z.to_bytes_be()
        };
        Ok(Zeroizing::new(secret))
    }
}

impl Drop for DhKeyPair {
    fn drop(&mut self) {
        self.private = BigUint::default();
    }
}

fn pad(value: &BigUint, len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let mut out = vec![0u8; len.saturating_sub(raw.len())];
    out.extend_from_slice(&raw);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_groups_have_expected_sizes() {
        for bits in [2048, 3072, 4096, 6144, 8192] {
            let params = DhParams::ffdhe(bits).unwrap();
            assert_eq!(params.len(), bits / 8);
            let p = params.prime();
            assert!(p[..8].iter().all(|&b| b == 0xFF));
            assert!(p[p.len() - 8..].iter().all(|&b| b == 0xFF));
            assert_eq!(params.generator(), vec![2]);
        }
        assert!(DhParams::ffdhe(1024).is_none());
    }

    #[test]
    fn test_ffdhe2048_known_prefix() {
        let p = DhParams::ffdhe(2048).unwrap().prime();
        assert_eq!(
            &p[..16],
            &[
                0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xAD, 0xF8, 0x54, 0x58, 0xA2,
                0xBB, 0x4A, 0x9A
            ]
        );
    }

    #[test]
    fn test_agreement() {
        let params = DhParams::ffdhe(2048).unwrap();
        let a = params.generate().unwrap();
        let b = params.generate().unwrap();
        assert_eq!(a.public_key().len(), 256);
        let s1 = a.agree(b.public_key(), true).unwrap();
        let s2 = b.agree(a.public_key(), true).unwrap();
        assert_eq!(*s1, *s2);
        assert_eq!(s1.len(), 256);
    }

    #[test]
    fn test_degenerate_peer_values_rejected() {
        let params = DhParams::ffdhe(2048).unwrap();
        let a = params.generate().unwrap();
        assert!(a.agree(&[1], true).is_err());
        assert!(a.agree(&[0], true).is_err());
        let mut p_minus_one = params.prime();
        let last = p_minus_one.len() - 1;
        p_minus_one[last] -= 1;
        assert!(a.agree(&p_minus_one, true).is_err());
    }

    #[test]
    fn test_custom_params_validation() {
        assert!(DhParams::custom(&[0xFF; 64], &[2]).is_err());
        let p = DhParams::ffdhe(2048).unwrap().prime();
        assert!(DhParams::custom(&p, &[1]).is_err());
        let custom = DhParams::custom(&p, &[2]).unwrap();
        assert_eq!(&custom, DhParams::ffdhe(2048).unwrap());
    }
}
