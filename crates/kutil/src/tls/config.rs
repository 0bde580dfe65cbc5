// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS client configuration.
//!
//! # Example
//!
//! ```
//! use kutil::tls::{TlsConfig, TlsVersion};
//!
//! let config = TlsConfig::new("example.com")
//!     .with_min_version(TlsVersion::Tls13)
//!     .with_cipher_suites(vec![0x1301, 0x1303]);
//! assert!(config.validate().is_ok());
//! ```

use super::{CipherSuite, NamedGroup, RootStore, SignatureScheme, TlsVersion};
use std::sync::Arc;

/// Settings for one TLS client session.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    /// Host name sent in server_name and checked against the certificate
    pub server_name: String,

    /// Offered cipher suites, in preference order
    pub cipher_suites: Vec<u16>,

    /// supported_groups, in preference order
    pub groups: Vec<NamedGroup>,

    /// Groups a key share is generated for in the first ClientHello
    pub key_share_groups: Vec<NamedGroup>,

    pub min_version: TlsVersion,
    pub max_version: TlsVersion,

    /// signature_algorithms
    pub signature_schemes: Vec<SignatureScheme>,

    /// Verify the server chain and host name
    pub verify_certificates: bool,

    /// Trust anchors (None = bundled roots)
    pub root_store: Option<Arc<RootStore>>,

    /// Require the TLS 1.3 server to echo our legacy session id
    pub enforce_session_id_echo: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_name: String::new(),
            cipher_suites: CipherSuite::implemented().map(|s| s.id).collect(),
            groups: NamedGroup::SUPPORTED.to_vec(),
            key_share_groups: vec![NamedGroup::X25519, NamedGroup::Secp256r1],
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            signature_schemes: SignatureScheme::DEFAULT.to_vec(),
            verify_certificates: true,
            root_store: None,
            enforce_session_id_echo: true,
        }
    }
}

impl TlsConfig {
    /// Defaults for `server_name`.
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Self::default()
        }
    }

    /// Builder: set cipher suites
    pub fn with_cipher_suites(mut self, suites: Vec<u16>) -> Self {
        self.cipher_suites = suites;
        self
    }

    /// Builder: set supported groups
    pub fn with_groups(mut self, groups: Vec<NamedGroup>) -> Self {
        self.groups = groups;
        self
    }

    /// Builder: set the groups key shares are sent for
    pub fn with_key_share_groups(mut self, groups: Vec<NamedGroup>) -> Self {
        self.key_share_groups = groups;
        self
    }

    /// Builder: set minimum version
    pub fn with_min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Builder: set maximum version
    pub fn with_max_version(mut self, version: TlsVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Builder: set signature schemes
    pub fn with_signature_schemes(mut self, schemes: Vec<SignatureScheme>) -> Self {
        self.signature_schemes = schemes;
        self
    }

    /// Builder: enable or disable certificate verification
    pub fn with_verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    /// Builder: use a custom root store
    pub fn with_root_store(mut self, store: Arc<RootStore>) -> Self {
        self.root_store = Some(store);
        self
    }

    /// Builder: enforce session id echo
    pub fn with_session_id_echo(mut self, enforce: bool) -> Self {
        self.enforce_session_id_echo = enforce;
        self
    }

    /// Root store in effect.
    pub fn roots(&self) -> Arc<RootStore> {
        self.root_store.clone().unwrap_or_else(RootStore::bundled)
    }

    /// Offered suites usable with at least one version in range.
    pub fn offered_suites(&self) -> Vec<&'static CipherSuite> {
        self.cipher_suites
            .iter()
            .filter_map(|id| CipherSuite::from_id(*id))
            .filter(|s| s.implemented)
            .filter(|s| {
                TlsVersion::ALL
                    .iter()
                    .filter(|v| **v >= self.min_version && **v <= self.max_version)
                    .any(|v| s.usable_with(*v))
            })
            .collect()
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_version > self.max_version {
            return Err("min_version must be <= max_version");
        }
        if self.min_version < TlsVersion::Tls12 {
            return Err("only TLS 1.2 and TLS 1.3 can be negotiated");
        }
        if self.offered_suites().is_empty() {
            return Err("no implemented cipher suite for the version range");
        }
        if self.groups.is_empty() {
            return Err("groups must not be empty");
        }
        if self
            .key_share_groups
            .iter()
            .any(|g| !self.groups.contains(g))
        {
            return Err("key_share_groups must be a subset of groups");
        }
        if self.signature_schemes.is_empty() {
            return Err("signature_schemes must not be empty");
        }
        if self.verify_certificates && self.server_name.is_empty() {
            return Err("server_name is required when verifying certificates");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TlsConfig::new("example.com");
        assert_eq!(config.min_version, TlsVersion::Tls12);
        assert_eq!(config.max_version, TlsVersion::Tls13);
        assert!(config.enforce_session_id_echo);
        assert_eq!(config.offered_suites().len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_range_filters_suites() {
        let config = TlsConfig::new("example.com").with_max_version(TlsVersion::Tls12);
        assert!(config.offered_suites().iter().all(|s| !s.is_tls13()));
        let config = TlsConfig::new("example.com").with_min_version(TlsVersion::Tls13);
        assert_eq!(config.offered_suites().len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TlsConfig::default().validate().is_err());
        assert!(TlsConfig::default()
            .with_verify_certificates(false)
            .validate()
            .is_ok());
        assert!(TlsConfig::new("a")
            .with_min_version(TlsVersion::Tls13)
            .with_max_version(TlsVersion::Tls12)
            .validate()
            .is_err());
        assert!(TlsConfig::new("a")
            .with_cipher_suites(vec![0x002F])
            .validate()
            .is_err());
        assert!(TlsConfig::new("a")
            .with_groups(vec![NamedGroup::X25519])
            .with_key_share_groups(vec![NamedGroup::X448])
            .validate()
            .is_err());
    }
}
