// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client handshake state machine.
//!
//! # TLS 1.2
//!
//! ```text
//! Init -> ClientHelloSent -> ServerHelloReceived
//!      -> (Certificate, ServerKeyExchange, CertificateRequest?) -> ServerHelloDone
//!      -> KeySent -> ChangeCipherSent -> FinishedSent
//!      -> ChangeCipherReceived -> (server Finished) -> ApplicationData
//! ```
//!
//! # TLS 1.3
//!
//! ```text
//! Init -> ClientHelloSent [-> HelloRetryRequest -> ClientHelloSent]
//!      -> ServerHelloReceived (handshake keys)
//!      -> (EncryptedExtensions, CertificateRequest?, Certificate,
//!          CertificateVerify, Finished) -> ServerHelloDone
//!      -> ChangeCipherSent -> FinishedSent -> ApplicationData
//! ```

use super::alert::codes as alert_code;
use super::extension::{ext_type, find, Extension, KeyShareEntry};
use super::ffdhe::DhParams;
use super::handshake::{
    Certificate, CertificateRequest, CertificateType, CertificateVerify, ClientHello,
    ClientKeyExchange, DecodeContext, Finished, HandshakeMessage, KeyUpdate, ServerHello,
    ServerKeyExchange, ServerKeyExchangeParams,
};
use super::keys::{self, KeySchedule13, Secret, Transcript};
use super::protect::RecordProtector;
use super::record::{content_type, HandshakeJoiner, RawHandshake, RawTlsRecord, TlsRecord, MAX_PLAINTEXT};
use super::verify::{self, SignatureScheme};
use super::{
    Alert, AlertLevel, CipherSuite, EphemeralKey, KeyExchange, NamedGroup, TlsConfig, TlsError,
    TlsVersion,
};
use crate::protocol::{LayerEvent, LayerLink};
use parking_lot::Mutex;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

// ============================================================================
// Public state
// ============================================================================

/// Client handshake state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    ClientHelloSent,
    ServerHelloReceived,
    ServerHelloDone,
    KeySent,
    ChangeCipherSent,
    FinishedSent,
    ChangeCipherReceived,
    ApplicationData,
    Closed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot of a session, shared with observers.
#[derive(Clone, Debug)]
pub struct TlsStatus {
    pub state: HandshakeState,
    pub version: Option<TlsVersion>,
    pub cipher_suite: Option<&'static CipherSuite>,
    /// Server chain as received, leaf first
    pub peer_certificates: Vec<Vec<u8>>,
    /// Chain verified against the root store
    pub verified: bool,
    pub alert_sent: Option<Alert>,
    pub alert_received: Option<Alert>,
}

impl Default for TlsStatus {
    fn default() -> Self {
        Self {
            state: HandshakeState::Init,
            version: None,
            cipher_suite: None,
            peer_certificates: Vec::new(),
            verified: false,
            alert_sent: None,
            alert_received: None,
        }
    }
}

impl TlsStatus {
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::ApplicationData
    }
}

/// Next message the session accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    ServerHello,
    EncryptedExtensions,
    CertificateOrRequest,
    Certificate,
    CertificateVerify,
    Certificate12,
    ServerKeyExchange,
    RequestOrDone,
    ChangeCipherSpec,
    Finished,
    Traffic,
    Nothing,
}

fn random32() -> Result<[u8; 32], TlsError> {
    let mut out = [0u8; 32];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| TlsError::Internal("random generator failed".into()))?;
    Ok(out)
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unexpected(what: &str, expect: Expect) -> TlsError {
    TlsError::UnexpectedMessage(format!("{} while expecting {:?}", what, expect))
}

// ============================================================================
// Session
// ============================================================================

/// One client session: handshake progress, keys and record protection.
pub struct ClientSession {
    config: TlsConfig,
    status: Arc<Mutex<TlsStatus>>,
    state: HandshakeState,
    expect: Expect,
    version: Option<TlsVersion>,
    suite: Option<&'static CipherSuite>,
    client_random: [u8; 32],
    server_random: [u8; 32],
    session_id: Vec<u8>,
    key_shares: Vec<EphemeralKey>,
    cookie: Option<Vec<u8>>,
    retry_suite: Option<u16>,
    transcript: Transcript,
    joiner: HandshakeJoiner,
    chain: Vec<Vec<u8>>,
    /// Set when the server asked for a client certificate
    cert_request: Option<Vec<u8>>,
    schedule: Option<KeySchedule13>,
    client_secret: Option<Secret>,
    server_secret: Option<Secret>,
    pre_master: Option<Secret>,
    client_public: Option<Vec<u8>>,
    master: Option<Secret>,
    pending_read: Option<RecordProtector>,
    read: Option<RecordProtector>,
    write: Option<RecordProtector>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("server_name", &self.config.server_name)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("suite", &self.suite.map(|s| s.name))
            .finish()
    }
}

impl ClientSession {
    pub fn new(config: TlsConfig) -> Result<Self, TlsError> {
        config
            .validate()
            .map_err(|e| TlsError::Internal(format!("invalid TLS config: {}", e)))?;
        Ok(Self {
            config,
            status: Arc::new(Mutex::new(TlsStatus::default())),
            state: HandshakeState::Init,
            expect: Expect::Nothing,
            version: None,
            suite: None,
            client_random: [0; 32],
            server_random: [0; 32],
            session_id: Vec::new(),
            key_shares: Vec::new(),
            cookie: None,
            retry_suite: None,
            transcript: Transcript::default(),
            joiner: HandshakeJoiner::default(),
            chain: Vec::new(),
            cert_request: None,
            schedule: None,
            client_secret: None,
            server_secret: None,
            pre_master: None,
            client_public: None,
            master: None,
            pending_read: None,
            read: None,
            write: None,
        })
    }

    pub fn status(&self) -> Arc<Mutex<TlsStatus>> {
        Arc::clone(&self.status)
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn version(&self) -> Option<TlsVersion> {
        self.version
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::ApplicationData
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    fn set_state(&mut self, next: HandshakeState) {
        log::debug!(
            "[tls] {} state {} -> {}",
            self.config.server_name,
            self.state,
            next
        );
        self.state = next;
        self.status.lock().state = next;
    }

    fn suite(&self) -> Result<&'static CipherSuite, TlsError> {
        self.suite
            .ok_or_else(|| TlsError::Internal("no cipher suite negotiated".into()))
    }

    fn negotiated(&self) -> Result<TlsVersion, TlsError> {
        self.version
            .ok_or_else(|| TlsError::Internal("no version negotiated".into()))
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    fn record_version(&self) -> u16 {
        // ClientHello goes out as TLS 1.0 for old middleboxes
        self.version.map_or(0x0301, TlsVersion::legacy_wire)
    }

    /// Frame (and protect when a write key is active) a payload of type `ty`.
    pub fn frame(&mut self, ty: u8, payload: &[u8]) -> Result<Vec<u8>, TlsError> {
        let version = self.record_version();
        let mut out = Vec::with_capacity(payload.len() + 64);
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(MAX_PLAINTEXT).collect()
        };
        for chunk in chunks {
            let record = match &mut self.write {
                Some(protector) if ty != content_type::CHANGE_CIPHER_SPEC => {
                    protector.seal(ty, chunk)?
                }
                _ => RawTlsRecord::new(ty, version, chunk.to_vec()),
            };
            out.extend_from_slice(&record.to_bytes());
        }
        Ok(out)
    }

    fn send_handshake(&mut self, raw: &RawHandshake, link: &mut LayerLink) -> Result<(), TlsError> {
        self.transcript.add(raw);
        let bytes = self.frame(content_type::HANDSHAKE, &raw.encode())?;
        link.send_raw(bytes);
        Ok(())
    }

    fn send_change_cipher_spec(&mut self, link: &mut LayerLink) -> Result<(), TlsError> {
        let bytes = self.frame(content_type::CHANGE_CIPHER_SPEC, &[1])?;
        link.send_raw(bytes);
        Ok(())
    }

    fn send_alert(&mut self, alert: Alert, link: &mut LayerLink) -> Result<(), TlsError> {
        if alert.level == AlertLevel::Fatal {
            log::warn!("[tls] {} sending alert {}", self.config.server_name, alert);
        } else {
            log::debug!("[tls] {} sending alert {}", self.config.server_name, alert);
        }
        let bytes = self.frame(content_type::ALERT, &alert.to_bytes())?;
        link.send_raw(bytes);
        self.status.lock().alert_sent = Some(alert);
        Ok(())
    }

    /// Read one record and remove its protection.
    pub fn read_record(
        &mut self,
        input: &mut dyn crate::buffer::ByteBuffer,
    ) -> crate::protocol::UnpackResult<(u8, Vec<u8>)> {
        let (mac_len, padding) = match (&self.read, self.suite) {
            (Some(_), Some(suite)) => (suite.mac.len(), suite.is_block()),
            _ => (0, false),
        };
        let record = RawTlsRecord::read(input, mac_len, padding)?;
        let tls13 = self.version == Some(TlsVersion::Tls13);
        let passthrough = record.content_type == content_type::CHANGE_CIPHER_SPEC
            || (tls13 && record.content_type == content_type::ALERT);
        let (ty, data) = match &mut self.read {
            Some(protector) if !passthrough => protector.open(record)?,
            _ => (record.content_type, record.payload),
        };
        if data.len() > MAX_PLAINTEXT {
            return Err(TlsError::RecordOverflow(data.len()).into());
        }
        if self.joiner.is_partial() && ty != content_type::HANDSHAKE {
            return Err(TlsError::UnexpectedMessage(
                "record interleaved with a fragmented handshake message".into(),
            )
            .into());
        }
        Ok((ty, data))
    }

    /// Feed a handshake fragment; complete messages come back.
    pub fn push_handshake(&mut self, fragment: &[u8]) -> Result<Vec<RawHandshake>, TlsError> {
        self.joiner.push(fragment);
        self.joiner.drain()
    }

    // ------------------------------------------------------------------------
    // ClientHello
    // ------------------------------------------------------------------------

    /// Send the first ClientHello.
    pub fn start(&mut self, link: &mut LayerLink) -> Result<(), TlsError> {
        if self.state != HandshakeState::Init {
            return Err(TlsError::Internal("handshake already started".into()));
        }
        self.client_random = random32()?;
        if self.config.max_version == TlsVersion::Tls13 {
            self.session_id = random32()?.to_vec();
            for group in self.config.key_share_groups.clone() {
                self.key_shares.push(EphemeralKey::generate(group)?);
            }
        }
        self.send_client_hello(link)?;
        self.expect = Expect::ServerHello;
        self.set_state(HandshakeState::ClientHelloSent);
        Ok(())
    }

    fn send_client_hello(&mut self, link: &mut LayerLink) -> Result<(), TlsError> {
        let config = &self.config;
        let mut extensions = Vec::new();
        if !config.server_name.is_empty()
            && config.server_name.parse::<std::net::IpAddr>().is_err()
        {
            extensions.push(Extension::ServerName(Some(config.server_name.clone())));
        }
        extensions.push(Extension::SupportedGroups(config.groups.clone()));
        extensions.push(Extension::EcPointFormats(vec![0]));
        extensions.push(Extension::SignatureAlgorithms(config.signature_schemes.clone()));
        if config.max_version == TlsVersion::Tls13 {
            let versions = TlsVersion::ALL
                .iter()
                .rev()
                .filter(|v| **v >= config.min_version && **v <= config.max_version)
                .map(|v| v.wire())
                .collect();
            extensions.push(Extension::SupportedVersions(versions));
            extensions.push(Extension::KeyShares(
                self.key_shares
                    .iter()
                    .map(|k| KeyShareEntry {
                        group: k.group(),
                        key_exchange: k.public_key().to_vec(),
                    })
                    .collect(),
            ));
        }
        if let Some(cookie) = &self.cookie {
            extensions.push(Extension::Cookie(cookie.clone()));
        }
        extensions.push(Extension::RenegotiationInfo(Vec::new()));

        let hello = ClientHello {
            legacy_version: config.max_version.legacy_wire(),
            random: self.client_random,
            session_id: self.session_id.clone(),
            cipher_suites: config.offered_suites().iter().map(|s| s.id).collect(),
            compression_methods: vec![0],
            extensions,
        };
        log::debug!(
            "[tls] {} ClientHello: {} suites, {} key shares",
            config.server_name,
            hello.cipher_suites.len(),
            self.key_shares.len()
        );
        self.send_handshake(&hello.encode(), link)
    }

    // ------------------------------------------------------------------------
    // Incoming records
    // ------------------------------------------------------------------------

    /// Handle a control record the layer stopped on.
    pub fn handle(&mut self, record: TlsRecord, link: &mut LayerLink) -> Result<(), TlsError> {
        match record {
            TlsRecord::Alert(alert) => self.on_alert(alert, link),
            TlsRecord::ChangeCipherSpec => self.on_change_cipher_spec(),
            TlsRecord::Heartbeat(data) => {
                log::debug!("[tls] ignoring heartbeat of {} bytes", data.len());
                Ok(())
            }
            TlsRecord::Application(_) => Err(TlsError::UnexpectedMessage(
                "application data outside the record layer".into(),
            )),
            TlsRecord::Handshake(msgs) => {
                for raw in msgs {
                    if self.state == HandshakeState::Closed {
                        break;
                    }
                    self.on_handshake(raw, link)?;
                }
                Ok(())
            }
        }
    }

    fn on_alert(&mut self, alert: Alert, link: &mut LayerLink) -> Result<(), TlsError> {
        self.status.lock().alert_received = Some(alert);
        if alert.code == alert_code::CLOSE_NOTIFY {
            log::debug!("[tls] {} peer sent close_notify", self.config.server_name);
            if self.state != HandshakeState::Closed {
                self.send_alert(Alert::close_notify(), link)?;
                self.set_state(HandshakeState::Closed);
            }
            link.request_close();
            return Ok(());
        }
        if alert.is_fatal(self.version) {
            log::warn!("[tls] {} received alert {}", self.config.server_name, alert);
            self.set_state(HandshakeState::Closed);
            return Err(TlsError::AlertReceived(alert));
        }
        log::debug!("[tls] {} received alert {}", self.config.server_name, alert);
        Ok(())
    }

    fn on_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        if self.version == Some(TlsVersion::Tls13) {
            // middlebox compatibility record
            if self.state == HandshakeState::ApplicationData {
                return Err(TlsError::UnexpectedMessage(
                    "change_cipher_spec after the handshake".into(),
                ));
            }
            return Ok(());
        }
        if self.expect != Expect::ChangeCipherSpec {
            return Err(unexpected("ChangeCipherSpec", self.expect));
        }
        self.read = self.pending_read.take();
        if self.read.is_none() {
            return Err(TlsError::Internal("no pending read keys".into()));
        }
        self.expect = Expect::Finished;
        self.set_state(HandshakeState::ChangeCipherReceived);
        Ok(())
    }

    fn on_handshake(&mut self, raw: RawHandshake, link: &mut LayerLink) -> Result<(), TlsError> {
        let ctx = DecodeContext {
            version: self.version.unwrap_or(TlsVersion::Tls12),
            kx: self.suite.map(|s| s.kx),
            cert_type: CertificateType::X509,
        };
        let msg = HandshakeMessage::parse(&raw, &ctx)?;
        log::debug!(
            "[tls] {} received {} ({} bytes)",
            self.config.server_name,
            msg.name(),
            raw.body.len()
        );
        let tls13 = self.version == Some(TlsVersion::Tls13);

        match (msg, self.expect) {
            (HandshakeMessage::HelloRequest, _) => {
                if self.state == HandshakeState::ApplicationData && !tls13 {
                    let alert = Alert::new(AlertLevel::Warning, alert_code::NO_RENEGOTIATION)?;
                    self.send_alert(alert, link)?;
                }
                Ok(())
            }
            (HandshakeMessage::ServerHello(sh), Expect::ServerHello) => {
                if sh.is_hello_retry_request() {
                    self.on_hello_retry(sh, raw, link)
                } else {
                    self.on_server_hello(sh, raw)
                }
            }

            // ---- TLS 1.3 ----
            (HandshakeMessage::EncryptedExtensions(_), Expect::EncryptedExtensions) => {
                self.transcript.add(&raw);
                self.expect = Expect::CertificateOrRequest;
                Ok(())
            }
            (HandshakeMessage::CertificateRequest(req), Expect::CertificateOrRequest) => {
                self.on_certificate_request(req, raw)
            }
            (HandshakeMessage::Certificate(cert), Expect::CertificateOrRequest | Expect::Certificate) => {
                self.on_certificate(cert, raw)?;
                self.expect = Expect::CertificateVerify;
                Ok(())
            }
            (HandshakeMessage::CertificateVerify(cv), Expect::CertificateVerify) => {
                self.on_certificate_verify(cv, raw)
            }
            (HandshakeMessage::Finished(fin), Expect::Finished) if tls13 => {
                self.on_finished13(fin, raw, link)
            }
            (HandshakeMessage::NewSessionTicket, Expect::Traffic) if tls13 => {
                log::debug!("[tls] ignoring NewSessionTicket");
                Ok(())
            }
            (HandshakeMessage::KeyUpdate(update), Expect::Traffic) if tls13 => {
                self.on_key_update(update, link)
            }

            // ---- TLS 1.2 ----
            (HandshakeMessage::Certificate(cert), Expect::Certificate12) => {
                self.on_certificate(cert, raw)?;
                self.expect = match self.suite()?.kx {
                    KeyExchange::Ecdhe | KeyExchange::Dhe => Expect::ServerKeyExchange,
                    _ => Expect::RequestOrDone,
                };
                Ok(())
            }
            (HandshakeMessage::ServerKeyExchange(ske), Expect::ServerKeyExchange) => {
                self.on_server_key_exchange(ske, raw)
            }
            (HandshakeMessage::CertificateRequest(req), Expect::RequestOrDone) => {
                self.on_certificate_request(req, raw)
            }
            (HandshakeMessage::ServerHelloDone, Expect::RequestOrDone) => {
                self.on_server_hello_done(raw, link)
            }
            (HandshakeMessage::NewSessionTicket, Expect::ChangeCipherSpec) => {
                self.transcript.add(&raw);
                Ok(())
            }
            (HandshakeMessage::Finished(fin), Expect::Finished) => self.on_finished12(fin, raw, link),

            (msg, expect) => Err(unexpected(msg.name(), expect)),
        }
    }

    // ------------------------------------------------------------------------
    // Hellos
    // ------------------------------------------------------------------------

    fn check_suite(&self, id: u16, version: TlsVersion) -> Result<&'static CipherSuite, TlsError> {
        self.config
            .offered_suites()
            .into_iter()
            .find(|s| s.id == id && s.usable_with(version))
            .ok_or_else(|| {
                TlsError::IllegalParameter(format!("cipher suite 0x{:04x} was not offered", id))
            })
    }

    fn check_session_id(&self, echoed: &[u8], version: TlsVersion) -> Result<(), TlsError> {
        if echoed == self.session_id.as_slice() {
            return Ok(());
        }
        if version == TlsVersion::Tls13 && self.config.enforce_session_id_echo {
            return Err(TlsError::IllegalParameter(
                "legacy_session_id not echoed".into(),
            ));
        }
        log::debug!("[tls] server issued session id of {} bytes", echoed.len());
        Ok(())
    }

    fn on_hello_retry(
        &mut self,
        hrr: ServerHello,
        raw: RawHandshake,
        link: &mut LayerLink,
    ) -> Result<(), TlsError> {
        if self.retry_suite.is_some() {
            return Err(TlsError::UnexpectedMessage("second HelloRetryRequest".into()));
        }
        if hrr.selected_version() != TlsVersion::Tls13.wire() {
            return Err(TlsError::IllegalParameter(
                "HelloRetryRequest without TLS 1.3".into(),
            ));
        }
        let suite = self.check_suite(hrr.cipher_suite, TlsVersion::Tls13)?;
        self.check_session_id(&hrr.session_id, TlsVersion::Tls13)?;

        let requested = match find(&hrr.extensions, ext_type::KEY_SHARE) {
            Some(Extension::KeyShareRequest(group)) => Some(*group),
            _ => None,
        };
        let cookie = match find(&hrr.extensions, ext_type::COOKIE) {
            Some(Extension::Cookie(c)) => Some(c.clone()),
            _ => None,
        };
        if requested.is_none() && cookie.is_none() {
            return Err(TlsError::IllegalParameter(
                "HelloRetryRequest changes nothing".into(),
            ));
        }
        if let Some(group) = requested {
            if !self.config.groups.contains(&group)
                || self.key_shares.iter().any(|k| k.group() == group)
            {
                return Err(TlsError::IllegalParameter(format!(
                    "HelloRetryRequest for group {}",
                    group
                )));
            }
            log::debug!("[tls] server asks for a {} key share", group);
            self.key_shares = vec![EphemeralKey::generate(group)?];
        }
        self.cookie = cookie;
        self.retry_suite = Some(suite.id);

        self.transcript.replace_with_message_hash(suite.hash);
        self.transcript.add(&raw);
        self.send_client_hello(link)
    }

    fn on_server_hello(&mut self, sh: ServerHello, raw: RawHandshake) -> Result<(), TlsError> {
        let selected = sh.selected_version();
        let has_versions_ext = find(&sh.extensions, ext_type::SUPPORTED_VERSIONS).is_some();
        if has_versions_ext && selected != TlsVersion::Tls13.wire() {
            return Err(TlsError::IllegalParameter(format!(
                "supported_versions selected 0x{:04x}",
                selected
            )));
        }
        let version = TlsVersion::from_wire(selected)
            .filter(|v| *v >= self.config.min_version && *v <= self.config.max_version)
            .filter(|v| *v != TlsVersion::Tls13 || has_versions_ext)
            .ok_or(TlsError::ProtocolVersion(selected))?;
        self.version = Some(version);
        self.status.lock().version = Some(version);

        if version < self.config.max_version && sh.downgrade_marker().is_some() {
            return Err(TlsError::IllegalParameter(
                "downgrade marker in ServerHello.random".into(),
            ));
        }
        let suite = self.check_suite(sh.cipher_suite, version)?;
        if self.retry_suite.is_some_and(|id| id != suite.id) {
            return Err(TlsError::IllegalParameter(
                "cipher suite differs from HelloRetryRequest".into(),
            ));
        }
        if sh.compression_method != 0 {
            return Err(TlsError::IllegalParameter("compression method".into()));
        }
        self.check_session_id(&sh.session_id, version)?;

        log::debug!(
            "[tls] {} negotiated {} with {}",
            self.config.server_name,
            version,
            suite
        );
        self.suite = Some(suite);
        self.status.lock().cipher_suite = Some(suite);
        self.server_random = sh.random;
        self.transcript.add(&raw);

        if version == TlsVersion::Tls13 {
            let share = match find(&sh.extensions, ext_type::KEY_SHARE) {
                Some(Extension::KeyShare(entry)) => entry.clone(),
                _ => return Err(TlsError::IllegalParameter("ServerHello without key_share".into())),
            };
            let key = self
                .key_shares
                .iter_mut()
                .find(|k| k.group() == share.group)
                .ok_or_else(|| {
                    TlsError::IllegalParameter(format!("key share for unoffered {}", share.group))
                })?;
            let shared = key.agree(&share.key_exchange)?;
            self.key_shares.clear();

            let schedule = KeySchedule13::new(suite.hash, &shared);
            let secrets = schedule.handshake_traffic(&self.transcript.hash(suite.hash));
            self.read = Some(RecordProtector::new(
                suite,
                &keys::traffic_keys(suite, &secrets.server),
                version,
            )?);
            self.write = Some(RecordProtector::new(
                suite,
                &keys::traffic_keys(suite, &secrets.client),
                version,
            )?);
            self.client_secret = Some(secrets.client);
            self.server_secret = Some(secrets.server);
            self.schedule = Some(schedule);
            self.expect = Expect::EncryptedExtensions;
        } else {
            if find(&sh.extensions, ext_type::RENEGOTIATION_INFO).is_none() {
                log::debug!("[tls] server does not support secure renegotiation");
            }
            self.key_shares.clear();
            self.expect = if suite.is_anonymous() {
                Expect::ServerKeyExchange
            } else {
                Expect::Certificate12
            };
        }
        self.set_state(HandshakeState::ServerHelloReceived);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    fn on_certificate_request(
        &mut self,
        req: CertificateRequest,
        raw: RawHandshake,
    ) -> Result<(), TlsError> {
        log::debug!(
            "[tls] server requests a client certificate ({} schemes)",
            req.schemes.len()
        );
        self.cert_request = Some(req.context);
        self.transcript.add(&raw);
        if self.version == Some(TlsVersion::Tls13) {
            self.expect = Expect::Certificate;
        }
        Ok(())
    }

    fn on_certificate(&mut self, cert: Certificate, raw: RawHandshake) -> Result<(), TlsError> {
        let version = self.negotiated()?;
        self.transcript.add(&raw);
        let chain = cert.chain();
        if chain.is_empty() {
            return Err(TlsError::MissingCertificate(version));
        }
        let verified = if self.config.verify_certificates {
            let roots = self.config.roots();
            match verify::verify_chain(&roots, &chain, &self.config.server_name, SystemTime::now()) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!(
                        "[tls] {} certificate rejected: {} ({})",
                        self.config.server_name,
                        e,
                        verify::describe(&chain[0])
                    );
                    return Err(e);
                }
            }
        } else {
            log::warn!(
                "[tls] {} certificate verification disabled: {}",
                self.config.server_name,
                verify::describe(&chain[0])
            );
            false
        };
        {
            let mut status = self.status.lock();
            status.peer_certificates = chain.clone();
            status.verified = verified;
        }
        self.chain = chain;
        Ok(())
    }

    fn check_scheme(&self, scheme: SignatureScheme) -> Result<(), TlsError> {
        if !self.config.signature_schemes.contains(&scheme) {
            return Err(TlsError::IllegalParameter(format!(
                "signature scheme {} was not offered",
                scheme
            )));
        }
        Ok(())
    }

    fn on_certificate_verify(
        &mut self,
        cv: CertificateVerify,
        raw: RawHandshake,
    ) -> Result<(), TlsError> {
        let suite = self.suite()?;
        self.check_scheme(cv.scheme)?;
        if !cv.scheme.allowed_in_tls13() {
            return Err(TlsError::IllegalParameter(format!(
                "{} not allowed in TLS 1.3",
                cv.scheme
            )));
        }
        let content = CertificateVerify::server_signed_content(&self.transcript.hash(suite.hash));
        let leaf = self
            .chain
            .first()
            .ok_or(TlsError::MissingCertificate(TlsVersion::Tls13))?;
        verify::verify_signature(leaf, cv.scheme, &content, &cv.signature)?;
        self.transcript.add(&raw);
        self.expect = Expect::Finished;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // TLS 1.3 finish
    // ------------------------------------------------------------------------

    fn on_finished13(
        &mut self,
        fin: Finished,
        raw: RawHandshake,
        link: &mut LayerLink,
    ) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let hash = suite.hash;
        let server_hs = self
            .server_secret
            .take()
            .ok_or_else(|| TlsError::Internal("no server handshake secret".into()))?;
        let expected = keys::finished_verify_data(hash, &server_hs, &self.transcript.hash(hash));
        if !ct_eq(&expected, &fin.verify_data) {
            return Err(TlsError::DecryptError("server Finished mismatch".into()));
        }
        self.transcript.add(&raw);
        self.set_state(HandshakeState::ServerHelloDone);

        let schedule = self
            .schedule
            .take()
            .ok_or_else(|| TlsError::Internal("no key schedule".into()))?;
        let app = schedule.application_traffic(&self.transcript.hash(hash));

        self.send_change_cipher_spec(link)?;
        self.set_state(HandshakeState::ChangeCipherSent);

        if let Some(context) = self.cert_request.take() {
            log::debug!("[tls] no client certificate available, sending an empty one");
            let empty = Certificate::empty(context).encode(TlsVersion::Tls13);
            self.send_handshake(&empty, link)?;
        }
        let client_hs = self
            .client_secret
            .take()
            .ok_or_else(|| TlsError::Internal("no client handshake secret".into()))?;
        let verify_data = keys::finished_verify_data(hash, &client_hs, &self.transcript.hash(hash));
        self.send_handshake(&Finished { verify_data }.encode(), link)?;
        self.set_state(HandshakeState::FinishedSent);

        let version = TlsVersion::Tls13;
        self.read = Some(RecordProtector::new(suite, &keys::traffic_keys(suite, &app.server), version)?);
        self.write = Some(RecordProtector::new(suite, &keys::traffic_keys(suite, &app.client), version)?);
        self.client_secret = Some(app.client);
        self.server_secret = Some(app.server);
        self.establish(link);
        Ok(())
    }

    fn on_key_update(&mut self, update: KeyUpdate, link: &mut LayerLink) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let server = self
            .server_secret
            .take()
            .ok_or_else(|| TlsError::Internal("no server traffic secret".into()))?;
        let next = keys::next_traffic_secret(suite.hash, &server);
        self.read = Some(RecordProtector::new(suite, &keys::traffic_keys(suite, &next), TlsVersion::Tls13)?);
        self.server_secret = Some(next);
        log::debug!("[tls] read keys updated");

        if update == KeyUpdate::Requested {
            let raw = KeyUpdate::NotRequested.encode();
            let bytes = self.frame(content_type::HANDSHAKE, &raw.encode())?;
            link.send_raw(bytes);
            let client = self
                .client_secret
                .take()
                .ok_or_else(|| TlsError::Internal("no client traffic secret".into()))?;
            let next = keys::next_traffic_secret(suite.hash, &client);
            self.write = Some(RecordProtector::new(suite, &keys::traffic_keys(suite, &next), TlsVersion::Tls13)?);
            self.client_secret = Some(next);
            log::debug!("[tls] write keys updated");
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // TLS 1.2 key exchange and finish
    // ------------------------------------------------------------------------

    fn on_server_key_exchange(
        &mut self,
        ske: ServerKeyExchange,
        raw: RawHandshake,
    ) -> Result<(), TlsError> {
        let suite = self.suite()?;
        if !suite.is_anonymous() {
            let scheme = ske
                .scheme
                .ok_or_else(|| TlsError::Decode("ServerKeyExchange without scheme".into()))?;
            self.check_scheme(scheme)?;
            let leaf = self
                .chain
                .first()
                .ok_or(TlsError::MissingCertificate(self.negotiated()?))?;
            let message = ske.signed_message(&self.client_random, &self.server_random);
            verify::verify_signature(leaf, scheme, &message, &ske.signature)?;
        }

        let (mut key, peer) = match ske.params {
            ServerKeyExchangeParams::Ecdhe { group, public } => {
                if !self.config.groups.contains(&group) || group.is_ffdhe() {
                    return Err(TlsError::IllegalParameter(format!(
                        "server chose curve {}",
                        group
                    )));
                }
                (EphemeralKey::generate(group)?, public)
            }
            ServerKeyExchangeParams::Dhe { p, g, ys } => {
                let params = DhParams::custom(&p, &g)?;
                let group = NamedGroup::SUPPORTED
                    .into_iter()
                    .find(|n| n.ffdhe_params().is_some_and(|d| d.prime() == p))
                    .unwrap_or(NamedGroup::Unknown(0));
                (EphemeralKey::generate_dh(group, &params)?, ys)
            }
        };
        log::debug!("[tls] server key exchange over {}", key.group());
        self.pre_master = Some(key.agree(&peer)?);
        self.client_public = Some(key.public_key().to_vec());
        self.transcript.add(&raw);
        self.expect = Expect::RequestOrDone;
        Ok(())
    }

    fn on_server_hello_done(&mut self, raw: RawHandshake, link: &mut LayerLink) -> Result<(), TlsError> {
        let version = self.negotiated()?;
        let suite = self.suite()?;
        self.transcript.add(&raw);
        self.set_state(HandshakeState::ServerHelloDone);

        if self.cert_request.take().is_some() {
            log::debug!("[tls] no client certificate available, sending an empty one");
            self.send_handshake(&Certificate::empty(Vec::new()).encode(version), link)?;
        }

        let public = self
            .client_public
            .take()
            .ok_or_else(|| TlsError::UnexpectedMessage("ServerHelloDone before key exchange".into()))?;
        let cke = match suite.kx {
            KeyExchange::Ecdhe | KeyExchange::EcdhAnon => ClientKeyExchange::Ecdh(public),
            KeyExchange::Dhe | KeyExchange::DhAnon => ClientKeyExchange::Dh(public),
            other => {
                return Err(TlsError::HandshakeFailure(format!(
                    "{:?} key exchange not supported",
                    other
                )))
            }
        };
        self.send_handshake(&cke.encode(version), link)?;
        self.set_state(HandshakeState::KeySent);

        let pre_master = self
            .pre_master
            .take()
            .ok_or_else(|| TlsError::Internal("no premaster secret".into()))?;
        let master = keys::master_secret(suite.hash, &pre_master, &self.client_random, &self.server_random);
        let block = keys::key_block(suite, &master, &self.client_random, &self.server_random);
        self.pending_read = Some(RecordProtector::new(suite, &block.server, version)?);

        self.send_change_cipher_spec(link)?;
        self.write = Some(RecordProtector::new(suite, &block.client, version)?);
        self.set_state(HandshakeState::ChangeCipherSent);

        let verify_data = keys::verify_data12(
            suite.hash,
            &master,
            "client finished",
            &self.transcript.hash(suite.hash),
        );
        self.master = Some(master);
        self.send_handshake(&Finished { verify_data }.encode(), link)?;
        self.expect = Expect::ChangeCipherSpec;
        self.set_state(HandshakeState::FinishedSent);
        Ok(())
    }

    fn on_finished12(
        &mut self,
        fin: Finished,
        raw: RawHandshake,
        link: &mut LayerLink,
    ) -> Result<(), TlsError> {
        let suite = self.suite()?;
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| TlsError::Internal("no master secret".into()))?;
        let expected = keys::verify_data12(
            suite.hash,
            master,
            "server finished",
            &self.transcript.hash(suite.hash),
        );
        if !ct_eq(&expected, &fin.verify_data) {
            return Err(TlsError::DecryptError("server Finished mismatch".into()));
        }
        self.transcript.add(&raw);
        self.establish(link);
        Ok(())
    }

    fn establish(&mut self, link: &mut LayerLink) {
        self.expect = Expect::Traffic;
        self.set_state(HandshakeState::ApplicationData);
        log::info!(
            "[tls] {} established ({}, {})",
            self.config.server_name,
            self.version.map_or_else(|| "?".to_string(), |v| v.to_string()),
            self.suite.map_or("?", |s| s.name)
        );
        link.emit(LayerEvent::Established);
    }

    /// Tell the peer why the session is failing, then stop.
    pub fn fail(&mut self, code: Option<u8>, link: &mut LayerLink) {
        if self.state == HandshakeState::Closed {
            return;
        }
        if let Some(code) = code {
            let alert = Alert::fatal(code);
            if let Err(e) = self.send_alert(alert, link) {
                log::debug!("[tls] could not send alert {}: {}", alert, e);
            }
        }
        self.set_state(HandshakeState::Closed);
    }
}
