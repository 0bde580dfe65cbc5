// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// A fake server answers the ClientHello with a TLS 1.2 ServerHello carrying
// the TLS 1.3 downgrade sentinel; the client must alert and close.

use kutil::http::HttpsConnection;
use kutil::protocol::ConnectionConfig;
use kutil::tls::handshake::DOWNGRADE_TLS12;
use kutil::tls::{HandshakeState, TlsConfig};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

fn read_record(stream: &mut std::net::TcpStream) -> Vec<u8> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).unwrap();
    let len = u16::from_be_bytes([header[3], header[4]]) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    let mut record = header.to_vec();
    record.extend(body);
    record
}

fn server_hello_record(random: [u8; 32]) -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&random);
    body.push(0); // empty session id
    body.extend_from_slice(&[0xC0, 0x2F]); // ECDHE_RSA_WITH_AES_128_GCM_SHA256
    body.push(0); // null compression
    body.extend_from_slice(&[0x00, 0x05, 0xFF, 0x01, 0x00, 0x01, 0x00]); // renegotiation_info

    let mut handshake = vec![0x02, 0x00];
    handshake.extend_from_slice(&(body.len() as u16).to_be_bytes());
    handshake.extend(body);

    let mut record = vec![0x16, 0x03, 0x03];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend(handshake);
    record
}

#[test]
fn downgrade_sentinel_triggers_illegal_parameter() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let fake = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let hello = read_record(&mut stream);
        assert_eq!(hello[0], 0x16);
        assert_eq!(hello[5], 0x01);

        let mut random = [0x5A; 32];
        random[24..].copy_from_slice(&DOWNGRADE_TLS12);
        assert_eq!(&random[24..], b"DOWNGRD\x01");
        stream.write_all(&server_hello_record(random)).unwrap();

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        rest
    });

    let client = HttpsConnection::connect_with(
        "localhost",
        port,
        TlsConfig::new("localhost"),
        ConnectionConfig::default(),
        |_, _| {},
        None,
    )
    .unwrap();

    assert!(!client.wait_established(Some(Duration::from_secs(5))));
    assert!(client.connection().wait_closed(Some(Duration::from_secs(5))));
    assert_eq!(client.tls_status().state, HandshakeState::Closed);

    let alert = fake.join().unwrap();
    assert_eq!(alert, vec![0x15, 0x03, 0x03, 0x00, 0x02, 0x02, 0x2f]);
}
