// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Tests against public hosts. Run with `cargo test -- --ignored`.

use kutil::http::{HttpConnection, HttpRequest, HttpsConnection};
use kutil::tls::HandshakeState;
use std::sync::mpsc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(15);

#[test]
#[ignore = "needs internet access"]
fn http_get_example_com() {
    let (tx, rx) = mpsc::channel();
    let conn = HttpConnection::connect("example.com", 80, move |_, resp| {
        let _ = tx.send(resp);
    })
    .unwrap();
    conn.send(HttpRequest::get("/").with_header("Connection", "close"))
        .unwrap();
    let resp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(resp.status, 200);
    assert!(!resp.body.is_empty());
    conn.close();
}

#[test]
#[ignore = "needs internet access"]
fn https_handshake_google_com() {
    let (tx, rx) = mpsc::channel();
    let conn = HttpsConnection::connect(
        "google.com",
        443,
        move |_, resp| {
            let _ = tx.send(resp.status);
        },
        |conn| {
            let _ = conn.get("/");
        },
    )
    .unwrap();

    assert!(conn.wait_established(Some(TIMEOUT)));
    let status = conn.tls_status();
    assert_eq!(status.state, HandshakeState::ApplicationData);
    assert!(!status.peer_certificates.is_empty());
    assert!(status.verified);

    let code = rx.recv_timeout(TIMEOUT).unwrap();
    assert!((200..400).contains(&code));
    conn.close();
}
