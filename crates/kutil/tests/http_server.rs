// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Local HTTP server: routing, error answers, client round trips.

mod common;

use common::{connect, contains, exchange, read_response, read_until, TIMEOUT};
use kutil::http::{
    HttpConnection, HttpRequest, HttpResponse, HttpServer, Message, Method, ServerConfig,
    MAX_HEAD,
};
use kutil::protocol::ConnectionConfig;
use std::io::Write;
use std::sync::mpsc;

const TEST_PAGE: &str = "<html><body><script>new WebSocket('ws://' + location.host + '/ws')</script></body></html>";

fn route(req: &HttpRequest) -> HttpResponse {
    match req.path() {
        "/" => HttpResponse::html("<h1>KUtil</h1>"),
        "/test-ws" => HttpResponse::html(TEST_PAGE),
        "/ws" => HttpResponse::with_status(405),
        "/echo" => HttpResponse::with_status(200).with_body(req.body.clone()),
        _ => HttpResponse::with_status(404),
    }
}

fn start_server() -> HttpServer {
    let mut server = HttpServer::bind("127.0.0.1:0", |conn| {
        conn.on_data(|conn, msg| {
            if let Message::Request(req) = msg {
                let _ = conn.send_response(route(&req));
            }
        });
    })
    .unwrap();
    server.listen().unwrap();
    server
}

#[test]
fn serves_routes() {
    let server = start_server();
    let addr = server.local_addr();

    let resp = exchange(addr, b"GET / HTTP/1.1\r\nHost: local\r\n\r\n");
    assert_eq!(resp.status, 200);
    assert!(resp.headers.get("content-type").unwrap().starts_with("text/html"));
    assert_eq!(resp.headers.get("server"), Some("KUtil"));
    assert_eq!(resp.body.text(), "<h1>KUtil</h1>");

    let resp = exchange(addr, b"GET /test-ws HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 200);
    assert!(resp.body.text().contains("WebSocket"));

    let resp = exchange(addr, b"GET /ws HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 405);
    assert_eq!(resp.reason, "Method not Allowed");
}

#[test]
fn keeps_connection_for_pipelined_requests() {
    let server = start_server();
    let mut stream = connect(server.local_addr());
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /nope HTTP/1.1\r\n\r\n")
        .unwrap();
    let first = read_response(&mut stream, Method::Post);
    assert_eq!(first.body.text(), "hello");
    let second = read_response(&mut stream, Method::Get);
    assert_eq!(second.status, 404);
}

#[test]
fn answers_head_without_body() {
    let server = start_server();
    let mut stream = connect(server.local_addr());
    stream.write_all(b"HEAD / HTTP/1.1\r\n\r\n").unwrap();
    let resp = read_response(&mut stream, Method::Head);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers.get("content-length"), Some("14"));
    assert!(resp.body.is_empty());
}

#[test]
fn malformed_requests_get_error_status_and_close() {
    let server = start_server();
    let addr = server.local_addr();

    for (raw, status) in [
        (&b"BREW /pot HTTP/1.1\r\n\r\n"[..], 501),
        (&b"GET / HTTP/2.0\r\n\r\n"[..], 505),
        (&b"GET / HTTP/1.1\r\nbroken header\r\n\r\n"[..], 400),
    ] {
        let mut stream = connect(addr);
        stream.write_all(raw).unwrap();
        let resp = read_response(&mut stream, Method::Get);
        assert_eq!(resp.status, status, "{:?}", String::from_utf8_lossy(raw));
        assert_eq!(resp.headers.get("connection"), Some("close"));
        // server closes after the error
        let rest = read_until(&mut stream, |_| false);
        assert!(rest.is_empty());
    }
}

#[test]
fn oversized_head_gets_431() {
    let server = start_server();
    let mut stream = connect(server.local_addr());
    let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
    // one byte over the limit, so the server has read everything when it fails
    raw.resize(MAX_HEAD + 1, b'a');
    stream.write_all(&raw).unwrap();
    let received = read_until(&mut stream, |r| contains(r, b"\r\n\r\n"));
    assert!(received.starts_with(b"HTTP/1.1 431 "));
}

#[test]
fn client_round_trip() {
    let server = start_server();
    let port = server.local_addr().port();
    let (tx, rx) = mpsc::channel();
    let client = HttpConnection::connect("127.0.0.1", port, move |_, resp| {
        let _ = tx.send(resp);
    })
    .unwrap();

    client.get("/").unwrap();
    client
        .send(HttpRequest::new(Method::Post, "/echo").with_body("ping"))
        .unwrap();
    let first = rx.recv_timeout(TIMEOUT).unwrap();
    let second = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(first.status, 200);
    assert!(first.body.text().contains("KUtil"));
    assert_eq!(second.body.text(), "ping");
    client.close();
}

#[test]
fn shutdown_closes_live_connections() {
    let mut server = HttpServer::bind_with_config(
        "127.0.0.1:0",
        ServerConfig::default().with_server_header("test-server"),
        |_| {},
    )
    .unwrap();
    server.listen().unwrap();
    let mut stream = connect(server.local_addr());
    stream.write_all(b"GET / HTTP/1.1\r\n").unwrap();
    // wait until the accept loop registered the connection
    for _ in 0..500 {
        if !server.connections().is_empty() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(server.connections().len(), 1);
    server.shutdown();
    assert!(read_until(&mut stream, |_| false).is_empty());
}

#[test]
fn oversized_body_closes_connection() {
    let (tx, rx) = mpsc::channel();
    let config = ServerConfig::default().with_connection(
        ConnectionConfig::default()
            .with_recv_chunk_size(1024)
            .with_max_staged_bytes(4096),
    );
    let tx = std::sync::Mutex::new(tx);
    let mut server = HttpServer::bind_with_config("127.0.0.1:0", config, move |conn| {
        let tx = tx.lock().unwrap().clone();
        conn.on_close(move |_, cause| {
            let _ = tx.send(cause.map(|e| e.to_string()));
        });
    })
    .unwrap();
    server.listen().unwrap();

    let mut stream = connect(server.local_addr());
    stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 100000000\r\n\r\n")
        .unwrap();
    let chunk = [b'a'; 4096];
    for _ in 0..256 {
        // the server may reset the socket part way through
        if stream.write_all(&chunk).is_err() {
            break;
        }
    }
    let cause = rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert!(cause.contains("exceeded 4096 bytes"), "{}", cause);
}
