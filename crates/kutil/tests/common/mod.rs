// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Loopback helpers shared by the integration tests.

#![allow(dead_code)]

use kutil::buffer::{ByteBuffer, MemoryBuffer};
use kutil::http::{parse_response, HttpResponse, Method};
use kutil::protocol::Unpack;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream
}

/// Read until `done` holds for everything received, or EOF.
pub fn read_until(stream: &mut TcpStream, done: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    while !done(&received) {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(e) => panic!("read failed after {} bytes: {}", received.len(), e),
        }
    }
    received
}

/// Read one complete response.
pub fn read_response(stream: &mut TcpStream, method: Method) -> HttpResponse {
    let mut input = MemoryBuffer::new();
    let mut chunk = [0u8; 4096];
    loop {
        input.reset_pointer().unwrap();
        match parse_response(&mut input, Some(method)) {
            Ok(resp) => return resp,
            Err(Unpack::NeedMoreData) => {}
            Err(other) => panic!("bad response: {:?}", other),
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before a full response");
        input.extend(&chunk[..n]);
    }
}

/// Send `raw` and read one response.
pub fn exchange(addr: SocketAddr, raw: &[u8]) -> HttpResponse {
    let mut stream = connect(addr);
    stream.write_all(raw).unwrap();
    read_response(&mut stream, Method::Get)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
