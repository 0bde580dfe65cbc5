// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffer and codec throughput.
//!
//! - MemoryBuffer write/read of 1 KiB chunks
//! - AppendedBuffer export over many children
//! - HTTP request parsing
//! - WebSocket frame encode + parse

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kutil::buffer::{shared, AppendedBuffer, ByteBuffer, ByteBufferExt, MemoryBuffer};
use kutil::http::websocket::{WsFrame, DEFAULT_MAX_PAYLOAD};
use kutil::http::{parse_request, write_request, HttpRequest, Method};

fn bench_memory_buffer(c: &mut Criterion) {
    let chunk = vec![0xA5u8; 1024];
    let mut group = c.benchmark_group("memory_buffer");
    group.throughput(Throughput::Bytes(64 * 1024));
    group.bench_function("write_read_64k", |b| {
        b.iter(|| {
            let mut buf = MemoryBuffer::with_capacity(64 * 1024);
            for _ in 0..64 {
                buf.write(&chunk, None).unwrap();
            }
            buf.reset_pointer().unwrap();
            while buf.left_length() > 0 {
                black_box(buf.read(1024).unwrap());
            }
        });
    });
    group.bench_function("data_u32", |b| {
        b.iter(|| {
            let mut buf = MemoryBuffer::new();
            let mut data = buf.data();
            for i in 0..1024u32 {
                data.write_u32(i).unwrap();
            }
            for _ in 0..1024 {
                black_box(data.read_u32().unwrap());
            }
        });
    });
    group.finish();
}

fn bench_appended_export(c: &mut Criterion) {
    c.bench_function("appended_export_256_children", |b| {
        b.iter(|| {
            let children = (0..256).map(|i| shared(MemoryBuffer::from_bytes(vec![i as u8; 256])));
            let mut joined = AppendedBuffer::from_buffers(children).unwrap();
            black_box(joined.export().unwrap());
        });
    });
}

fn bench_http_parse(c: &mut Criterion) {
    let req = HttpRequest::new(Method::Post, "/api/items?page=2")
        .with_header("Host", "localhost")
        .with_header("Accept", "application/json")
        .with_header("User-Agent", "kutil-bench")
        .with_body(vec![b'x'; 512]);
    let mut wire = Vec::new();
    write_request(&req, &mut wire).unwrap();

    c.bench_function("http_parse_request", |b| {
        b.iter(|| {
            let mut input = MemoryBuffer::from_bytes(wire.clone());
            black_box(parse_request(&mut input).ok());
        });
    });
}

fn bench_ws_frames(c: &mut Criterion) {
    let mut frame = WsFrame::binary(vec![7u8; 4096]);
    frame.mask = Some([1, 2, 3, 4]);
    c.bench_function("ws_frame_encode_parse_4k", |b| {
        b.iter(|| {
            let mut input = MemoryBuffer::from_bytes(frame.encode());
            black_box(WsFrame::parse(&mut input, DEFAULT_MAX_PAYLOAD).ok());
        });
    });
}

criterion_group!(
    benches,
    bench_memory_buffer,
    bench_appended_export,
    bench_http_parse,
    bench_ws_frames
);
criterion_main!(benches);
