// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Buffer laws checked over every buffer variant with random inputs.

use kutil::buffer::{
    shared, AppendedBuffer, BufferError, BufferKind, ByteBuffer, ByteBufferExt, FileBuffer, MemoryBuffer,
};

const ROUNDS: usize = 64;

fn random_bytes(rng: &mut fastrand::Rng, max: usize) -> Vec<u8> {
    let len = rng.usize(0..=max);
    (0..len).map(|_| rng.u8(..)).collect()
}

/// One fresh empty buffer of each kind (file-backed ones live in `dir`).
fn variants(dir: &tempfile::TempDir, tag: usize) -> Vec<Box<dyn ByteBuffer>> {
    let path = dir.path().join(format!("buf-{}.bin", tag));
    vec![
        Box::new(MemoryBuffer::new()),
        Box::new(FileBuffer::create(path).unwrap()),
        Box::new(FileBuffer::in_memory(Vec::new())),
        Box::new(AppendedBuffer::new()),
    ]
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = fastrand::Rng::with_seed(0x6b75_7469);
    for round in 0..ROUNDS {
        let data = random_bytes(&mut rng, 512);
        for mut buf in variants(&dir, round) {
            buf.write(&data, None).unwrap();
            buf.reset_pointer().unwrap();
            assert_eq!(buf.read(data.len()).unwrap(), data, "{:?}", buf.kind());
            assert_eq!(buf.left_length(), 0);
        }
    }
}

#[test]
fn pointer_stays_in_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = fastrand::Rng::with_seed(7);
    for round in 0..ROUNDS {
        for mut buf in variants(&dir, round) {
            for _ in 0..32 {
                let n = rng.usize(0..64);
                // failures are fine; the invariant must hold regardless
                let _ = match rng.u8(0..4) {
                    0 => buf.read(n).map(|_| ()),
                    1 => buf.write(&random_bytes(&mut rng, 32), None),
                    2 => buf.skip(n),
                    _ => buf.back(n),
                };
                assert!(buf.pointer() <= buf.full_length(), "{:?}", buf.kind());
            }
        }
    }
}

#[test]
fn read_line_consumes_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = fastrand::Rng::with_seed(99);
    for round in 0..ROUNDS {
        let line: Vec<u8> = random_bytes(&mut rng, 200)
            .into_iter()
            .filter(|b| *b != b'\r' && *b != b'\n')
            .collect();
        for mut buf in variants(&dir, round) {
            buf.write(&line, None).unwrap();
            buf.write(b"\r\n", None).unwrap();
            buf.write(b"tail", None).unwrap();
            buf.reset_pointer().unwrap();
            if buf.kind() == BufferKind::Appended {
                // appended buffers cannot search across children
                assert!(matches!(
                    buf.read_line(b"\r\n"),
                    Err(BufferError::Unsupported(_))
                ));
                assert_eq!(buf.pointer(), 0);
                continue;
            }
            assert_eq!(buf.read_line(b"\r\n").unwrap(), line);
            assert_eq!(buf.pointer(), line.len() + 2);
            assert!(matches!(buf.read_line(b"\r\n"), Err(BufferError::NotFound)));
            assert_eq!(buf.pointer(), line.len() + 2);
        }
    }
}

#[test]
fn appended_export_is_concatenation() {
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..ROUNDS {
        let a = random_bytes(&mut rng, 100);
        let b = random_bytes(&mut rng, 100);
        let mut joined = AppendedBuffer::from_buffers([
            shared(MemoryBuffer::from_bytes(a.clone())),
            shared(FileBuffer::in_memory(b.clone())),
        ])
        .unwrap();
        let mut expected = a.clone();
        expected.extend_from_slice(&b);
        assert_eq!(joined.export().unwrap(), expected);
        assert_eq!(joined.full_length(), a.len() + b.len());
    }
}

#[test]
fn resized_child_poisons_parent() {
    let child = shared(MemoryBuffer::from_bytes(b"abc".to_vec()));
    let mut parent = AppendedBuffer::from_buffers([child.clone()]).unwrap();
    assert_eq!(parent.read(2).unwrap(), b"ab");

    child.lock().write(b"more", None).unwrap();
    assert!(matches!(
        parent.read_byte(),
        Err(BufferError::IllegalManipulation { .. })
    ));
    assert!(matches!(
        parent.export(),
        Err(BufferError::IllegalManipulation { .. })
    ));
}

#[test]
fn file_buffer_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.bin");
    {
        let mut buf = FileBuffer::create(&path).unwrap();
        buf.data().write_u32(0xDEAD_BEEF).unwrap();
        buf.data().write_string("kutil", 1).unwrap();
    }
    let mut buf = FileBuffer::open(&path).unwrap();
    assert_eq!(buf.full_length(), 4 + 1 + 5);
    let mut data = buf.data();
    assert_eq!(data.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(data.read_string(1).unwrap(), "kutil");
}

#[test]
fn data_buffer_unsigned_round_trips() {
    let mut rng = fastrand::Rng::with_seed(11);
    let mut buf = MemoryBuffer::new();
    for _ in 0..ROUNDS {
        let (a, b, c, d) = (rng.u8(..), rng.u16(..), rng.u32(..), rng.u64(..));
        let mut data = buf.data();
        data.write_u8(a).unwrap();
        data.write_u16(b).unwrap();
        data.write_u32(c).unwrap();
        data.write_u64(d).unwrap();
        assert_eq!(data.read_u8().unwrap(), a);
        assert_eq!(data.read_u16().unwrap(), b);
        assert_eq!(data.read_u32().unwrap(), c);
        assert_eq!(data.read_u64().unwrap(), d);
    }
}

#[test]
fn crc32_detects_changes() {
    let mut rng = fastrand::Rng::with_seed(5);
    for _ in 0..ROUNDS {
        let payload = random_bytes(&mut rng, 64);
        let mut other = payload.clone();
        other.push(rng.u8(..));
        let mut buf = MemoryBuffer::new();
        buf.data().write_crc32(&payload).unwrap();
        assert!(buf.data().read_and_compare_crc32(&payload).unwrap());
        buf.reset_pointer().unwrap();
        assert!(!buf.data().read_and_compare_crc32(&other).unwrap());
    }
}
