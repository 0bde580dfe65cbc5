// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory byte buffer.

use super::{find_subsequence, BufferError, BufferKind, BufferResult, ByteBuffer};

/// Growable in-memory buffer with insert-at-index writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryBuffer {
    data: Vec<u8>,
    pointer: usize,
    destroyed: bool,
}

impl MemoryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `data`, pointer at 0.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pointer: 0,
            destroyed: false,
        }
    }

    /// Create an empty buffer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pointer: 0,
            destroyed: false,
        }
    }

    /// Borrow the full content.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Borrow the unread content.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pointer..]
    }

    /// Consume the buffer, returning its content.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append bytes at the end (infallible fast path used by encoders).
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Take the whole content out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        self.pointer = 0;
        std::mem::take(&mut self.data)
    }

    fn alive(&self) -> BufferResult<()> {
        if self.destroyed {
            Err(BufferError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl ByteBuffer for MemoryBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Memory
    }

    fn pointer(&self) -> usize {
        self.pointer
    }

    fn full_length(&self) -> usize {
        self.data.len()
    }

    fn read_byte(&mut self) -> BufferResult<u8> {
        self.alive()?;
        match self.data.get(self.pointer) {
            Some(&b) => {
                self.pointer += 1;
                Ok(b)
            }
            None => Err(BufferError::OutOfBoundsRead {
                requested: 1,
                available: 0,
            }),
        }
    }

    fn read(&mut self, n: usize) -> BufferResult<Vec<u8>> {
        self.alive()?;
        let available = self.left_length();
        if n > available {
            return Err(BufferError::OutOfBoundsRead {
                requested: n,
                available,
            });
        }
        let out = self.data[self.pointer..self.pointer + n].to_vec();
        self.pointer += n;
        Ok(out)
    }

    fn read_last_byte(&mut self) -> BufferResult<u8> {
        self.alive()?;
        self.data
            .last()
            .copied()
            .ok_or(BufferError::OutOfBoundsRead {
                requested: 1,
                available: 0,
            })
    }

    fn index(&mut self, seq: &[u8]) -> BufferResult<usize> {
        self.alive()?;
        find_subsequence(&self.data[self.pointer..], seq).ok_or(BufferError::NotFound)
    }

    fn write(&mut self, bytes: &[u8], at: Option<usize>) -> BufferResult<()> {
        self.alive()?;
        match at {
            None => self.data.extend_from_slice(bytes),
            Some(i) if i == self.data.len() => self.data.extend_from_slice(bytes),
            Some(i) if i < self.data.len() => {
                self.data.splice(i..i, bytes.iter().copied());
            }
            Some(i) => {
                return Err(BufferError::OutOfBoundsRead {
                    requested: i,
                    available: self.data.len(),
                })
            }
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> BufferResult<()> {
        self.alive()?;
        let available = self.left_length();
        if n > available {
            return Err(BufferError::OutOfBoundsRead {
                requested: n,
                available,
            });
        }
        self.pointer += n;
        Ok(())
    }

    fn back(&mut self, n: usize) -> BufferResult<()> {
        self.alive()?;
        if n > self.pointer {
            return Err(BufferError::OutOfBoundsUndo {
                requested: n,
                pointer: self.pointer,
            });
        }
        self.pointer -= n;
        Ok(())
    }

    fn reset_pointer(&mut self) -> BufferResult<()> {
        self.alive()?;
        self.pointer = 0;
        Ok(())
    }

    fn reset_before_pointer(&mut self) -> BufferResult<()> {
        self.alive()?;
        self.data.drain(..self.pointer);
        self.pointer = 0;
        Ok(())
    }

    fn reset(&mut self, data: Option<&[u8]>) -> BufferResult<()> {
        self.alive()?;
        self.data.clear();
        if let Some(bytes) = data {
            self.data.extend_from_slice(bytes);
        }
        self.pointer = 0;
        Ok(())
    }

    fn export(&mut self) -> BufferResult<Vec<u8>> {
        self.alive()?;
        Ok(self.data.clone())
    }

    fn copy(&mut self) -> BufferResult<Box<dyn ByteBuffer>> {
        self.alive()?;
        Ok(Box::new(self.clone()))
    }

    fn destroy(&mut self) {
        self.data = Vec::new();
        self.pointer = 0;
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl From<Vec<u8>> for MemoryBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl From<&[u8]> for MemoryBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from_bytes(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_advances_pointer() {
        let mut buf = MemoryBuffer::from_bytes(b"hello world".to_vec());
        assert_eq!(buf.read(5).unwrap(), b"hello");
        assert_eq!(buf.pointer(), 5);
        assert_eq!(buf.read_byte().unwrap(), b' ');
        assert_eq!(buf.read_rest().unwrap(), b"world");
        assert_eq!(buf.left_length(), 0);
    }

    #[test]
    fn test_read_past_end_keeps_pointer() {
        let mut buf = MemoryBuffer::from_bytes(b"abc".to_vec());
        buf.skip(1).unwrap();
        let err = buf.read(5).unwrap_err();
        assert!(matches!(
            err,
            BufferError::OutOfBoundsRead {
                requested: 5,
                available: 2
            }
        ));
        assert_eq!(buf.pointer(), 1);
    }

    #[test]
    fn test_back_below_zero_fails() {
        let mut buf = MemoryBuffer::from_bytes(b"abc".to_vec());
        buf.skip(2).unwrap();
        buf.back(2).unwrap();
        assert!(matches!(
            buf.back(1),
            Err(BufferError::OutOfBoundsUndo { .. })
        ));
        assert_eq!(buf.pointer(), 0);
    }

    #[test]
    fn test_insert_at_index() {
        let mut buf = MemoryBuffer::from_bytes(b"held".to_vec());
        buf.write(b"llo wor", Some(2)).unwrap();
        assert_eq!(buf.as_slice(), b"hello world");
        buf.write_byte(b'!', None).unwrap();
        assert_eq!(buf.as_slice(), b"hello world!");
        assert!(buf.write(b"x", Some(100)).is_err());
    }

    #[test]
    fn test_read_line_consumes_delimiter() {
        let mut buf = MemoryBuffer::from_bytes(b"GET / HTTP/1.1\r\nHost: a\r\n".to_vec());
        assert_eq!(buf.read_line(b"\r\n").unwrap(), b"GET / HTTP/1.1");
        assert_eq!(buf.pointer(), 16);
        assert_eq!(buf.read_line(b"\r\n").unwrap(), b"Host: a");
        assert!(matches!(buf.read_line(b"\r\n"), Err(BufferError::NotFound)));
    }

    #[test]
    fn test_reset_before_pointer() {
        let mut buf = MemoryBuffer::from_bytes(b"abcdef".to_vec());
        buf.skip(4).unwrap();
        buf.reset_before_pointer().unwrap();
        assert_eq!(buf.pointer(), 0);
        assert_eq!(buf.as_slice(), b"ef");
    }

    #[test]
    fn test_read_last_byte_does_not_move() {
        let mut buf = MemoryBuffer::from_bytes(vec![1, 2, 3]);
        assert_eq!(buf.read_last_byte().unwrap(), 3);
        assert_eq!(buf.pointer(), 0);
        let mut empty = MemoryBuffer::new();
        assert!(empty.read_last_byte().is_err());
    }

    #[test]
    fn test_destroyed_buffer_rejects_everything() {
        let mut buf = MemoryBuffer::from_bytes(b"abc".to_vec());
        buf.destroy();
        assert!(buf.is_destroyed());
        assert!(matches!(buf.read_byte(), Err(BufferError::Destroyed)));
        assert!(matches!(buf.write(b"x", None), Err(BufferError::Destroyed)));
        assert!(matches!(buf.export(), Err(BufferError::Destroyed)));
    }

    #[test]
    fn test_copy_is_deep() {
        let mut buf = MemoryBuffer::from_bytes(b"abc".to_vec());
        buf.skip(1).unwrap();
        let mut copy = buf.copy().unwrap();
        buf.write(b"def", None).unwrap();
        assert_eq!(copy.pointer(), 1);
        assert_eq!(copy.export().unwrap(), b"abc");
    }
}
