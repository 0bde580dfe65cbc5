// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Zero-copy logical concatenation of buffers.
//!
//! Children are held through [`SharedBuffer`] handles and never copied. The
//! length of each child is recorded when it is appended; if a child is
//! resized afterwards, every operation on the parent fails with
//! [`BufferError::IllegalManipulation`].

use super::{BufferError, BufferKind, BufferResult, ByteBuffer, MemoryBuffer, SharedBuffer};
use parking_lot::Mutex;
use std::sync::Arc;

/// Exports larger than this log a warning.
pub const EXPORT_WARN_THRESHOLD: usize = 16 * 1024 * 1024;

struct Child {
    buffer: SharedBuffer,
    length: usize,
    /// Created by the appended buffer itself for trailing writes.
    internal: bool,
}

/// Concatenation of child buffers.
#[derive(Default)]
pub struct AppendedBuffer {
    children: Vec<Child>,
    /// Start offset of each child, same indexing as `children`.
    offsets: Vec<usize>,
    length: usize,
    pointer: usize,
    destroyed: bool,
}

impl AppendedBuffer {
    /// Empty concatenation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate `buffers` in order.
    pub fn from_buffers<I>(buffers: I) -> BufferResult<Self>
    where
        I: IntoIterator<Item = SharedBuffer>,
    {
        let mut out = Self::new();
        for buffer in buffers {
            out.append(buffer)?;
        }
        Ok(out)
    }

    /// Append a child; its current length is recorded.
    pub fn append(&mut self, buffer: SharedBuffer) -> BufferResult<()> {
        if self.destroyed {
            return Err(BufferError::Destroyed);
        }
        let length = {
            let guard = buffer.lock();
            if guard.is_destroyed() {
                return Err(BufferError::Destroyed);
            }
            guard.full_length()
        };
        self.push_child(buffer, length, false);
        Ok(())
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    fn push_child(&mut self, buffer: SharedBuffer, length: usize, internal: bool) {
        self.offsets.push(self.length);
        self.length += length;
        self.children.push(Child {
            buffer,
            length,
            internal,
        });
    }

    fn alive(&self) -> BufferResult<()> {
        if self.destroyed {
            return Err(BufferError::Destroyed);
        }
        for (i, child) in self.children.iter().enumerate() {
            let guard = child.buffer.lock();
            if guard.is_destroyed() {
                return Err(BufferError::Destroyed);
            }
            let actual = guard.full_length();
            if actual != child.length {
                return Err(BufferError::IllegalManipulation {
                    child: i,
                    expected: child.length,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Index of the child holding `offset` (last child starting at or before it).
    fn locate(&self, offset: usize) -> usize {
        self.offsets
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn read_range(&self, offset: usize, n: usize) -> BufferResult<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        let mut idx = self.locate(offset);
        let mut inner = offset - self.offsets.get(idx).copied().unwrap_or(0);
        while out.len() < n {
            let child = self.children.get(idx).ok_or(BufferError::OutOfBoundsRead {
                requested: n,
                available: out.len(),
            })?;
            let take = (n - out.len()).min(child.length.saturating_sub(inner));
            if take > 0 {
                out.extend_from_slice(&read_child(&child.buffer, inner, take)?);
            }
            idx += 1;
            inner = 0;
        }
        Ok(out)
    }

    fn out_of_bounds(&self, requested: usize) -> BufferError {
        BufferError::OutOfBoundsRead {
            requested,
            available: self.length - self.pointer,
        }
    }
}

/// Read `n` bytes at `offset` of a child, leaving its pointer where it was.
fn read_child(buffer: &SharedBuffer, offset: usize, n: usize) -> BufferResult<Vec<u8>> {
    let mut child = buffer.lock();
    let saved = child.pointer();
    child.reset_pointer()?;
    child.skip(offset)?;
    let result = child.read(n);
    child.reset_pointer()?;
    child.skip(saved)?;
    result
}

impl ByteBuffer for AppendedBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Appended
    }

    fn pointer(&self) -> usize {
        self.pointer
    }

    fn full_length(&self) -> usize {
        self.length
    }

    fn read_byte(&mut self) -> BufferResult<u8> {
        let bytes = self.read(1)?;
        Ok(bytes[0])
    }

    fn read(&mut self, n: usize) -> BufferResult<Vec<u8>> {
        self.alive()?;
        if n > self.length - self.pointer {
            return Err(self.out_of_bounds(n));
        }
        let out = self.read_range(self.pointer, n)?;
        self.pointer += n;
        Ok(out)
    }

    fn read_last_byte(&mut self) -> BufferResult<u8> {
        self.alive()?;
        if self.length == 0 {
            return Err(BufferError::OutOfBoundsRead {
                requested: 1,
                available: 0,
            });
        }
        let bytes = self.read_range(self.length - 1, 1)?;
        Ok(bytes[0])
    }

    fn index(&mut self, _seq: &[u8]) -> BufferResult<usize> {
        Err(BufferError::Unsupported("index on appended buffer"))
    }

    fn write(&mut self, bytes: &[u8], at: Option<usize>) -> BufferResult<()> {
        self.alive()?;
        if at.is_some_and(|i| i != self.length) {
            return Err(BufferError::Unsupported(
                "appended buffers only accept writes at the end",
            ));
        }
        if let Some(last) = self.children.last_mut() {
            let writable = last.internal || Arc::strong_count(&last.buffer) == 1;
            if writable {
                let mut guard = last.buffer.lock();
                if guard.kind() == BufferKind::Memory {
                    guard.write(bytes, None)?;
                    last.length += bytes.len();
                    self.length += bytes.len();
                    return Ok(());
                }
            }
        }
        let child: SharedBuffer = Arc::new(Mutex::new(MemoryBuffer::from_bytes(bytes.to_vec())));
        self.push_child(child, bytes.len(), true);
        Ok(())
    }

    fn skip(&mut self, n: usize) -> BufferResult<()> {
        self.alive()?;
        if n > self.length - self.pointer {
            return Err(self.out_of_bounds(n));
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
        Err(BufferError::Unsupported(
            "reset_before_pointer on appended buffer",
        ))
    }

    fn reset(&mut self, _data: Option<&[u8]>) -> BufferResult<()> {
        Err(BufferError::Unsupported("reset on appended buffer"))
    }

    fn export(&mut self) -> BufferResult<Vec<u8>> {
        self.alive()?;
        if self.length > EXPORT_WARN_THRESHOLD {
            log::warn!(
                "[buffer] exporting {} bytes from an appended buffer of {} children",
                self.length,
                self.children.len()
            );
        }
        let mut out = Vec::with_capacity(self.length);
        for child in &self.children {
            out.extend_from_slice(&child.buffer.lock().export()?);
        }
        Ok(out)
    }

    fn copy(&mut self) -> BufferResult<Box<dyn ByteBuffer>> {
        let content = self.export()?;
        let length = content.len();
        let mut copy = AppendedBuffer::new();
        copy.push_child(
            Arc::new(Mutex::new(MemoryBuffer::from_bytes(content))),
            length,
            true,
        );
        copy.pointer = self.pointer;
        Ok(Box::new(copy))
    }

    fn destroy(&mut self) {
        for child in self.children.drain(..) {
            child.buffer.lock().destroy();
        }
        self.offsets.clear();
        self.length = 0;
        self.pointer = 0;
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{shared, FileBuffer};

    fn abc_def() -> (SharedBuffer, SharedBuffer, AppendedBuffer) {
        let a = shared(MemoryBuffer::from_bytes(b"abc".to_vec()));
        let b = shared(FileBuffer::in_memory(b"def".to_vec()));
        let buf = AppendedBuffer::from_buffers([a.clone(), b.clone()]).unwrap();
        (a, b, buf)
    }

    #[test]
    fn test_export_is_concatenation() {
        let (_a, _b, mut buf) = abc_def();
        assert_eq!(buf.full_length(), 6);
        assert_eq!(buf.export().unwrap(), b"abcdef");
    }

    #[test]
    fn test_read_spans_children() {
        let (a, _b, mut buf) = abc_def();
        a.lock().skip(1).unwrap();
        buf.skip(2).unwrap();
        assert_eq!(buf.read(3).unwrap(), b"cde");
        assert_eq!(buf.read_last_byte().unwrap(), b'f');
        assert_eq!(buf.pointer(), 5);
        // child pointer is restored after transient reads
        assert_eq!(a.lock().pointer(), 1);
    }

    #[test]
    fn test_resized_child_is_detected() {
        let (a, _b, mut buf) = abc_def();
        a.lock().write(b"zz", None).unwrap();
        match buf.read(1) {
            Err(BufferError::IllegalManipulation {
                child,
                expected,
                actual,
            }) => {
                assert_eq!((child, expected, actual), (0, 3, 5));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(buf.export().is_err());
    }

    #[test]
    fn test_write_appends_memory_child() {
        let (_a, _b, mut buf) = abc_def();
        buf.write(b"gh", None).unwrap();
        assert_eq!(buf.child_count(), 3);
        buf.write(b"i", Some(8)).unwrap();
        // internally created trailing child is reused
        assert_eq!(buf.child_count(), 3);
        assert_eq!(buf.export().unwrap(), b"abcdefghi");
        assert!(matches!(
            buf.write(b"x", Some(0)),
            Err(BufferError::Unsupported(_))
        ));
    }

    #[test]
    fn test_shared_memory_tail_is_not_extended() {
        let a = shared(MemoryBuffer::from_bytes(b"abc".to_vec()));
        let mut buf = AppendedBuffer::from_buffers([a.clone()]).unwrap();
        buf.write(b"d", None).unwrap();
        assert_eq!(buf.child_count(), 2);
        assert_eq!(a.lock().full_length(), 3);
    }

    #[test]
    fn test_unsupported_operations() {
        let (_a, _b, mut buf) = abc_def();
        assert!(matches!(buf.index(b"c"), Err(BufferError::Unsupported(_))));
        assert!(matches!(
            buf.reset_before_pointer(),
            Err(BufferError::Unsupported(_))
        ));
        assert!(matches!(buf.reset(None), Err(BufferError::Unsupported(_))));
    }

    #[test]
    fn test_destroy_propagates() {
        let (a, b, mut buf) = abc_def();
        buf.destroy();
        assert!(a.lock().is_destroyed());
        assert!(b.lock().is_destroyed());
        assert!(matches!(buf.read(1), Err(BufferError::Destroyed)));
    }

    #[test]
    fn test_empty_children_are_skipped() {
        let e = shared(MemoryBuffer::new());
        let a = shared(MemoryBuffer::from_bytes(b"xy".to_vec()));
        let mut buf = AppendedBuffer::from_buffers([e.clone(), a, e]).unwrap();
        assert_eq!(buf.read(2).unwrap(), b"xy");
        assert_eq!(buf.read_last_byte().unwrap(), b'y');
    }

    #[test]
    fn test_copy_keeps_pointer() {
        let (_a, _b, mut buf) = abc_def();
        buf.skip(4).unwrap();
        let mut copy = buf.copy().unwrap();
        assert_eq!(copy.kind(), BufferKind::Appended);
        assert_eq!(copy.read_rest().unwrap(), b"ef");
    }
}
