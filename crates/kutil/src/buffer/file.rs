// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffer backed by a seekable stream.
//!
//! The buffer keeps its own logical pointer and a cached copy of the
//! stream cursor. Before each operation the stream is moved to the logical
//! position with whichever seek is shorter: relative to the cached cursor,
//! or absolute from the start.
//!
//! Bytes past the logical length are never read. Dropping content
//! (`reset_before_pointer`, `reset`) rewrites the stream from the start and
//! shrinks the logical length; [`FileBuffer::truncate_stream`] shrinks the
//! file itself.

use super::{BufferError, BufferKind, BufferResult, ByteBuffer};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

const SCAN_CHUNK: usize = 8 * 1024;

/// Buffer over any `Read + Write + Seek` stream.
#[derive(Debug)]
pub struct FileBuffer<F> {
    inner: Option<F>,
    pointer: usize,
    length: usize,
    /// Stream position as last observed; `None` after an I/O error.
    cursor: Option<u64>,
}

impl<F: Read + Write + Seek> FileBuffer<F> {
    /// Wrap an existing stream. The current stream content is the buffer
    /// content; the pointer starts at 0.
    pub fn new(mut inner: F) -> BufferResult<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Some(inner),
            pointer: 0,
            length: end as usize,
            cursor: Some(end),
        })
    }

    /// Give back the stream.
    pub fn into_inner(self) -> Option<F> {
        self.inner
    }

    fn stream(&mut self, target: usize) -> BufferResult<&mut F> {
        let cursor = self.cursor;
        let inner = self.inner.as_mut().ok_or(BufferError::Destroyed)?;
        let target = target as u64;
        match cursor {
            Some(c) if c == target => {}
            Some(c) if c.abs_diff(target) < target => {
                let diff = target as i64 - c as i64;
                if let Err(e) = inner.seek(SeekFrom::Current(diff)) {
                    self.cursor = None;
                    return Err(e.into());
                }
            }
            _ => {
                if let Err(e) = inner.seek(SeekFrom::Start(target)) {
                    self.cursor = None;
                    return Err(e.into());
                }
            }
        }
        self.cursor = Some(target);
        self.inner.as_mut().ok_or(BufferError::Destroyed)
    }

    fn read_at(&mut self, offset: usize, n: usize) -> BufferResult<Vec<u8>> {
        let mut out = vec![0u8; n];
        let stream = self.stream(offset)?;
        let result = stream.read_exact(&mut out);
        match result {
            Ok(()) => {
                self.cursor = Some((offset + n) as u64);
                Ok(out)
            }
            Err(e) => {
                self.cursor = None;
                Err(e.into())
            }
        }
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> BufferResult<()> {
        let stream = self.stream(offset)?;
        let result = stream.write_all(bytes);
        match result {
            Ok(()) => {
                self.cursor = Some((offset + bytes.len()) as u64);
                Ok(())
            }
            Err(e) => {
                self.cursor = None;
                Err(e.into())
            }
        }
    }

    fn out_of_bounds(&self, requested: usize) -> BufferError {
        BufferError::OutOfBoundsRead {
            requested,
            available: self.left_length_inner(),
        }
    }

    fn left_length_inner(&self) -> usize {
        self.length.saturating_sub(self.pointer)
    }
}

impl FileBuffer<File> {
    /// Open an existing file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> BufferResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file)
    }

    /// Create (or truncate) a file for reading and writing.
    pub fn create(path: impl AsRef<Path>) -> BufferResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::new(file)
    }

    /// Shrink the file to the logical length.
    pub fn truncate_stream(&mut self) -> BufferResult<()> {
        let length = self.length as u64;
        let file = self.inner.as_mut().ok_or(BufferError::Destroyed)?;
        file.set_len(length)?;
        Ok(())
    }
}

impl FileBuffer<Cursor<Vec<u8>>> {
    /// In-memory stream holding `data`.
    pub fn in_memory(data: Vec<u8>) -> Self {
        let length = data.len();
        Self {
            inner: Some(Cursor::new(data)),
            pointer: 0,
            length,
            cursor: Some(0),
        }
    }
}

impl<F: Read + Write + Seek + Send> ByteBuffer for FileBuffer<F> {
    fn kind(&self) -> BufferKind {
        BufferKind::File
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
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        if n > self.left_length_inner() {
            return Err(self.out_of_bounds(n));
        }
        let out = self.read_at(self.pointer, n)?;
        self.pointer += n;
        Ok(out)
    }

    fn read_last_byte(&mut self) -> BufferResult<u8> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        if self.length == 0 {
            return Err(BufferError::OutOfBoundsRead {
                requested: 1,
                available: 0,
            });
        }
        let bytes = self.read_at(self.length - 1, 1)?;
        Ok(bytes[0])
    }

    fn index(&mut self, seq: &[u8]) -> BufferResult<usize> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        if seq.is_empty() {
            return Ok(0);
        }
        let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + seq.len());
        let mut window_start = self.pointer;
        let mut offset = self.pointer;
        while offset < self.length {
            let n = SCAN_CHUNK.min(self.length - offset);
            let chunk = self.read_at(offset, n)?;
            window.extend_from_slice(&chunk);
            offset += n;
            if let Some(pos) = super::find_subsequence(&window, seq) {
                return Ok(window_start + pos - self.pointer);
            }
            // Keep an overlap so a delimiter split across chunks is found.
            let keep = (seq.len() - 1).min(window.len());
            let drop = window.len() - keep;
            window.drain(..drop);
            window_start += drop;
        }
        Err(BufferError::NotFound)
    }

    fn write(&mut self, bytes: &[u8], at: Option<usize>) -> BufferResult<()> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        let at = at.unwrap_or(self.length);
        if at > self.length {
            return Err(BufferError::OutOfBoundsRead {
                requested: at,
                available: self.length,
            });
        }
        if at == self.length {
            self.write_at(at, bytes)?;
        } else {
            let tail = self.read_at(at, self.length - at)?;
            self.write_at(at, bytes)?;
            self.write_at(at + bytes.len(), &tail)?;
        }
        self.length += bytes.len();
        Ok(())
    }

    fn skip(&mut self, n: usize) -> BufferResult<()> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        if n > self.left_length_inner() {
            return Err(self.out_of_bounds(n));
        }
        self.pointer += n;
        Ok(())
    }

    fn back(&mut self, n: usize) -> BufferResult<()> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
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
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        self.pointer = 0;
        Ok(())
    }

    fn reset_before_pointer(&mut self) -> BufferResult<()> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        if self.pointer == 0 {
            return Ok(());
        }
        let rest = self.read_at(self.pointer, self.length - self.pointer)?;
        self.write_at(0, &rest)?;
        self.length = rest.len();
        self.pointer = 0;
        Ok(())
    }

    fn reset(&mut self, data: Option<&[u8]>) -> BufferResult<()> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        let data = data.unwrap_or(&[]);
        self.write_at(0, data)?;
        self.length = data.len();
        self.pointer = 0;
        Ok(())
    }

    fn export(&mut self) -> BufferResult<Vec<u8>> {
        if self.inner.is_none() {
            return Err(BufferError::Destroyed);
        }
        self.read_at(0, self.length)
    }

    fn copy(&mut self) -> BufferResult<Box<dyn ByteBuffer>> {
        let content = self.export()?;
        let mut copy = FileBuffer::in_memory(content);
        copy.pointer = self.pointer;
        Ok(Box::new(copy))
    }

    fn destroy(&mut self) {
        self.inner = None;
        self.pointer = 0;
        self.length = 0;
        self.cursor = None;
    }

    fn is_destroyed(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_reads() {
        let mut buf = FileBuffer::in_memory(b"hello\nworld\n".to_vec());
        assert_eq!(buf.full_length(), 12);
        assert_eq!(buf.read_line(b"\n").unwrap(), b"hello");
        assert_eq!(buf.pointer(), 6);
        assert_eq!(buf.read_last_byte().unwrap(), b'\n');
        assert_eq!(buf.pointer(), 6);
        assert_eq!(buf.read_rest().unwrap(), b"world\n");
    }

    #[test]
    fn test_insert_shifts_tail() {
        let mut buf = FileBuffer::in_memory(b"acd".to_vec());
        buf.write(b"b", Some(1)).unwrap();
        buf.write(b"e", None).unwrap();
        assert_eq!(buf.export().unwrap(), b"abcde");
        assert_eq!(buf.full_length(), 5);
    }

    #[test]
    fn test_index_across_chunks() {
        let mut content = vec![b'x'; SCAN_CHUNK - 1];
        content.extend_from_slice(b"\r\n");
        content.extend_from_slice(b"tail");
        let mut buf = FileBuffer::in_memory(content);
        assert_eq!(buf.index(b"\r\n").unwrap(), SCAN_CHUNK - 1);
        buf.skip(10).unwrap();
        assert_eq!(buf.index(b"\r\n").unwrap(), SCAN_CHUNK - 11);
        assert!(matches!(buf.index(b"zz"), Err(BufferError::NotFound)));
    }

    #[test]
    fn test_reset_before_pointer_shrinks_logical_length() {
        let mut buf = FileBuffer::in_memory(b"0123456789".to_vec());
        buf.skip(4).unwrap();
        buf.reset_before_pointer().unwrap();
        assert_eq!(buf.full_length(), 6);
        assert_eq!(buf.pointer(), 0);
        assert_eq!(buf.export().unwrap(), b"456789");
    }

    #[test]
    fn test_copy_goes_to_memory_stream() {
        let mut buf = FileBuffer::in_memory(b"abc".to_vec());
        buf.skip(2).unwrap();
        let mut copy = buf.copy().unwrap();
        assert_eq!(copy.kind(), BufferKind::File);
        assert_eq!(copy.pointer(), 2);
        assert_eq!(copy.read_byte().unwrap(), b'c');
    }

    #[test]
    fn test_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf.bin");
        {
            let mut buf = FileBuffer::create(&path).unwrap();
            buf.write(b"persisted bytes", None).unwrap();
            buf.reset(Some(b"short")).unwrap();
            buf.truncate_stream().unwrap();
        }
        let mut buf = FileBuffer::open(&path).unwrap();
        assert_eq!(buf.export().unwrap(), b"short");
    }

    #[test]
    fn test_destroy() {
        let mut buf = FileBuffer::in_memory(b"abc".to_vec());
        buf.destroy();
        assert!(buf.is_destroyed());
        assert!(matches!(buf.read(1), Err(BufferError::Destroyed)));
        assert!(buf.into_inner().is_none());
    }
}
