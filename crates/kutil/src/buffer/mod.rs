// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Random-access byte buffers with a single read/write pointer.
//!
//! Every protocol layer in this crate reads from and writes to a
//! [`ByteBuffer`]. Three backing stores share the same contract:
//!
//! - [`MemoryBuffer`] - growable in-memory byte array
//! - [`FileBuffer`] - any seekable binary stream (a file, a cursor, ...)
//! - [`AppendedBuffer`] - zero-copy logical concatenation of other buffers
//!
//! A [`DataBuffer`] view adds big-endian integer, string, boolean and
//! CRC-32 encodings on top of any of them.
//!
//! # Pointer model
//!
//! ```text
//!   0                pointer                     full_length
//!   +-------------------+------------------------------+
//!   |   already read    |          left_length         |
//!   +-------------------+------------------------------+
//! ```
//!
//! Invariant: `0 <= pointer <= full_length` after every operation. Reads past
//! the end fail with [`BufferError::OutOfBoundsRead`], moving the pointer
//! below zero fails with [`BufferError::OutOfBoundsUndo`]; neither moves the
//! pointer.

mod appended;
mod data;
mod file;
mod memory;

pub use appended::{AppendedBuffer, EXPORT_WARN_THRESHOLD};
pub use data::DataBuffer;
pub use file::FileBuffer;
pub use memory::MemoryBuffer;

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Shared, lockable handle to any buffer.
///
/// Appended buffers hold their children through this handle so the same
/// child can be observed (and, illegally, resized) from elsewhere.
pub type SharedBuffer = Arc<Mutex<dyn ByteBuffer>>;

/// Wrap a buffer into a [`SharedBuffer`].
pub fn shared<B: ByteBuffer + 'static>(buffer: B) -> SharedBuffer {
    Arc::new(Mutex::new(buffer))
}

/// Backing store of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Owned in-memory byte array.
    Memory,
    /// Seekable stream.
    File,
    /// Logical concatenation of children.
    Appended,
}

/// Errors raised by buffer operations.
#[derive(Debug)]
pub enum BufferError {
    /// Read past the end of the content.
    OutOfBoundsRead {
        /// Bytes the caller asked for
        requested: usize,
        /// Bytes left after the pointer
        available: usize,
    },
    /// Pointer moved below zero.
    OutOfBoundsUndo {
        /// Bytes the caller wanted to step back
        requested: usize,
        /// Pointer position at the time
        pointer: usize,
    },
    /// Searched sequence is not present after the pointer.
    NotFound,
    /// Operation not supported by this buffer variant.
    Unsupported(&'static str),
    /// A child of an appended buffer was resized behind its back.
    IllegalManipulation {
        /// Child position in the appended buffer
        child: usize,
        /// Length recorded when the child was appended
        expected: usize,
        /// Length observed now
        actual: usize,
    },
    /// Buffer was destroyed.
    Destroyed,
    /// Content could not be decoded (invalid UTF-8, bad boolean, ...).
    InvalidData(String),
    /// Underlying stream failed.
    Io(io::Error),
}

impl BufferError {
    /// True when more bytes could make the failing read succeed.
    pub fn is_underflow(&self) -> bool {
        matches!(self, Self::OutOfBoundsRead { .. } | Self::NotFound)
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBoundsRead {
                requested,
                available,
            } => write!(
                f,
                "read out of bounds: requested {} bytes, {} available",
                requested, available
            ),
            Self::OutOfBoundsUndo { requested, pointer } => write!(
                f,
                "undo out of bounds: back({}) with pointer at {}",
                requested, pointer
            ),
            Self::NotFound => write!(f, "sequence not found"),
            Self::Unsupported(op) => write!(f, "unsupported operation: {}", op),
            Self::IllegalManipulation {
                child,
                expected,
                actual,
            } => write!(
                f,
                "child buffer {} was resized from {} to {} bytes after being appended",
                child, expected, actual
            ),
            Self::Destroyed => write!(f, "buffer was destroyed"),
            Self::InvalidData(msg) => write!(f, "invalid data: {}", msg),
            Self::Io(e) => write!(f, "buffer I/O error: {}", e),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BufferError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result alias for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Uniform reader/writer over bytes regardless of backing store.
///
/// `at` arguments select an insertion offset; `None` appends at the end.
pub trait ByteBuffer: Send {
    /// Backing store of this buffer.
    fn kind(&self) -> BufferKind;

    /// Offset of the next byte to read.
    fn pointer(&self) -> usize;

    /// Total content length.
    fn full_length(&self) -> usize;

    /// Bytes left between the pointer and the end.
    fn left_length(&self) -> usize {
        self.full_length().saturating_sub(self.pointer())
    }

    /// True when at least `n` bytes are left to read.
    fn has(&self, n: usize) -> bool {
        self.left_length() >= n
    }

    /// Read one byte and advance the pointer.
    fn read_byte(&mut self) -> BufferResult<u8>;

    /// Read exactly `n` bytes and advance the pointer.
    fn read(&mut self, n: usize) -> BufferResult<Vec<u8>>;

    /// Read everything after the pointer.
    fn read_rest(&mut self) -> BufferResult<Vec<u8>> {
        let n = self.left_length();
        self.read(n)
    }

    /// Final byte of the content; the pointer does not move.
    fn read_last_byte(&mut self) -> BufferResult<u8>;

    /// Read up to `delim`, consume the delimiter, return the bytes before it.
    ///
    /// Fails with [`BufferError::NotFound`] (pointer untouched) when the
    /// delimiter is not present yet.
    fn read_line(&mut self, delim: &[u8]) -> BufferResult<Vec<u8>> {
        let offset = self.index(delim)?;
        let line = self.read(offset)?;
        self.skip(delim.len())?;
        Ok(line)
    }

    /// Offset of `seq` relative to the pointer.
    fn index(&mut self, seq: &[u8]) -> BufferResult<usize>;

    /// Write one byte at `at`, or at the end.
    fn write_byte(&mut self, byte: u8, at: Option<usize>) -> BufferResult<()> {
        self.write(&[byte], at)
    }

    /// Write `bytes` at `at`, or at the end.
    fn write(&mut self, bytes: &[u8], at: Option<usize>) -> BufferResult<()>;

    /// Advance the pointer without reading.
    fn skip(&mut self, n: usize) -> BufferResult<()>;

    /// Move the pointer back.
    fn back(&mut self, n: usize) -> BufferResult<()>;

    /// Move the pointer to the start.
    fn reset_pointer(&mut self) -> BufferResult<()>;

    /// Drop everything before the pointer; the pointer becomes 0.
    fn reset_before_pointer(&mut self) -> BufferResult<()>;

    /// Replace the whole content (empty when `data` is `None`).
    fn reset(&mut self, data: Option<&[u8]>) -> BufferResult<()>;

    /// Full content as a contiguous byte array.
    fn export(&mut self) -> BufferResult<Vec<u8>>;

    /// Deep copy, including the pointer position.
    fn copy(&mut self) -> BufferResult<Box<dyn ByteBuffer>>;

    /// Release resources. Every later operation fails with
    /// [`BufferError::Destroyed`].
    fn destroy(&mut self);

    /// True once [`ByteBuffer::destroy`] ran.
    fn is_destroyed(&self) -> bool;
}

/// Typed view accessor available on every sized buffer.
pub trait ByteBufferExt: ByteBuffer + Sized {
    /// Typed big-endian view over this buffer.
    ///
    /// The view mutably borrows the buffer, so at most one exists at a time.
    fn data(&mut self) -> DataBuffer<'_> {
        DataBuffer::new(self)
    }
}

impl<B: ByteBuffer + Sized> ByteBufferExt for B {}

/// Locate `needle` in `haystack` (naive scan, delimiters are short).
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
