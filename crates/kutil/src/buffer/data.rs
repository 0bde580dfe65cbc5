// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed big-endian view over a [`ByteBuffer`].

use super::{BufferError, BufferResult, ByteBuffer};

/// Big-endian integer, string, boolean and CRC-32 codec over a buffer.
///
/// Writes always append at the end of the buffer; reads consume from the
/// pointer. Every call moves the pointer by exactly the encoded width.
pub struct DataBuffer<'a> {
    buf: &'a mut (dyn ByteBuffer + 'a),
}

impl<'a> DataBuffer<'a> {
    /// View over `buf`.
    pub fn new(buf: &'a mut (dyn ByteBuffer + 'a)) -> Self {
        Self { buf }
    }

    /// Underlying buffer.
    pub fn buffer(&mut self) -> &mut dyn ByteBuffer {
        &mut *self.buf
    }

    // ---- unsigned ----

    /// Write `value` on `width` bytes (1..=8).
    pub fn write_uint(&mut self, value: u64, width: usize) -> BufferResult<()> {
        check_width(width)?;
        if width < 8 && value >> (width * 8) != 0 {
            return Err(BufferError::InvalidData(format!(
                "{} does not fit in {} bytes",
                value, width
            )));
        }
        let bytes = value.to_be_bytes();
        self.buf.write(&bytes[8 - width..], None)
    }

    /// Read an unsigned integer of `width` bytes (1..=8).
    pub fn read_uint(&mut self, width: usize) -> BufferResult<u64> {
        check_width(width)?;
        let bytes = self.buf.read(width)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    pub fn write_u8(&mut self, value: u8) -> BufferResult<()> {
        self.buf.write_byte(value, None)
    }

    pub fn read_u8(&mut self) -> BufferResult<u8> {
        self.buf.read_byte()
    }

    pub fn write_u16(&mut self, value: u16) -> BufferResult<()> {
        self.buf.write(&value.to_be_bytes(), None)
    }

    pub fn read_u16(&mut self) -> BufferResult<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    /// 24-bit length field used by TLS handshake headers.
    pub fn write_u24(&mut self, value: u32) -> BufferResult<()> {
        self.write_uint(value as u64, 3)
    }

    pub fn read_u24(&mut self) -> BufferResult<u32> {
        Ok(self.read_uint(3)? as u32)
    }

    pub fn write_u32(&mut self, value: u32) -> BufferResult<()> {
        self.buf.write(&value.to_be_bytes(), None)
    }

    pub fn read_u32(&mut self) -> BufferResult<u32> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn write_u64(&mut self, value: u64) -> BufferResult<()> {
        self.buf.write(&value.to_be_bytes(), None)
    }

    pub fn read_u64(&mut self) -> BufferResult<u64> {
        self.read_uint(8)
    }

    // ---- signed ----

    /// Write a two's complement integer on `width` bytes (1..=8).
    pub fn write_int(&mut self, value: i64, width: usize) -> BufferResult<()> {
        check_width(width)?;
        let bits = width * 8;
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(BufferError::InvalidData(format!(
                    "{} does not fit in {} signed bytes",
                    value, width
                )));
            }
        }
        let bytes = value.to_be_bytes();
        self.buf.write(&bytes[8 - width..], None)
    }

    /// Read a two's complement integer of `width` bytes (1..=8).
    pub fn read_int(&mut self, width: usize) -> BufferResult<i64> {
        let raw = self.read_uint(width)?;
        let shift = 64 - width * 8;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn write_i8(&mut self, value: i8) -> BufferResult<()> {
        self.write_int(value as i64, 1)
    }

    pub fn read_i8(&mut self) -> BufferResult<i8> {
        Ok(self.read_int(1)? as i8)
    }

    pub fn write_i16(&mut self, value: i16) -> BufferResult<()> {
        self.write_int(value as i64, 2)
    }

    pub fn read_i16(&mut self) -> BufferResult<i16> {
        Ok(self.read_int(2)? as i16)
    }

    pub fn write_i32(&mut self, value: i32) -> BufferResult<()> {
        self.write_int(value as i64, 4)
    }

    pub fn read_i32(&mut self) -> BufferResult<i32> {
        Ok(self.read_int(4)? as i32)
    }

    pub fn write_i64(&mut self, value: i64) -> BufferResult<()> {
        self.write_int(value, 8)
    }

    pub fn read_i64(&mut self) -> BufferResult<i64> {
        self.read_int(8)
    }

    // ---- composite ----

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BufferResult<()> {
        self.buf.write(bytes, None)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> BufferResult<Vec<u8>> {
        self.buf.read(n)
    }

    /// Write `bytes` prefixed by its length on `len_width` bytes.
    pub fn write_vec(&mut self, bytes: &[u8], len_width: usize) -> BufferResult<()> {
        self.write_uint(bytes.len() as u64, len_width)?;
        self.buf.write(bytes, None)
    }

    /// Read a byte vector prefixed by its length on `len_width` bytes.
    ///
    /// On underflow the pointer is left where it was.
    pub fn read_vec(&mut self, len_width: usize) -> BufferResult<Vec<u8>> {
        let len = self.read_uint(len_width)? as usize;
        match self.buf.read(len) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.buf.back(len_width)?;
                Err(e)
            }
        }
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str, len_width: usize) -> BufferResult<()> {
        self.write_vec(value.as_bytes(), len_width)
    }

    pub fn read_string(&mut self, len_width: usize) -> BufferResult<String> {
        let bytes = self.read_vec(len_width)?;
        String::from_utf8(bytes).map_err(|e| BufferError::InvalidData(e.to_string()))
    }

    pub fn write_bool(&mut self, value: bool) -> BufferResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn read_bool(&mut self) -> BufferResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.buf.back(1)?;
                Err(BufferError::InvalidData(format!(
                    "0x{:02x} is not a boolean",
                    other
                )))
            }
        }
    }

    // ---- checksums ----

    /// Write the CRC-32 (IEEE) of `data` as a big-endian u32.
    pub fn write_crc32(&mut self, data: &[u8]) -> BufferResult<()> {
        self.write_u32(crc32fast::hash(data))
    }

    pub fn read_crc32(&mut self) -> BufferResult<u32> {
        self.read_u32()
    }

    /// Consume a CRC-32 and compare it with the checksum of `expected`.
    pub fn read_and_compare_crc32(&mut self, expected: &[u8]) -> BufferResult<bool> {
        Ok(self.read_crc32()? == crc32fast::hash(expected))
    }
}

fn check_width(width: usize) -> BufferResult<()> {
    if (1..=8).contains(&width) {
        Ok(())
    } else {
        Err(BufferError::InvalidData(format!(
            "integer width {} outside 1..=8",
            width
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ByteBufferExt, MemoryBuffer};

    #[test]
    fn test_unsigned_round_trip() {
        let mut buf = MemoryBuffer::new();
        {
            let mut data = buf.data();
            data.write_u8(0xAB).unwrap();
            data.write_u16(0xBEEF).unwrap();
            data.write_u24(0x010203).unwrap();
            data.write_u32(u32::MAX).unwrap();
            data.write_u64(0x0102_0304_0506_0708).unwrap();
            data.write_uint(0x0A0B0C0D0E, 5).unwrap();
        }
        assert_eq!(buf.full_length(), 1 + 2 + 3 + 4 + 8 + 5);
        let mut data = buf.data();
        assert_eq!(data.read_u8().unwrap(), 0xAB);
        assert_eq!(data.read_u16().unwrap(), 0xBEEF);
        assert_eq!(data.read_u24().unwrap(), 0x010203);
        assert_eq!(data.read_u32().unwrap(), u32::MAX);
        assert_eq!(data.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(data.read_uint(5).unwrap(), 0x0A0B0C0D0E);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut buf = MemoryBuffer::new();
        buf.data().write_u16(0x0102).unwrap();
        buf.data().write_i16(-2).unwrap();
        assert_eq!(buf.as_slice(), &[0x01, 0x02, 0xFF, 0xFE]);
    }

    #[test]
    fn test_signed_round_trip() {
        let mut buf = MemoryBuffer::new();
        let mut data = buf.data();
        data.write_i8(-128).unwrap();
        data.write_i32(-123_456).unwrap();
        data.write_int(-3, 3).unwrap();
        data.write_i64(i64::MIN).unwrap();
        assert_eq!(data.read_i8().unwrap(), -128);
        assert_eq!(data.read_i32().unwrap(), -123_456);
        assert_eq!(data.read_int(3).unwrap(), -3);
        assert_eq!(data.read_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn test_overflowing_values_rejected() {
        let mut buf = MemoryBuffer::new();
        let mut data = buf.data();
        assert!(data.write_uint(256, 1).is_err());
        assert!(data.write_int(128, 1).is_err());
        assert!(data.write_uint(1, 9).is_err());
        assert_eq!(buf.full_length(), 0);
    }

    #[test]
    fn test_strings_and_bools() {
        let mut buf = MemoryBuffer::new();
        let mut data = buf.data();
        data.write_string("héllo", 2).unwrap();
        data.write_bool(true).unwrap();
        data.write_bool(false).unwrap();
        data.write_u8(7).unwrap();
        assert_eq!(data.read_string(2).unwrap(), "héllo");
        assert!(data.read_bool().unwrap());
        assert!(!data.read_bool().unwrap());
        assert!(data.read_bool().is_err());
        assert_eq!(data.read_u8().unwrap(), 7);
    }

    #[test]
    fn test_short_vec_keeps_pointer() {
        let mut buf = MemoryBuffer::from_bytes(vec![0x00, 0x05, b'a', b'b']);
        let err = buf.data().read_vec(2).unwrap_err();
        assert!(err.is_underflow());
        assert_eq!(buf.pointer(), 0);
    }

    #[test]
    fn test_crc32() {
        let mut buf = MemoryBuffer::new();
        buf.data().write_crc32(b"123456789").unwrap();
        // CRC-32/ISO-HDLC check value
        assert_eq!(buf.as_slice(), &[0xCB, 0xF4, 0x39, 0x26]);
        let mut data = buf.data();
        assert!(data.read_and_compare_crc32(b"123456789").unwrap());
        data.buffer().reset_pointer().unwrap();
        assert!(!data.read_and_compare_crc32(b"123456780").unwrap());
    }
}
