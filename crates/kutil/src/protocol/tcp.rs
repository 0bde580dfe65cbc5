// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw TCP layer: bytes in, bytes out.

use super::{Message, Protocol, Unpack, UnpackResult};
use crate::buffer::{ByteBuffer, MemoryBuffer};
use crate::error::Error;

/// Bottom layer of every stack. Passes bytes through unchanged.
#[derive(Debug, Default)]
pub struct TcpProtocol;

impl TcpProtocol {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for TcpProtocol {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn unpack_subprotocol(
        &mut self,
        input: &mut dyn ByteBuffer,
        output: &mut MemoryBuffer,
    ) -> UnpackResult<()> {
        if input.left_length() == 0 {
            return Err(Unpack::NeedMoreData);
        }
        output.extend(&input.read_rest()?);
        Ok(())
    }

    fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
        if input.left_length() == 0 {
            return Err(Unpack::NeedMoreData);
        }
        Ok(Message::Raw(input.read_rest()?))
    }

    fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
        match msg {
            Message::Raw(bytes) => {
                out.extend(&bytes);
                Ok(())
            }
            other => Err(Error::Unsupported(format!(
                "tcp layer cannot pack a {} message",
                other.kind()
            ))),
        }
    }

    fn pack_subprotocol(&mut self, _payload: &mut MemoryBuffer) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut tcp = TcpProtocol::new();
        let mut input = MemoryBuffer::from_bytes(b"abc".to_vec());
        let mut output = MemoryBuffer::new();
        tcp.unpack_subprotocol(&mut input, &mut output).unwrap();
        assert_eq!(output.as_slice(), b"abc");
        assert!(matches!(
            tcp.unpack_subprotocol(&mut input, &mut output),
            Err(Unpack::NeedMoreData)
        ));

        let mut out = MemoryBuffer::new();
        tcp.pack_data(Message::Raw(b"xyz".to_vec()), &mut out).unwrap();
        tcp.pack_subprotocol(&mut out).unwrap();
        assert_eq!(out.as_slice(), b"xyz");
    }
}
