// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered protocol layers and their input buffers.

use super::{Message, Protocol, Unpack};
use crate::buffer::{BufferError, ByteBuffer, MemoryBuffer};
use crate::error::Error;

/// Outcome of one parse attempt.
#[derive(Debug)]
pub enum Step {
    /// Nothing complete is buffered.
    Idle,
    /// The outermost layer produced a message.
    Message(Message),
    /// A middle layer stopped on one of its own units.
    Control {
        /// Layer index
        layer: usize,
        /// Unit to hand to `on_data_inner`
        msg: Message,
    },
    /// A layer failed to parse its input.
    Failure {
        /// Layer index
        layer: usize,
        /// Cause
        err: Error,
    },
}

/// Layers of a connection, lowest first.
///
/// `buffers[i]` is the input of layer `i`; `buffers[0]` is the staging
/// buffer fed by the socket. There is always one more buffer than layers:
/// the last one holds bytes left behind by a removed layer, which become
/// the input of the next layer added.
pub struct ProtocolStack {
    layers: Vec<Box<dyn Protocol>>,
    buffers: Vec<MemoryBuffer>,
}

impl Default for ProtocolStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolStack {
    /// Empty stack with an empty staging buffer.
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            buffers: vec![MemoryBuffer::new()],
        }
    }

    /// Stack holding `layers` in order.
    pub fn with_layers(layers: Vec<Box<dyn Protocol>>) -> Self {
        let mut stack = Self::new();
        for layer in layers {
            stack.add_protocol(layer);
        }
        stack
    }

    /// Push a layer on top.
    pub fn add_protocol(&mut self, layer: Box<dyn Protocol>) {
        log::debug!("[stack] add layer {} at {}", layer.name(), self.layers.len());
        self.layers.push(layer);
        self.buffers.push(MemoryBuffer::new());
    }

    /// Drop the layer at `index` and every layer above it.
    ///
    /// Unparsed input of the removed layer is kept for the next layer added.
    pub fn remove_protocol(&mut self, index: usize) {
        if index >= self.layers.len() {
            return;
        }
        for layer in self.layers.drain(index..) {
            log::debug!("[stack] remove layer {}", layer.name());
        }
        self.buffers.truncate(index + 1);
    }

    /// Index of the first layer named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name() == name)
    }

    /// Layer names, lowest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Index of the outermost layer.
    pub fn outermost(&self) -> Option<usize> {
        self.layers.len().checked_sub(1)
    }

    /// Unread bytes held across every layer input.
    pub fn buffered(&self) -> usize {
        self.buffers.iter().map(|b| b.full_length()).sum()
    }

    /// Append received bytes to the staging buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffers[0].extend(bytes);
    }

    pub(crate) fn layer_mut(&mut self, index: usize) -> Option<&mut (dyn Protocol + 'static)> {
        self.layers.get_mut(index).map(|l| l.as_mut())
    }

    /// Run one parse attempt over all layers.
    pub fn unpack_next(&mut self) -> Step {
        match self.try_unpack() {
            Ok(step) | Err(step) => step,
        }
    }

    fn try_unpack(&mut self) -> Result<Step, Step> {
        let Some(last) = self.outermost() else {
            return Ok(Step::Idle);
        };

        for i in 0..last {
            let (lower, upper) = self.buffers.split_at_mut(i + 1);
            let input = &mut lower[i];
            let output = &mut upper[0];
            let layer = &mut self.layers[i];
            loop {
                if input.full_length() == 0 {
                    break;
                }
                input.reset_pointer().map_err(|e| failure(i, e))?;
                match layer.unpack_subprotocol(input, output) {
                    Ok(()) => {
                        let advanced = input.pointer() > 0;
                        input.reset_before_pointer().map_err(|e| failure(i, e))?;
                        if !advanced {
                            break;
                        }
                    }
                    Err(Unpack::NeedMoreData) => {
                        input.reset_pointer().map_err(|e| failure(i, e))?;
                        break;
                    }
                    Err(Unpack::Stop(msg)) => {
                        input.reset_before_pointer().map_err(|e| failure(i, e))?;
                        return Ok(Step::Control { layer: i, msg });
                    }
                    Err(Unpack::Fail(err)) => return Ok(Step::Failure { layer: i, err }),
                }
            }
        }

        let input = &mut self.buffers[last];
        if input.full_length() == 0 {
            return Ok(Step::Idle);
        }
        input.reset_pointer().map_err(|e| failure(last, e))?;
        let step = match self.layers[last].unpack_data(input) {
            Ok(msg) => {
                input.reset_before_pointer().map_err(|e| failure(last, e))?;
                Step::Message(msg)
            }
            Err(Unpack::NeedMoreData) => {
                input.reset_pointer().map_err(|e| failure(last, e))?;
                Step::Idle
            }
            Err(Unpack::Stop(msg)) => {
                input.reset_before_pointer().map_err(|e| failure(last, e))?;
                Step::Control { layer: last, msg }
            }
            Err(Unpack::Fail(err)) => Step::Failure { layer: last, err },
        };
        Ok(step)
    }

    /// Pack `msg` at layer `begin`, then wrap it through every layer below.
    pub fn pack(&mut self, begin: usize, msg: Message) -> Result<Vec<u8>, Error> {
        let layer = self.layers.get_mut(begin).ok_or_else(|| {
            Error::Unsupported(format!("no protocol layer at index {}", begin))
        })?;
        let mut out = MemoryBuffer::new();
        layer.pack_data(msg, &mut out)?;
        self.pack_below(begin, out)
    }

    /// Wrap bytes already framed by layer `layer` through the layers below it.
    pub fn pack_raw(&mut self, layer: usize, bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
        self.pack_below(layer, MemoryBuffer::from_bytes(bytes))
    }

    fn pack_below(&mut self, begin: usize, mut payload: MemoryBuffer) -> Result<Vec<u8>, Error> {
        let end = begin.min(self.layers.len());
        for layer in self.layers[..end].iter_mut().rev() {
            layer.pack_subprotocol(&mut payload)?;
        }
        Ok(payload.into_inner())
    }
}

fn failure(layer: usize, err: BufferError) -> Step {
    Step::Failure {
        layer,
        err: err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;
    use crate::protocol::{TcpProtocol, UnpackResult};

    /// Length-prefixed framing: 1-byte length, then payload.
    struct Frames;

    impl Protocol for Frames {
        fn name(&self) -> &'static str {
            "frames"
        }

        fn unpack_subprotocol(
            &mut self,
            input: &mut dyn ByteBuffer,
            output: &mut MemoryBuffer,
        ) -> UnpackResult<()> {
            let len = input.read_byte()? as usize;
            if len == 0 {
                return Err(Unpack::Stop(Message::Raw(Vec::new())));
            }
            output.extend(&input.read(len)?);
            Ok(())
        }

        fn unpack_data(&mut self, input: &mut dyn ByteBuffer) -> UnpackResult<Message> {
            let len = input.read_byte()? as usize;
            Ok(Message::Raw(input.read(len)?))
        }

        fn pack_data(&mut self, msg: Message, out: &mut MemoryBuffer) -> Result<(), Error> {
            match msg {
                Message::Raw(bytes) => {
                    out.extend(&[bytes.len() as u8]);
                    out.extend(&bytes);
                    Ok(())
                }
                other => Err(Error::Unsupported(other.kind().to_string())),
            }
        }

        fn pack_subprotocol(&mut self, payload: &mut MemoryBuffer) -> Result<(), Error> {
            let inner = payload.take();
            payload.extend(&[inner.len() as u8]);
            payload.extend(&inner);
            Ok(())
        }
    }

    fn raw(step: Step) -> Vec<u8> {
        match step {
            Step::Message(Message::Raw(bytes)) => bytes,
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_partial_input_waits() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(TcpProtocol::new()), Box::new(Frames)]);
        stack.feed(&[3, b'a']);
        assert!(matches!(stack.unpack_next(), Step::Idle));
        stack.feed(&[b'b', b'c', 1]);
        assert_eq!(raw(stack.unpack_next()), b"abc");
        assert!(matches!(stack.unpack_next(), Step::Idle));
        stack.feed(b"z");
        assert_eq!(raw(stack.unpack_next()), b"z");
    }

    #[test]
    fn test_middle_layer_unwraps_across_reads() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(Frames), Box::new(Frames)]);
        // outer frame of 2 carries inner [1, 'x']; second outer frame split
        stack.feed(&[2, 1, b'x', 2, 1]);
        assert_eq!(raw(stack.unpack_next()), b"x");
        assert!(matches!(stack.unpack_next(), Step::Idle));
        stack.feed(b"y");
        assert_eq!(raw(stack.unpack_next()), b"y");
    }

    #[test]
    fn test_stop_yields_control() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(Frames), Box::new(Frames)]);
        stack.feed(&[0, 2, 1, b'q']);
        assert!(matches!(
            stack.unpack_next(),
            Step::Control { layer: 0, .. }
        ));
        assert_eq!(raw(stack.unpack_next()), b"q");
    }

    #[test]
    fn test_pack_wraps_downwards() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(Frames), Box::new(Frames)]);
        let bytes = stack.pack(1, Message::Raw(b"hi".to_vec())).unwrap();
        assert_eq!(bytes, vec![3, 2, b'h', b'i']);
        let bytes = stack.pack_raw(1, b"hi".to_vec()).unwrap();
        assert_eq!(bytes, vec![2, b'h', b'i']);
        assert!(stack.pack(5, Message::Raw(vec![])).is_err());
    }

    #[test]
    fn test_remove_keeps_pending_input() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(TcpProtocol::new()), Box::new(Frames)]);
        stack.feed(&[1, b'a', 1, b'b']);
        assert_eq!(raw(stack.unpack_next()), b"a");
        stack.remove_protocol(1);
        assert_eq!(stack.names(), vec!["tcp"]);
        stack.add_protocol(Box::new(Frames));
        assert_eq!(stack.position("frames"), Some(1));
        assert_eq!(raw(stack.unpack_next()), b"b");
    }

    #[test]
    fn test_buffered_counts_every_layer() {
        let mut stack = ProtocolStack::with_layers(vec![Box::new(TcpProtocol::new()), Box::new(Frames)]);
        stack.feed(&[5, b'a', b'b']);
        assert!(matches!(stack.unpack_next(), Step::Idle));
        assert_eq!(stack.buffered(), 3);
        stack.feed(&[b'c', b'd', b'e']);
        assert_eq!(raw(stack.unpack_next()), b"abcde");
        assert_eq!(stack.buffered(), 0);
    }
}
