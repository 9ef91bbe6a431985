//! Length-then-write contract shared by frames and payloads.

use crate::error::Result;
use serde::Serialize;

/// Something that can serialize itself into a pre-allocated buffer.
///
/// `length` must equal the number of bytes `write` emits: transports size
/// the buffer from `length` before calling `write`.
pub trait BufferWriter {
    fn length(&self) -> usize;

    /// Write exactly `length()` bytes starting at `offset`.
    ///
    /// Panics if `buffer` is too small.
    fn write(&self, buffer: &mut [u8], offset: usize);
}

impl BufferWriter for Vec<u8> {
    fn length(&self) -> usize {
        self.len()
    }

    fn write(&self, buffer: &mut [u8], offset: usize) {
        buffer[offset..offset + self.len()].copy_from_slice(self);
    }
}

impl BufferWriter for [u8] {
    fn length(&self) -> usize {
        self.len()
    }

    fn write(&self, buffer: &mut [u8], offset: usize) {
        buffer[offset..offset + self.len()].copy_from_slice(self);
    }
}

/// Allocate a buffer of exactly `writer.length()` bytes and fill it.
pub fn encode(writer: &dyn BufferWriter) -> Vec<u8> {
    let mut buffer = vec![0u8; writer.length()];
    writer.write(&mut buffer, 0);
    buffer
}

/// Msgpack-encoded document used as a response value or event payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgPackValue(Vec<u8>);

impl MsgPackValue {
    /// Encode a serde value as msgpack with named fields.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(MsgPackValue(rmp_serde::to_vec_named(value)?))
    }

    /// Wrap bytes that are already msgpack.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MsgPackValue(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl BufferWriter for MsgPackValue {
    fn length(&self) -> usize {
        self.0.len()
    }

    fn write(&self, buffer: &mut [u8], offset: usize) {
        self.0.as_slice().write(buffer, offset);
    }
}
