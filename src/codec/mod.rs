//! Flat byte-buffer codec for message payloads.
//!
//! Fields serialize in declared order. Multi-byte integers are big-endian.
//! Byte arrays carry exactly one length treatment: fixed-width with zero
//! padding, or a 1/2-byte big-endian length prefix.

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;

/// Width of the length prefix in front of a variable byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    One,
    Two,
}

impl PrefixWidth {
    /// Largest byte count representable by this prefix.
    pub fn max_len(self) -> usize {
        match self {
            Self::One => u8::MAX as usize,
            Self::Two => u16::MAX as usize,
        }
    }

    fn width(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Messages that serialize themselves against a flat payload buffer.
pub trait PayloadCodec: Sized {
    fn encode_payload(&self, w: &mut PayloadWriter) -> Result<(), CodecError>;
    fn decode_payload(r: &mut PayloadReader<'_>) -> Result<Self, CodecError>;
}

/// Append-only payload builder.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Reserved hook for variable-width integers. Zone and partition
    /// numbers encode as one byte until a counter-example appears.
    pub fn put_compact_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Write exactly `width` bytes: shorter values are right-padded with
    /// zeros, longer values are truncated.
    pub fn put_fixed(&mut self, value: &[u8], width: usize) {
        let take = value.len().min(width);
        self.buf.put_slice(&value[..take]);
        self.buf.put_bytes(0x00, width - take);
    }

    /// Write a big-endian length prefix of the given width, then the bytes.
    pub fn put_prefixed(
        &mut self,
        field: &'static str,
        value: &[u8],
        prefix: PrefixWidth,
    ) -> Result<(), CodecError> {
        if value.len() > prefix.max_len() {
            return Err(CodecError::LengthOverflow {
                field,
                len: value.len(),
                max: prefix.width(),
            });
        }
        match prefix {
            PrefixWidth::One => self.buf.put_u8(value.len() as u8),
            PrefixWidth::Two => self.buf.put_u16(value.len() as u16),
        }
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Cursor over a received payload slice.
///
/// Failed reads name the field and the offset at which decoding stopped.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::ShortBuffer {
                field,
                offset: self.pos,
                needed: n - (self.buf.len() - self.pos),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(field, 1)?[0])
    }

    pub fn read_i8(&mut self, field: &'static str) -> Result<i8, CodecError> {
        Ok(self.take(field, 1)?[0] as i8)
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        let b = self.take(field, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        let b = self.take(field, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reserved hook mirroring [`PayloadWriter::put_compact_u8`].
    pub fn read_compact_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        self.read_u8(field)
    }

    pub fn read_fixed<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn read_prefixed(
        &mut self,
        field: &'static str,
        prefix: PrefixWidth,
    ) -> Result<Vec<u8>, CodecError> {
        let len = match prefix {
            PrefixWidth::One => self.read_u8(field)? as usize,
            PrefixWidth::Two => self.read_u16(field)? as usize,
        };
        Ok(self.take(field, len)?.to_vec())
    }

    /// Consume everything left in the buffer.
    pub fn read_rest(&mut self) -> Vec<u8> {
        let rest = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
