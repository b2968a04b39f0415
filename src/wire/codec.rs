// ABOUTME: Positional SSH-style encoding primitives (u8, u32, length-prefixed blobs).
// ABOUTME: Records implement Encode/Decode; nested records travel as opaque blobs.

use super::error::FormatError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A record that can be written field by field in declaration order.
pub trait Encode {
    fn encode(&self, writer: &mut WireWriter);
}

/// A record that can be read back field by field in declaration order.
pub trait Decode: Sized {
    fn decode(reader: &mut WireReader<'_>) -> Result<Self, FormatError>;
}

/// Encode a record into a fresh buffer.
pub fn encode<T: Encode>(value: &T) -> Bytes {
    let mut writer = WireWriter::new();
    value.encode(&mut writer);
    writer.finish()
}

/// Decode a record, rejecting any bytes left over after the last field.
pub fn decode<T: Decode>(data: &[u8]) -> Result<T, FormatError> {
    let mut reader = WireReader::new(data);
    let value = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Append-only writer over a growable buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Write a 4-byte big-endian length followed by the raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Write an inner record as an opaque length-prefixed blob.
    pub fn put_nested<T: Encode>(&mut self, inner: &T) {
        let encoded = encode(inner);
        self.put_bytes(&encoded);
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a borrowed input slice.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    total: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            total: data.len(),
        }
    }

    /// Current position from the start of the input.
    pub fn offset(&self) -> usize {
        self.total - self.data.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn need(&self, needed: usize) -> Result<(), FormatError> {
        if self.data.remaining() < needed {
            return Err(FormatError::Truncated {
                offset: self.offset(),
                needed,
                available: self.data.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        self.need(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        self.need(4)?;
        Ok(self.data.get_u32())
    }

    pub fn read_bytes(&mut self) -> Result<Bytes, FormatError> {
        let offset = self.offset();
        let length = self.read_u32()? as usize;
        if length > self.data.remaining() {
            return Err(FormatError::LengthOverflow {
                offset,
                length,
                available: self.data.remaining(),
            });
        }
        Ok(self.data.copy_to_bytes(length))
    }

    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let offset = self.offset();
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidUtf8 { offset })
    }

    /// Read a length-prefixed blob and decode it as a complete inner record.
    pub fn read_nested<T: Decode>(&mut self) -> Result<T, FormatError> {
        let blob = self.read_bytes()?;
        decode(&blob)
    }

    /// Fail if any input is left unconsumed.
    pub fn finish(self) -> Result<(), FormatError> {
        match self.data.remaining() {
            0 => Ok(()),
            count => Err(FormatError::TrailingBytes { count }),
        }
    }
}
