//! Bounds-checked cursor over a byte slice
//!
//! The TMod header and the game index are dense runs of varints and
//! length-prefixed strings with no framing of their own, so every read is
//! checked against the end of the region being parsed.

use crate::varint::{self, VarIntError};
use thiserror::Error;

/// Errors produced by [`ByteReader`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// A read needed more bytes than remain
    #[error("unexpected end of data at offset {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEnd {
        /// Position of the failed read
        offset: usize,
        /// Bytes requested
        needed: usize,
        /// Bytes remaining
        available: usize,
    },

    /// Varint decoding failed
    #[error(transparent)]
    VarInt(#[from] VarIntError),

    /// A string was not valid UTF-8
    #[error("invalid UTF-8 string at offset {offset}")]
    Utf8 {
        /// Position of the string
        offset: usize,
    },
}

impl ReadError {
    /// Whether the error means the data simply ran out
    ///
    /// Truncated varints count as running out; over-long varints do not.
    pub const fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEnd { .. } | Self::VarInt(VarIntError::Truncated { .. })
        )
    }
}

/// Forward-only reader over a borrowed buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader positioned at `pos`
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current position
    pub const fn pos(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying buffer
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying buffer is empty
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Whether every byte has been consumed
    pub const fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Read exactly `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if len > self.remaining() {
            return Err(ReadError::UnexpectedEnd {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read an unsigned LEB128 integer
    pub fn read_varint(&mut self) -> Result<u64, ReadError> {
        let (value, consumed) = varint::decode(self.data, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a varint and check it fits in `usize`
    pub fn read_varint_len(&mut self) -> Result<usize, ReadError> {
        let offset = self.pos;
        let value = self.read_varint()?;
        usize::try_from(value).map_err(|_| ReadError::UnexpectedEnd {
            offset,
            needed: usize::MAX,
            available: self.remaining(),
        })
    }

    /// Read a UTF-8 string of `len` bytes
    pub fn read_str(&mut self, len: usize) -> Result<&'a str, ReadError> {
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| ReadError::Utf8 { offset })
    }

    /// Read a string prefixed by its varint length
    pub fn read_varint_str(&mut self) -> Result<&'a str, ReadError> {
        let len = self.read_varint_len()?;
        self.read_str(len)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x03, b'a', b'b', b'c', 0xAC, 0x02, 0x07];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_varint_str().expect("string"), "abc");
        assert_eq!(reader.read_varint().expect("varint"), 300);
        assert_eq!(reader.read_u8().expect("byte"), 7);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_read_past_end() {
        let data = [0x05, b'a'];
        let mut reader = ByteReader::new(&data);

        let err = reader.read_varint_str().unwrap_err();
        assert!(err.is_truncation());
        assert_eq!(
            err,
            ReadError::UnexpectedEnd {
                offset: 1,
                needed: 5,
                available: 1
            }
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_varint_str(), Err(ReadError::Utf8 { offset: 1 }));
    }

    #[test]
    fn test_overlong_varint_is_not_truncation() {
        let data = [0xFF; 12];
        let err = ByteReader::new(&data).read_varint().unwrap_err();
        assert!(!err.is_truncation());
    }
}
