//! Variable-length integers (unsigned LEB128)
//!
//! Every length prefix and record field in the TMod header and the game's
//! `index.tfi` files uses this encoding: groups of 7 bits, least significant
//! group first, with the high bit of each byte set when another byte follows.

use thiserror::Error;

/// Longest possible encoding of a `u64` (ceil(64 / 7))
pub const MAX_VARINT_LEN: usize = 10;

/// Errors produced while decoding a varint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarIntError {
    /// The encoding does not fit in 64 bits
    #[error("varint at offset {offset} exceeds 64 bits")]
    Malformed {
        /// Offset of the first byte of the varint
        offset: usize,
    },

    /// The buffer ended before the final byte
    #[error("buffer ended inside varint starting at offset {offset}")]
    Truncated {
        /// Offset of the first byte of the varint
        offset: usize,
    },
}

/// Encode `value` into a freshly allocated buffer
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode_into(value, &mut out);
    out
}

/// Append the encoding of `value` to `out`
pub fn encode_into(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Number of bytes `encode` produces for `value`
pub const fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint starting at `start`
///
/// Returns the value and the number of bytes consumed.
pub fn decode(buffer: &[u8], start: usize) -> Result<(u64, usize), VarIntError> {
    let mut value = 0u64;

    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = buffer.get(start + i) else {
            return Err(VarIntError::Truncated { offset: start });
        };
        let payload = u64::from(byte & 0x7F);

        // The tenth byte may only carry bit 63
        if i == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(VarIntError::Malformed { offset: start });
        }

        value |= payload << (7 * i);

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(VarIntError::Malformed { offset: start })
}
