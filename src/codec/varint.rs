//! Self-describing variable-length integers.
//!
//! The top 3 bits of the leading byte select the total length (1 to 8
//! bytes); the remaining bits hold the big-endian value. Lengths grow
//! linearly, so mid-size values stay compact:
//!
//! ```text
//! len | prefix | payload bits | range
//! ----|--------|--------------|---------------------------
//!  1  |  000   |      5       | 0 .. 31
//!  2  |  001   |     13       | 32 .. 8_191
//!  3  |  010   |     21       | 8_192 .. 2_097_151
//!  4  |  011   |     29       | 2_097_152 .. 536_870_911
//!  5  |  100   |     37       | .. 2^37 - 1
//!  6  |  101   |     45       | .. 2^45 - 1
//!  7  |  110   |     53       | .. 2^53 - 1
//!  8  |  111   |     61       | .. 2^61 - 1
//! ```
//!
//! Encoding always picks the shortest form and decoding rejects anything
//! else, so every value has exactly one representation.

use crate::error::{EncodingError, FormatError};

const PREFIX_MASK: u8 = 0xE0;

/// A value in `0..=VarInt::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl VarInt {
    /// Largest encodable value, `2^61 - 1`.
    pub const MAX: u64 = (1 << 61) - 1;

    pub fn new(value: u64) -> Result<Self, EncodingError> {
        if value > Self::MAX {
            return Err(EncodingError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Number of bytes the canonical encoding takes.
    pub fn encoded_len(self) -> usize {
        // 5 payload bits in the first byte, 8 more per extra byte.
        let bits = 64 - self.0.leading_zeros() as usize;
        if bits <= 5 { 1 } else { 1 + (bits - 5).div_ceil(8) }
    }

    pub fn encode_into(self, buf: &mut Vec<u8>) {
        let len = self.encoded_len();
        let prefix = ((len - 1) as u64) << (len * 8 - 3);
        let raw = (self.0 | prefix).to_be_bytes();
        buf.extend_from_slice(&raw[8 - len..]);
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Byte length announced by the leading byte. Never fails.
    pub fn length_of(first_byte: u8) -> usize {
        ((first_byte & PREFIX_MASK) >> 5) as usize + 1
    }

    /// Decodes the VarInt at the start of `bytes`, returning it together
    /// with the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), FormatError> {
        let Some(&first) = bytes.first() else {
            return Err(FormatError::Truncated {
                needed: 1,
                available: 0,
            });
        };
        let len = Self::length_of(first);
        if bytes.len() < len {
            return Err(FormatError::Truncated {
                needed: len,
                available: bytes.len(),
            });
        }

        let mut value = u64::from(first & !PREFIX_MASK);
        for &b in &bytes[1..len] {
            value = (value << 8) | u64::from(b);
        }

        let decoded = Self(value);
        if decoded.encoded_len() != len {
            return Err(FormatError::NonCanonicalVarInt { value, len });
        }
        Ok((decoded, len))
    }
}

impl TryFrom<u64> for VarInt {
    type Error = EncodingError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for VarInt {
    type Error = EncodingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(EncodingError::Negative(value));
        }
        Self::new(value as u64)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = EncodingError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

/// Encodes `value` and returns the bytes.
pub fn encode(value: u64) -> Result<Vec<u8>, EncodingError> {
    Ok(VarInt::new(value)?.to_bytes())
}

/// Decodes a VarInt at the start of `bytes` and returns its value.
pub fn decode(bytes: &[u8]) -> Result<u64, FormatError> {
    VarInt::decode(bytes).map(|(v, _)| v.value())
}

/// Byte length implied by a leading byte.
pub fn length_of(first_byte: u8) -> usize {
    VarInt::length_of(first_byte)
}
