//! Byte-level building blocks shared by every binary layout.
//!
//! Writers append to a `Vec<u8>`; readers take a slice and hand back the
//! decoded value together with the unread remainder.

pub mod varint;

pub use varint::VarInt;

use crate::error::{EncodingError, FormatError};

pub fn put_varint(buf: &mut Vec<u8>, value: u64) -> Result<(), EncodingError> {
    VarInt::new(value)?.encode_into(buf);
    Ok(())
}

pub fn put_len(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodingError> {
    put_varint(buf, len as u64)
}

/// Length-prefixed UTF-8 string. The prefix counts bytes, not characters.
pub fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<(), EncodingError> {
    put_len(buf, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn take_varint(data: &[u8]) -> Result<(u64, &[u8]), FormatError> {
    let (v, used) = VarInt::decode(data)?;
    Ok((v.value(), &data[used..]))
}

pub fn take_u8(data: &[u8]) -> Result<(u8, &[u8]), FormatError> {
    match data.split_first() {
        Some((&b, rest)) => Ok((b, rest)),
        None => Err(FormatError::Truncated {
            needed: 1,
            available: 0,
        }),
    }
}

pub fn take_bytes(data: &[u8], n: usize) -> Result<(&[u8], &[u8]), FormatError> {
    if data.len() < n {
        return Err(FormatError::Truncated {
            needed: n,
            available: data.len(),
        });
    }
    Ok(data.split_at(n))
}

pub fn take_array<const N: usize>(data: &[u8]) -> Result<([u8; N], &[u8]), FormatError> {
    let (bytes, rest) = take_bytes(data, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok((out, rest))
}

pub fn take_str(data: &[u8]) -> Result<(String, &[u8]), FormatError> {
    let (len, rest) = take_varint(data)?;
    let (bytes, rest) = take_bytes(rest, len as usize)?;
    let s = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8)?;
    Ok((s.to_string(), rest))
}

/// Fails unless every byte has been consumed.
pub fn expect_end(rest: &[u8]) -> Result<(), FormatError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(FormatError::TrailingBytes(rest.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_layout() {
        let mut buf = Vec::new();
        put_str(&mut buf, "test").unwrap();
        assert_eq!(buf, b"\x04test");

        let (s, rest) = take_str(&buf).unwrap();
        assert_eq!(s, "test");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_str_length_counts_bytes() {
        let mut buf = Vec::new();
        put_str(&mut buf, "élodie").unwrap();
        assert_eq!(buf[0] as usize, "élodie".len());
        assert_eq!(take_str(&buf).unwrap().0, "élodie");
    }

    #[test]
    fn test_take_str_rejects_bad_input() {
        assert_eq!(
            take_str(b"\x05ab"),
            Err(FormatError::Truncated {
                needed: 5,
                available: 2
            })
        );
        assert_eq!(take_str(b"\x02\xff\xfe"), Err(FormatError::InvalidUtf8));
    }

    #[test]
    fn test_take_array_and_end() {
        let data = [1u8, 2, 3, 4, 5];
        let (arr, rest) = take_array::<4>(&data).unwrap();
        assert_eq!(arr, [1, 2, 3, 4]);
        assert_eq!(expect_end(rest), Err(FormatError::TrailingBytes(1)));
        assert!(take_array::<8>(&data).is_err());
    }
}
