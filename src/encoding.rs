//! Fixed-length field helpers for callers.
//!
//! The engine stores opaque byte strings of exactly `key_bytes` /
//! `data_bytes`. These helpers turn numbers and text into such buffers so
//! that byte order matches the natural order of the values.

use crate::common::{Error, Result};

/// Width of an encoded `u64`.
const NUMERIC_WIDTH: usize = std::mem::size_of::<u64>();

/// Big-endian `value`, right-aligned in `len` bytes with leading zeros.
///
/// Byte-wise comparison of the result equals numeric comparison.
///
/// # Errors
/// `Error::KeyLength` if `len` is too short to hold a `u64`.
///
/// # Example
/// ```
/// use plustree::encoding::numeric_key;
///
/// let key = numeric_key(1001, 10).unwrap();
/// assert_eq!(key, [0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0xE9]);
/// assert!(numeric_key(9, 10).unwrap() < key);
/// ```
pub fn numeric_key(value: u64, len: usize) -> Result<Vec<u8>> {
    if len < NUMERIC_WIDTH {
        return Err(Error::KeyLength {
            expected: NUMERIC_WIDTH,
            actual: len,
        });
    }
    let mut key = vec![0u8; len];
    key[len - NUMERIC_WIDTH..].copy_from_slice(&value.to_be_bytes());
    Ok(key)
}

/// UTF-8 `text` in `len` bytes, zero-padded, or truncated if longer.
///
/// Truncation may split a multi-byte character; [`field_to_string`] decodes
/// lossily for that reason.
pub fn text_field(text: &str, len: usize) -> Vec<u8> {
    let mut field = vec![0u8; len];
    let n = text.len().min(len);
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
    field
}

/// `field` without its trailing zero padding.
pub fn trim_padding(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &field[..end]
}

/// Decode a field written by [`text_field`].
pub fn field_to_string(field: &[u8]) -> String {
    String::from_utf8_lossy(trim_padding(field)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_key_orders_like_numbers() {
        let values = [0u64, 1, 255, 256, 1001, 1002, 65_536, u64::MAX];
        let keys: Vec<Vec<u8>> = values.iter().map(|&v| numeric_key(v, 10).unwrap()).collect();
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_numeric_key_exact_width() {
        assert_eq!(numeric_key(1, 8).unwrap(), 1u64.to_be_bytes());
        assert!(matches!(
            numeric_key(1, 4),
            Err(Error::KeyLength { expected: 8, actual: 4 })
        ));
    }

    #[test]
    fn test_text_field_pads_and_truncates() {
        assert_eq!(text_field("abc", 5), b"abc\0\0");
        assert_eq!(text_field("abcdef", 4), b"abcd");
        assert_eq!(text_field("", 2), [0, 0]);
    }

    #[test]
    fn test_trim_padding() {
        assert_eq!(trim_padding(b"ab\0\0"), b"ab");
        assert_eq!(trim_padding(b"a\0b\0"), b"a\0b");
        assert_eq!(trim_padding(&[0, 0]), b"");
    }

    #[test]
    fn test_field_to_string() {
        assert_eq!(field_to_string(&text_field("customer:1001", 32)), "customer:1001");
        // Split multi-byte character.
        let field = text_field("é", 1);
        assert_eq!(field_to_string(&field), "\u{FFFD}");
    }
}
