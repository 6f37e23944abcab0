//! Binary data parsing utilities shared by the container and record layers.
//!
//! This module provides functions for reading little-endian integers and for
//! decoding the two string encodings both layers use: UTF-16LE and the
//! "compressed" single-byte form (ISO-8859-1, one byte per UTF-16 code unit).

use encoding_rs::UTF_16LE;
use zerocopy::{F64, FromBytes, LE, U16, U32, U64};

/// Binary parsing error type
#[derive(Debug, Clone)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    ParseError(String),
}

impl std::fmt::Display for BinaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryError::InsufficientData {
                expected,
                available,
            } => {
                write!(
                    f,
                    "Insufficient data: expected {}, got {}",
                    expected, available
                )
            },
            BinaryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for BinaryError {}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

#[inline]
fn slice_at(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(BinaryError::InsufficientData {
            expected: offset.saturating_add(len),
            available: data.len(),
        }),
    }
}

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use olecore::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    U16::<LE>::read_from_bytes(slice_at(data, offset, 2)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read a little-endian u32 from a byte slice at the given offset.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    U32::<LE>::read_from_bytes(slice_at(data, offset, 4)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Read a little-endian u64 from a byte slice at the given offset.
#[inline]
pub fn read_u64_le(data: &[u8], offset: usize) -> BinaryResult<u64> {
    U64::<LE>::read_from_bytes(slice_at(data, offset, 8)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u64".to_string()))
}

/// Read a little-endian f64 from a byte slice at the given offset.
#[inline]
pub fn read_f64_le(data: &[u8], offset: usize) -> BinaryResult<f64> {
    F64::<LE>::read_from_bytes(slice_at(data, offset, 8)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read f64".to_string()))
}

/// Decode UTF-16LE bytes, replacing unpaired surrogates and stopping at the
/// first NUL code unit.
///
/// # Examples
///
/// ```
/// use olecore::common::binary::decode_utf16le;
/// let data = [0x48, 0x00, 0x69, 0x00, 0x00, 0x00, 0x41, 0x00];
/// assert_eq!(decode_utf16le(&data), "Hi");
/// ```
pub fn decode_utf16le(data: &[u8]) -> String {
    let (decoded, _) = UTF_16LE.decode_without_bom_handling(data);
    match decoded.find('\0') {
        Some(end) => decoded[..end].to_string(),
        None => decoded.into_owned(),
    }
}

/// Decode UTF-16LE bytes exactly, failing on malformed input.
///
/// Used where the decoded string must re-encode to the same bytes.
pub fn decode_utf16le_strict(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    UTF_16LE
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|s| s.into_owned())
}

/// Decode "compressed" single-byte characters (each byte is the low byte of
/// a UTF-16 code unit whose high byte is zero).
pub fn decode_compressed(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Encode a string as UTF-16LE bytes.
pub fn encode_utf16le(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_out_of_bounds() {
        let data = [0u8; 3];
        assert!(matches!(
            read_u32_le(&data, 0),
            Err(BinaryError::InsufficientData {
                expected: 4,
                available: 3
            })
        ));
        assert!(read_u16_le(&data, usize::MAX).is_err());
    }

    #[test]
    fn test_utf16_roundtrip() {
        let encoded = encode_utf16le("Root Entry");
        assert_eq!(decode_utf16le(&encoded), "Root Entry");
        assert_eq!(decode_utf16le_strict(&encoded).as_deref(), Some("Root Entry"));
    }

    #[test]
    fn test_strict_rejects_lone_surrogate() {
        assert_eq!(decode_utf16le_strict(&[0x00, 0xD8]), None);
        assert_eq!(decode_utf16le_strict(&[0x41]), None);
    }

    #[test]
    fn test_compressed_is_latin1() {
        assert_eq!(decode_compressed(&[0x41, 0xE9]), "Aé");
    }
}
