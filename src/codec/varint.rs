//! Varint encoding and decoding as used by the Avro binary format.
//!
//! Avro uses the Protocol Buffers varint layout (7 data bits per byte,
//! little-endian, MSB as continuation bit) and zigzag encoding for signed
//! integers:
//! - 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
//! - Encoding formula: (n << 1) ^ (n >> 63)
//! - Decoding formula: (n >> 1) ^ -(n & 1)

use crate::error::DecodeError;

/// Decode an unsigned variable-length integer.
///
/// # Errors
/// - `DecodeError::UnexpectedEof` if the input is truncated
/// - `DecodeError::InvalidVarint` if the varint exceeds 10 bytes
#[inline]
pub fn decode_varint(data: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let (&byte, rest) = data.split_first().ok_or(DecodeError::UnexpectedEof)?;
        *data = rest;

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }

        shift += 7;
        if shift >= 64 {
            return Err(DecodeError::InvalidVarint);
        }
    }
}

/// Decode a signed variable-length integer (zigzag encoded).
#[inline]
pub fn decode_zigzag(data: &mut &[u8]) -> Result<i64, DecodeError> {
    let unsigned = decode_varint(data)?;
    Ok(((unsigned >> 1) as i64) ^ (-((unsigned & 1) as i64)))
}

/// Append an unsigned integer as a varint to `buf`.
#[inline]
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Append a signed integer as a zigzag varint to `buf`.
#[inline]
pub fn write_zigzag(buf: &mut Vec<u8>, value: i64) {
    write_varint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        buf
    }

    fn zigzag(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_zigzag(&mut buf, value);
        buf
    }

    #[test]
    fn test_write_varint() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(1), vec![0x01]);
        assert_eq!(varint(127), vec![0x7F]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn test_write_zigzag() {
        assert_eq!(zigzag(0), vec![0x00]);
        assert_eq!(zigzag(-1), vec![0x01]);
        assert_eq!(zigzag(1), vec![0x02]);
        assert_eq!(zigzag(-64), vec![0x7F]);
        assert_eq!(zigzag(64), vec![0x80, 0x01]);
    }

    #[test]
    fn test_decode_zigzag_extremes() {
        for value in [i64::MIN, -1, 0, 1, i64::MAX, 1_557_014_400] {
            let encoded = zigzag(value);
            let mut cursor: &[u8] = &encoded;
            assert_eq!(decode_zigzag(&mut cursor).unwrap(), value);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_decode_varint_truncated() {
        let data: &[u8] = &[0x80, 0x80];
        let mut cursor = data;
        assert!(matches!(
            decode_varint(&mut cursor),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_decode_varint_too_long() {
        let data: &[u8] = &[0xFF; 11];
        let mut cursor = data;
        assert!(matches!(
            decode_varint(&mut cursor),
            Err(DecodeError::InvalidVarint)
        ));
    }
}
