//! Unsigned LEB128 varints used for frame length prefixes.

use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Maximum number of bytes accepted in a length prefix.
///
/// Eight groups of seven bits cover lengths far beyond any sane frame size.
pub const MAX_LENGTH_PREFIX_BYTES: usize = 8;

/// Number of bytes `value` occupies when varint-encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append the minimal varint encoding of `value`.
pub fn encode_varint(mut value: u64, dst: &mut impl BufMut) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            break;
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Decode a varint length prefix from the start of `src`.
///
/// Returns `Ok(None)` if `src` ends before the prefix does, or the decoded
/// value and the number of prefix bytes consumed.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value: u64 = 0;
    for (i, &byte) in src.iter().take(MAX_LENGTH_PREFIX_BYTES).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if src.len() >= MAX_LENGTH_PREFIX_BYTES {
        return Err(FrameError::InvalidLengthPrefix {
            max_bytes: MAX_LENGTH_PREFIX_BYTES,
        });
    }
    Ok(None) // Need more data
}
