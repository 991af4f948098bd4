use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::varint::{decode_varint, encode_varint, encoded_len};

/// Default maximum payload size: 4 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 4 * 1024 * 1024;

/// The total wire size of a message with `payload_len` bytes (prefix + payload).
pub fn frame_len(payload_len: usize) -> usize {
    encoded_len(payload_len as u64) + payload_len
}

/// Encode one message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┬──────────────────────┐
/// │ Length (varint, 1-8B)│ Payload              │
/// │ LEB128, low group    │ (Length bytes)       │
/// │ first                │                      │
/// └──────────────────────┴──────────────────────┘
/// ```
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(frame_len(payload.len()));
    encode_varint(payload.len() as u64, dst);
    dst.extend_from_slice(payload);
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A declared length
/// above `max_payload` is rejected before any body bytes are waited for.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some((declared, prefix_len)) = decode_varint(&src[..])? else {
        return Ok(None); // Need more data
    };

    let payload_len = usize::try_from(declared).unwrap_or(usize::MAX);
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = prefix_len + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None); // Need more data
    }

    src.advance(prefix_len);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Classify bytes left over when a stream ends.
///
/// Returns `None` when nothing is buffered, i.e. the stream ended cleanly
/// between frames.
pub(crate) fn truncation(src: &[u8]) -> Option<FrameError> {
    if src.is_empty() {
        return None;
    }
    match decode_varint(src) {
        Ok(Some((declared, prefix_len))) => Some(FrameError::Truncated {
            expected: usize::try_from(declared).unwrap_or(usize::MAX),
            received: src.len() - prefix_len,
        }),
        Ok(None) => Some(FrameError::TruncatedPrefix),
        Err(err) => Some(err),
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 4 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
