//! Varint length-prefixed message framing.
//!
//! Every message on the wire is `varint(len) || bytes[len]`, repeated, with
//! no outer envelope. The length is an unsigned LEB128 varint (7 bits per
//! byte, least significant group first), the same scheme used by common
//! length-prefix framing libraries.
//!
//! Callers always get whole messages back, regardless of how the underlying
//! stream chunks its reads.

pub mod codec;
pub mod error;
pub mod framed;
pub mod reader;
pub mod varint;
pub mod writer;

pub use codec::{
    decode_message, encode_message, frame_len, FrameConfig, DEFAULT_MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use framed::{decode, encode, MessageCodec, MessageSink, MessageStream};
pub use reader::FrameReader;
pub use varint::MAX_LENGTH_PREFIX_BYTES;
pub use writer::FrameWriter;
