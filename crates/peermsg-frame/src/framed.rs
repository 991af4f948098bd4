//! Async framing over tokio byte streams.
//!
//! [`decode`] turns any `AsyncRead` into a lazy stream of whole messages and
//! [`encode`] turns any `AsyncWrite` into a sink of messages. Both are thin
//! wrappers over `tokio_util::codec` with [`MessageCodec`].

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::{debug, trace};

use crate::codec::{decode_message, encode_message, truncation, FrameConfig};
use crate::error::{FrameError, Result};

/// Lazy, non-restartable sequence of messages decoded from `R`.
pub type MessageStream<R> = FramedRead<R, MessageCodec>;

/// Sink that frames each message written to it onto `W`.
pub type MessageSink<W> = FramedWrite<W, MessageCodec>;

/// `tokio_util` codec for varint length-prefixed messages.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload_size: usize,
}

impl MessageCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let message = decode_message(src, self.max_payload_size)?;
        if let Some(message) = &message {
            trace!(size = message.len(), "decoded message");
        }
        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        match truncation(src) {
            None => Ok(None),
            Some(err) => {
                debug!(buffered = src.len(), error = %err, "stream ended mid-frame");
                src.clear();
                Err(err)
            }
        }
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, message: Bytes, dst: &mut BytesMut) -> Result<()> {
        if message.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: message.len(),
                max: self.max_payload_size,
            });
        }
        encode_message(&message, dst);
        Ok(())
    }
}

/// Decode a byte stream into whole messages.
pub fn decode<R: AsyncRead>(reader: R, config: &FrameConfig) -> MessageStream<R> {
    FramedRead::new(reader, MessageCodec::with_config(config))
}

/// Frame messages onto a byte stream, preserving order.
pub fn encode<W: AsyncWrite>(writer: W, config: &FrameConfig) -> MessageSink<W> {
    FramedWrite::new(writer, MessageCodec::with_config(config))
}
