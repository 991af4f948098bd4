/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length prefix is not a valid varint within the allowed width.
    #[error("invalid length prefix (longer than {max_bytes} bytes)")]
    InvalidLengthPrefix { max_bytes: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended after a length prefix but before the full body.
    #[error("stream ended mid-frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },

    /// The stream ended inside a length prefix.
    #[error("stream ended inside a length prefix")]
    TruncatedPrefix,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed cleanly before another frame started.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
