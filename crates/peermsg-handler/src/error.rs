use peermsg_transport::{PeerId, TransportError};

/// Errors that can occur in message handler operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// No open connection to the target peer.
    #[error("peer {peer} is not connected")]
    NotConnected { peer: PeerId },

    /// The substrate failed to open an outbound stream.
    #[error("failed to open stream to {peer}: {source}")]
    StreamOpen {
        peer: PeerId,
        #[source]
        source: TransportError,
    },

    /// The peer's outbound queue no longer has a write loop behind it.
    #[error("outbound queue to {peer} is closed")]
    QueueClosed { peer: PeerId },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] peermsg_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, HandlerError>;
