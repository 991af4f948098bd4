use crate::peer::PeerId;

/// Errors reported by a connection substrate.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side has no handler for the requested protocol.
    #[error("protocol {protocol} not supported by {peer}")]
    ProtocolNotSupported { peer: PeerId, protocol: String },

    /// A handler is already registered for this protocol.
    #[error("protocol {protocol} already has a handler")]
    DuplicateProtocol { protocol: String },

    /// The connection to the peer is closed.
    #[error("connection to {peer} closed")]
    ConnectionClosed { peer: PeerId },

    /// No node with this identity exists on the network.
    #[error("unknown peer {peer}")]
    UnknownPeer { peer: PeerId },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
