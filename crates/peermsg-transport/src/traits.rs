use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::peer::PeerId;
use crate::stream::PeerStream;

/// An established transport session with one remote peer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of the peer at the other end.
    fn remote_peer(&self) -> &PeerId;

    /// Whether the connection can still open streams.
    fn is_open(&self) -> bool;

    /// Open a new stream negotiated for `protocol`.
    async fn new_stream(&self, protocol: &str) -> Result<PeerStream>;
}

/// Directory of currently open connections.
pub trait ConnectionManager: Send + Sync {
    /// Snapshot of all open connections.
    fn connections(&self) -> Vec<Arc<dyn Connection>>;

    /// First open connection to `peer`, if any.
    fn connection_to(&self, peer: &PeerId) -> Option<Arc<dyn Connection>> {
        self.connections()
            .into_iter()
            .find(|conn| conn.is_open() && conn.remote_peer() == peer)
    }
}

/// A stream opened by a remote peer for a protocol we registered.
pub struct IncomingStream {
    pub stream: PeerStream,
    pub connection: Arc<dyn Connection>,
}

/// Callback invoked by a [`Registrar`] for every matching inbound stream.
///
/// Called from within the substrate's async context; implementations
/// should hand the stream off to a task rather than block.
pub type StreamHandler = Arc<dyn Fn(IncomingStream) + Send + Sync>;

/// Protocol registration facility.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Route inbound streams for `protocol` to `handler`.
    async fn handle(&self, protocol: &str, handler: StreamHandler) -> Result<()>;

    /// Stop routing `protocol`. Unknown protocols are ignored.
    async fn unhandle(&self, protocol: &str) -> Result<()>;
}
