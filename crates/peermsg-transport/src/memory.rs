use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::peer::PeerId;
use crate::stream::PeerStream;
use crate::traits::{Connection, ConnectionManager, IncomingStream, Registrar, StreamHandler};

/// Default in-flight byte capacity of each memory stream direction.
pub const DEFAULT_STREAM_BUFFER: usize = 64 * 1024;

/// In-process network of [`MemoryNode`]s.
///
/// Nodes find each other by [`PeerId`]. Connections are symmetric pairs and
/// every stream is a `tokio::io::duplex`, so back-pressure and half-close
/// behave like a real multiplexed stream.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    nodes: DashMap<PeerId, Weak<NodeState>>,
    stream_buffer: usize,
}

struct NodeState {
    peer_id: PeerId,
    handlers: DashMap<String, StreamHandler>,
    connections: DashMap<PeerId, Arc<MemoryConnection>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_stream_buffer(DEFAULT_STREAM_BUFFER)
    }

    /// Create a network whose streams buffer at most `stream_buffer` bytes
    /// per direction before writers wait.
    pub fn with_stream_buffer(stream_buffer: usize) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                nodes: DashMap::new(),
                stream_buffer: stream_buffer.max(1),
            }),
        }
    }

    /// Add a node with the given identity.
    ///
    /// A node stays reachable while any clone of the returned handle lives.
    /// Reusing an identity replaces the previous node.
    pub fn add_node(&self, id: &str) -> MemoryNode {
        let peer_id = PeerId::new(id);
        let state = Arc::new(NodeState {
            peer_id: peer_id.clone(),
            handlers: DashMap::new(),
            connections: DashMap::new(),
        });
        self.inner.nodes.insert(peer_id, Arc::downgrade(&state));
        MemoryNode {
            state,
            network: self.clone(),
        }
    }

    fn lookup(&self, peer: &PeerId) -> Option<Arc<NodeState>> {
        self.inner.nodes.get(peer).and_then(|node| node.upgrade())
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer on a [`MemoryNetwork`].
///
/// Acts as both the [`ConnectionManager`] and the [`Registrar`] for that
/// peer.
#[derive(Clone)]
pub struct MemoryNode {
    state: Arc<NodeState>,
    network: MemoryNetwork,
}

impl MemoryNode {
    pub fn peer_id(&self) -> &PeerId {
        &self.state.peer_id
    }

    /// Open (or reuse) a connection to `peer`.
    pub fn dial(&self, peer: &PeerId) -> Result<Arc<MemoryConnection>> {
        if peer == self.peer_id() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot dial self",
            )));
        }

        let existing = self
            .state
            .connections
            .get(peer)
            .map(|conn| Arc::clone(conn.value()));
        if let Some(conn) = existing {
            if conn.is_open() {
                return Ok(conn);
            }
        }

        let remote = self
            .network
            .lookup(peer)
            .ok_or_else(|| TransportError::UnknownPeer { peer: peer.clone() })?;

        let open = Arc::new(AtomicBool::new(true));
        let stream_buffer = self.network.inner.stream_buffer;
        let outbound = Arc::new(MemoryConnection {
            local_peer: self.peer_id().clone(),
            remote_peer: peer.clone(),
            remote: Arc::downgrade(&remote),
            open: Arc::clone(&open),
            stream_buffer,
        });
        let inbound = Arc::new(MemoryConnection {
            local_peer: peer.clone(),
            remote_peer: self.peer_id().clone(),
            remote: Arc::downgrade(&self.state),
            open,
            stream_buffer,
        });

        self.state
            .connections
            .insert(peer.clone(), Arc::clone(&outbound));
        remote.connections.insert(self.peer_id().clone(), inbound);

        debug!(local = %self.peer_id(), remote = %peer, "memory connection opened");
        Ok(outbound)
    }

    /// Close the connection to `peer` on both sides.
    ///
    /// Streams already opened on it are left to end on their own.
    pub fn hang_up(&self, peer: &PeerId) -> bool {
        let Some((_, conn)) = self.state.connections.remove(peer) else {
            return false;
        };
        conn.open.store(false, Ordering::SeqCst);
        if let Some(remote) = conn.remote.upgrade() {
            remote.connections.remove(self.peer_id());
        }
        debug!(local = %self.peer_id(), remote = %peer, "memory connection closed");
        true
    }

    /// Protocols with a registered inbound handler.
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self
            .state
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        protocols.sort();
        protocols
    }

    /// Peers with an open connection.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .state
            .connections
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers
    }
}

impl ConnectionManager for MemoryNode {
    fn connections(&self) -> Vec<Arc<dyn Connection>> {
        self.state
            .connections
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn Connection>)
            .collect()
    }
}

#[async_trait]
impl Registrar for MemoryNode {
    async fn handle(&self, protocol: &str, handler: StreamHandler) -> Result<()> {
        match self.state.handlers.entry(protocol.to_string()) {
            Entry::Occupied(_) => Err(TransportError::DuplicateProtocol {
                protocol: protocol.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    async fn unhandle(&self, protocol: &str) -> Result<()> {
        self.state.handlers.remove(protocol);
        Ok(())
    }
}

/// One side of a memory connection pair.
pub struct MemoryConnection {
    local_peer: PeerId,
    remote_peer: PeerId,
    remote: Weak<NodeState>,
    open: Arc<AtomicBool>,
    stream_buffer: usize,
}

impl MemoryConnection {
    fn closed(&self) -> TransportError {
        TransportError::ConnectionClosed {
            peer: self.remote_peer.clone(),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn remote_peer(&self) -> &PeerId {
        &self.remote_peer
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn new_stream(&self, protocol: &str) -> Result<PeerStream> {
        if !self.is_open() {
            return Err(self.closed());
        }
        let remote = self.remote.upgrade().ok_or_else(|| self.closed())?;

        let handler = remote
            .handlers
            .get(protocol)
            .map(|handler| Arc::clone(handler.value()))
            .ok_or_else(|| TransportError::ProtocolNotSupported {
                peer: self.remote_peer.clone(),
                protocol: protocol.to_string(),
            })?;
        let reverse = remote
            .connections
            .get(&self.local_peer)
            .map(|conn| Arc::clone(conn.value()) as Arc<dyn Connection>)
            .ok_or_else(|| self.closed())?;

        let (local_io, remote_io) = tokio::io::duplex(self.stream_buffer);
        let local = PeerStream::new(protocol, local_io);
        let incoming = IncomingStream {
            stream: PeerStream::new(protocol, remote_io),
            connection: reverse,
        };

        debug!(
            local = %self.local_peer,
            remote = %self.remote_peer,
            protocol,
            stream = local.id(),
            "memory stream opened"
        );
        handler(incoming);
        Ok(local)
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("local_peer", &self.local_peer)
            .field("remote_peer", &self.remote_peer)
            .field("open", &self.is_open())
            .finish()
    }
}
