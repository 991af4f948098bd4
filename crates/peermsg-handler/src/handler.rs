use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::join_all;
use peermsg_frame::FrameError;
use peermsg_transport::{
    Connection, ConnectionManager, IncomingStream, PeerId, Registrar, StreamHandler,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::config::HandlerConfig;
use crate::error::{HandlerError, Result};
use crate::listener::MessageListener;
use crate::queue::OutboundQueue;
use crate::session::SessionContext;
use crate::{LOG_TARGET, MESSAGE_LOG_TARGET};

/// Substrate services a [`MessageHandler`] is built on.
#[derive(Clone)]
pub struct HandlerComponents {
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub registrar: Arc<dyn Registrar>,
}

impl HandlerComponents {
    pub fn new(
        connection_manager: Arc<dyn ConnectionManager>,
        registrar: Arc<dyn Registrar>,
    ) -> Self {
        Self {
            connection_manager,
            registrar,
        }
    }

    /// Use one node that is both connection manager and registrar.
    pub fn from_node<N>(node: N) -> Self
    where
        N: ConnectionManager + Registrar + 'static,
    {
        let node = Arc::new(node);
        Self {
            connection_manager: Arc::clone(&node) as Arc<dyn ConnectionManager>,
            registrar: node,
        }
    }
}

/// Result of sending one message to one peer as part of a fan-out.
#[derive(Debug)]
pub struct SendOutcome {
    pub peer: PeerId,
    pub result: Result<()>,
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends and receives whole messages over one reusable stream per peer.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use peermsg_handler::{HandlerComponents, HandlerConfig, MessageHandler};
/// use peermsg_transport::{MemoryNetwork, PeerId};
///
/// # async fn example() -> peermsg_handler::Result<()> {
/// let network = MemoryNetwork::new();
/// let node = network.add_node("peer-a");
/// let handler = MessageHandler::new(
///     HandlerComponents::from_node(node.clone()),
///     HandlerConfig::default(),
/// );
///
/// handler.handle(Arc::new(|message: &Bytes, peer: &PeerId| {
///     println!("{peer}: {} bytes", message.len());
/// }));
/// handler.start().await?;
///
/// let peer = PeerId::new("peer-b");
/// node.dial(&peer)?;
/// handler.send(Bytes::from_static(b"hello"), &peer).await?;
/// # Ok(())
/// # }
/// ```
pub struct MessageHandler {
    components: HandlerComponents,
    config: HandlerConfig,
    sessions: SessionContext,
    started: AtomicBool,
    lifecycle: Mutex<()>,
    dial_locks: DashMap<PeerId, Arc<Mutex<()>>>,
}

/// Build a factory that turns substrate components into a handler.
pub fn create_message_handler(
    config: HandlerConfig,
) -> impl FnOnce(HandlerComponents) -> MessageHandler {
    move |components| MessageHandler::new(components, config)
}

impl MessageHandler {
    pub fn new(components: HandlerComponents, config: HandlerConfig) -> Self {
        let sessions = SessionContext::new(config.frame_config());
        Self {
            components,
            config,
            sessions,
            started: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            dial_locks: DashMap::new(),
        }
    }

    /// Register the protocol so inbound streams are accepted.
    ///
    /// Starting a started handler does nothing.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_started() {
            return Ok(());
        }

        let sessions = self.sessions.clone();
        let on_stream: StreamHandler = Arc::new(move |incoming: IncomingStream| {
            let peer = incoming.connection.remote_peer().clone();
            debug!(target: LOG_TARGET, peer = %peer, stream = incoming.stream.id(), "incoming stream from peer");
            sessions.attach(incoming.stream, peer);
        });

        self.components
            .registrar
            .handle(&self.config.protocol, on_stream)
            .await?;
        self.started.store(true, Ordering::SeqCst);
        info!(target: LOG_TARGET, protocol = %self.config.protocol, "message handler started");
        Ok(())
    }

    /// Unregister the protocol and drop every listener.
    ///
    /// Sessions already running are left to end on their own. Stopping a
    /// stopped handler does nothing.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_started() {
            return Ok(());
        }

        self.components
            .registrar
            .unhandle(&self.config.protocol)
            .await?;
        self.sessions.listeners.clear();
        self.started.store(false, Ordering::SeqCst);
        info!(target: LOG_TARGET, protocol = %self.config.protocol, "message handler stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Queue `message` for delivery to `peer`.
    ///
    /// Returns once the message is queued, not once it is written. Opens a
    /// stream first if the peer has no live session.
    pub async fn send(&self, message: impl Into<Bytes>, peer: &PeerId) -> Result<()> {
        let message = message.into();
        if message.len() > self.config.max_message_size {
            return Err(FrameError::PayloadTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            }
            .into());
        }

        let queue = self.establish_stream(peer).await?;
        let message = match queue.try_push(message) {
            Ok(()) => {
                trace!(target: MESSAGE_LOG_TARGET, peer = %peer, "queued message for peer");
                return Ok(());
            }
            Err(message) => message,
        };

        // The write loop ended between lookup and push: retry once on a
        // fresh stream.
        debug!(target: LOG_TARGET, peer = %peer, "outbound queue closed, reopening stream");
        self.sessions.registry.remove_if_current(peer, queue.id());
        let queue = self.establish_stream(peer).await?;
        queue.push(message)?;
        trace!(target: MESSAGE_LOG_TARGET, peer = %peer, "queued message for peer");
        Ok(())
    }

    /// Send `message` to each of `peers` concurrently.
    ///
    /// One outcome per peer, in the order given. A failure for one peer
    /// does not affect the others.
    pub async fn multicast<I>(&self, message: impl Into<Bytes>, peers: I) -> Vec<SendOutcome>
    where
        I: IntoIterator<Item = PeerId>,
    {
        let message = message.into();
        let sends = peers.into_iter().map(|peer| {
            let message = message.clone();
            async move {
                let result = self.send(message, &peer).await;
                if let Err(err) = &result {
                    debug!(target: LOG_TARGET, peer = %peer, error = %err, "failed to send message to peer");
                }
                SendOutcome { peer, result }
            }
        });
        join_all(sends).await
    }

    /// Send `message` to every currently connected peer.
    pub async fn broadcast(&self, message: impl Into<Bytes>) -> Vec<SendOutcome> {
        let mut peers: Vec<PeerId> = self
            .components
            .connection_manager
            .connections()
            .iter()
            .map(|conn| conn.remote_peer().clone())
            .collect();
        peers.sort();
        peers.dedup();
        self.multicast(message, peers).await
    }

    /// Register a listener for all inbound messages.
    ///
    /// Registering the same `Arc` twice has no further effect.
    pub fn handle(&self, listener: Arc<dyn MessageListener>) {
        if self.sessions.listeners.add(listener) {
            debug!(target: LOG_TARGET, listeners = self.listener_count(), "added message listener");
        }
    }

    /// Remove a listener previously passed to [`handle`](Self::handle).
    pub fn unhandle(&self, listener: &Arc<dyn MessageListener>) {
        if self.sessions.listeners.remove(listener) {
            debug!(target: LOG_TARGET, listeners = self.listener_count(), "removed message listener");
        }
    }

    /// Return the live queue to `peer`, opening a stream if needed.
    ///
    /// Concurrent callers for the same peer share a single stream open.
    pub async fn establish_stream(&self, peer: &PeerId) -> Result<OutboundQueue> {
        let Some(connection) = self.components.connection_manager.connection_to(peer) else {
            error!(target: LOG_TARGET, peer = %peer, "failed to open stream: peer is not connected");
            return Err(HandlerError::NotConnected { peer: peer.clone() });
        };

        if let Some(queue) = self.sessions.registry.live(peer) {
            return Ok(queue);
        }

        let dial_lock = Arc::clone(self.dial_locks.entry(peer.clone()).or_default().value());
        let established = {
            let _dialing = dial_lock.lock().await;
            match self.sessions.registry.live(peer) {
                Some(queue) => Ok(queue),
                None => self.open_stream(connection.as_ref(), peer).await,
            }
        };
        drop(dial_lock);
        self.dial_locks
            .remove_if(peer, |_, lock| Arc::strong_count(lock) == 1);
        established
    }

    async fn open_stream(&self, connection: &dyn Connection, peer: &PeerId) -> Result<OutboundQueue> {
        debug!(target: LOG_TARGET, peer = %peer, protocol = %self.config.protocol, "opening new stream");
        let stream = connection
            .new_stream(&self.config.protocol)
            .await
            .map_err(|source| {
                error!(target: LOG_TARGET, peer = %peer, error = %source, "failed to open new stream");
                HandlerError::StreamOpen {
                    peer: peer.clone(),
                    source,
                }
            })?;
        Ok(self.sessions.attach(stream, peer.clone()))
    }

    pub fn protocol(&self) -> &str {
        &self.config.protocol
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Whether `peer` currently has a live outbound session.
    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.sessions.registry.contains(peer)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.registry.len()
    }

    pub fn listener_count(&self) -> usize {
        self.sessions.listeners.len()
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("protocol", &self.config.protocol)
            .field("started", &self.is_started())
            .field("sessions", &self.session_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
