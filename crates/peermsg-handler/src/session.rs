//! Stream sessions: one inbound read task and, per peer, one outbound write
//! loop draining that peer's queue.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use peermsg_frame::{decode, encode, FrameConfig, FrameError};
use peermsg_transport::{PeerId, PeerStream, StreamReadHalf, StreamWriteHalf};
use tracing::{debug, trace, warn};

use crate::listener::ListenerSet;
use crate::queue::{outbound_queue, OutboundQueue, QueueReceiver};
use crate::{LOG_TARGET, MESSAGE_LOG_TARGET};

/// Live outbound queues, at most one per peer.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    queues: DashMap<PeerId, OutboundQueue>,
}

impl SessionRegistry {
    /// The peer's queue if its write loop is still running.
    ///
    /// A queue whose write loop has ended is evicted on the way out.
    pub(crate) fn live(&self, peer: &PeerId) -> Option<OutboundQueue> {
        let queue = self.queues.get(peer).map(|entry| entry.value().clone())?;
        if queue.is_closed() {
            self.remove_if_current(peer, queue.id());
            return None;
        }
        Some(queue)
    }

    /// Remove the peer's entry only if it is still the queue `queue_id`.
    pub(crate) fn remove_if_current(&self, peer: &PeerId, queue_id: u64) -> bool {
        self.queues
            .remove_if(peer, |_, queue| queue.id() == queue_id)
            .is_some()
    }

    pub(crate) fn contains(&self, peer: &PeerId) -> bool {
        self.live(peer).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }
}

/// Everything a session task needs, shared by the handler and the inbound
/// stream callback.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) listeners: Arc<ListenerSet>,
    pub(crate) frame_config: FrameConfig,
}

impl SessionContext {
    pub(crate) fn new(frame_config: FrameConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::default()),
            listeners: Arc::new(ListenerSet::default()),
            frame_config,
        }
    }

    /// Start a session on `stream` with `peer` and return the peer's queue.
    ///
    /// Messages read from the stream always reach the listeners. If the peer
    /// already has a live queue, that queue is returned and the stream's
    /// write side is never used.
    pub(crate) fn attach(&self, stream: PeerStream, peer: PeerId) -> OutboundQueue {
        let stream_id = stream.id();
        let (read_half, write_half) = stream.into_split();
        self.spawn_inbound(read_half, peer.clone(), stream_id);

        let (queue, receiver) = match self.registry.queues.entry(peer.clone()) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                debug!(target: LOG_TARGET, peer = %peer, stream = stream_id, "already have outbound queue to peer");
                return entry.get().clone();
            }
            Entry::Occupied(mut entry) => {
                let (queue, receiver) = outbound_queue(peer.clone());
                entry.insert(queue.clone());
                (queue, receiver)
            }
            Entry::Vacant(entry) => {
                let (queue, receiver) = outbound_queue(peer.clone());
                entry.insert(queue.clone());
                (queue, receiver)
            }
        };

        self.spawn_outbound(write_half, receiver, peer, queue.id(), stream_id);
        queue
    }

    fn spawn_inbound(&self, read_half: StreamReadHalf, peer: PeerId, stream_id: u64) {
        let listeners = Arc::clone(&self.listeners);
        let mut messages = decode(read_half, &self.frame_config);

        tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                match next {
                    Ok(message) => {
                        trace!(target: MESSAGE_LOG_TARGET, peer = %peer, stream = stream_id, size = message.len(), "received message");
                        listeners.dispatch(&message, &peer);
                    }
                    Err(err) => {
                        warn!(target: LOG_TARGET, peer = %peer, stream = stream_id, error = %err, "failed to read from peer stream");
                        return;
                    }
                }
            }
            debug!(target: LOG_TARGET, peer = %peer, stream = stream_id, "peer closed stream");
        });
    }

    fn spawn_outbound(
        &self,
        write_half: StreamWriteHalf,
        receiver: QueueReceiver,
        peer: PeerId,
        queue_id: u64,
        stream_id: u64,
    ) {
        let registry = Arc::clone(&self.registry);
        let sink = encode(write_half, &self.frame_config);

        tokio::spawn(async move {
            let written = receiver
                .inspect(|message| {
                    trace!(target: MESSAGE_LOG_TARGET, peer = %peer, stream = stream_id, size = message.len(), "writing message");
                })
                .map(Ok::<Bytes, FrameError>)
                .forward(sink)
                .await;

            if let Err(err) = written {
                debug!(target: LOG_TARGET, peer = %peer, stream = stream_id, error = %err, "failed to write to peer stream");
            }
            registry.remove_if_current(&peer, queue_id);
            debug!(target: LOG_TARGET, peer = %peer, stream = stream_id, "outbound stream ended");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::sync::mpsc;

    use super::*;

    fn pair() -> (PeerStream, PeerStream) {
        let (local, remote) = tokio::io::duplex(1024);
        (
            PeerStream::new("/test/1", local),
            PeerStream::new("/test/1", remote),
        )
    }

    #[tokio::test]
    async fn attach_registers_one_queue_per_peer() {
        let ctx = SessionContext::new(FrameConfig::default());
        let peer = PeerId::new("peer-b");
        let (first, _first_remote) = pair();
        let (second, _second_remote) = pair();

        let queue = ctx.attach(first, peer.clone());
        let again = ctx.attach(second, peer.clone());

        assert_eq!(queue.id(), again.id());
        assert_eq!(ctx.registry.len(), 1);
        assert!(ctx.registry.contains(&peer));
    }

    #[tokio::test]
    async fn queued_messages_are_framed_onto_the_stream() {
        let ctx = SessionContext::new(FrameConfig::default());
        let (local, remote) = pair();
        let queue = ctx.attach(local, PeerId::new("peer-b"));

        queue.push(Bytes::from_static(b"one")).unwrap();
        queue.push(Bytes::from_static(b"two")).unwrap();

        let mut inbound = decode(remote, &FrameConfig::default());
        assert_eq!(inbound.next().await.unwrap().unwrap().as_ref(), b"one");
        assert_eq!(inbound.next().await.unwrap().unwrap().as_ref(), b"two");
    }

    #[tokio::test]
    async fn inbound_messages_reach_listeners() {
        let ctx = SessionContext::new(FrameConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.listeners.add(Arc::new(move |message: &Bytes, peer: &PeerId| {
            let _ = tx.send((message.clone(), peer.clone()));
        }));

        let (local, remote) = pair();
        ctx.attach(local, PeerId::new("peer-b"));
        let mut sink = encode(remote, &FrameConfig::default());
        sink.send(Bytes::from_static(b"hello")).await.unwrap();

        let (message, peer) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.as_ref(), b"hello");
        assert_eq!(peer.as_str(), "peer-b");
    }

    #[tokio::test]
    async fn write_failure_evicts_queue() {
        let ctx = SessionContext::new(FrameConfig::default());
        let peer = PeerId::new("peer-b");
        let (local, remote) = pair();
        let queue = ctx.attach(local, peer.clone());
        drop(remote);

        queue.push(Bytes::from_static(b"lost")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!ctx.registry.contains(&peer));
        assert_eq!(ctx.registry.len(), 0);
    }

    #[tokio::test]
    async fn stale_queue_is_replaced_on_attach() {
        let ctx = SessionContext::new(FrameConfig::default());
        let peer = PeerId::new("peer-b");
        let (stale, receiver) = outbound_queue(peer.clone());
        drop(receiver);
        ctx.registry.queues.insert(peer.clone(), stale.clone());

        let (local, _remote) = pair();
        let fresh = ctx.attach(local, peer.clone());

        assert_ne!(fresh.id(), stale.id());
        assert!(!ctx.registry.remove_if_current(&peer, stale.id()));
        assert!(ctx.registry.contains(&peer));
    }
}
