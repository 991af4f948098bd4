//! Per-peer outbound message queue.
//!
//! The producer half ([`OutboundQueue`]) is cheap to clone and never blocks;
//! the consumer half ([`QueueReceiver`]) is drained by exactly one write
//! loop. Once the consumer is gone every push fails with
//! [`HandlerError::QueueClosed`].

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use peermsg_transport::PeerId;
use tokio::sync::mpsc;

use crate::error::{HandlerError, Result};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Producer half of a peer's outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    id: u64,
    peer: PeerId,
    tx: mpsc::UnboundedSender<Bytes>,
}

/// Consumer half of a peer's outbound queue.
///
/// Yields messages in push order and ends once every [`OutboundQueue`]
/// clone has been dropped.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

/// Create a new unbounded queue for messages bound to `peer`.
pub fn outbound_queue(peer: PeerId) -> (OutboundQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = OutboundQueue {
        id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
        peer,
        tx,
    };
    (queue, QueueReceiver { rx })
}

impl OutboundQueue {
    /// Process-unique identity of this queue.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Enqueue a message without waiting for it to be written.
    pub fn push(&self, message: Bytes) -> Result<()> {
        self.try_push(message)
            .map_err(|_| HandlerError::QueueClosed {
                peer: self.peer.clone(),
            })
    }

    /// Enqueue a message, handing it back if the consumer is gone.
    pub(crate) fn try_push(&self, message: Bytes) -> std::result::Result<(), Bytes> {
        self.tx.send(message).map_err(|err| err.0)
    }

    /// Whether the consumer half has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Next message, or `None` once all producers are gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Stop accepting pushes. Already queued messages can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for QueueReceiver {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn peer() -> PeerId {
        PeerId::new("peer-b")
    }

    #[tokio::test]
    async fn preserves_push_order() {
        let (queue, mut receiver) = outbound_queue(peer());
        for message in [&b"1"[..], b"2", b"3"] {
            queue.push(Bytes::copy_from_slice(message)).unwrap();
        }
        drop(queue);

        let drained: Vec<Bytes> = (&mut receiver).collect().await;
        assert_eq!(drained, vec![&b"1"[..], b"2", b"3"]);
    }

    #[tokio::test]
    async fn push_after_receiver_dropped_fails() {
        let (queue, receiver) = outbound_queue(peer());
        drop(receiver);

        assert!(queue.is_closed());
        let err = queue.push(Bytes::from_static(b"late")).unwrap_err();
        assert!(matches!(err, HandlerError::QueueClosed { peer } if peer.as_str() == "peer-b"));
    }

    #[tokio::test]
    async fn try_push_returns_message_when_closed() {
        let (queue, mut receiver) = outbound_queue(peer());
        receiver.close();

        let message = queue.try_push(Bytes::from_static(b"back")).unwrap_err();
        assert_eq!(message.as_ref(), b"back");
    }

    #[tokio::test]
    async fn clones_share_one_queue() {
        let (queue, mut receiver) = outbound_queue(peer());
        let clone = queue.clone();
        assert_eq!(queue.id(), clone.id());

        queue.push(Bytes::from_static(b"a")).unwrap();
        clone.push(Bytes::from_static(b"b")).unwrap();

        assert_eq!(receiver.recv().await.unwrap().as_ref(), b"a");
        assert_eq!(receiver.recv().await.unwrap().as_ref(), b"b");
    }

    #[test]
    fn ids_are_unique() {
        let (first, _rx1) = outbound_queue(peer());
        let (second, _rx2) = outbound_queue(peer());
        assert_ne!(first.id(), second.id());
    }
}
