use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use peermsg_transport::PeerId;
use tracing::{trace, warn};

use crate::{LOG_TARGET, MESSAGE_LOG_TARGET};

/// Receives every message decoded from any peer's stream.
///
/// Called synchronously from the stream's read task, so long-running work
/// should be handed off. Any closure `Fn(&Bytes, &PeerId)` is a listener.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &Bytes, peer: &PeerId);
}

impl<F> MessageListener for F
where
    F: Fn(&Bytes, &PeerId) + Send + Sync,
{
    fn on_message(&self, message: &Bytes, peer: &PeerId) {
        self(message, peer)
    }
}

/// Set of listeners keyed by `Arc` identity.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn MessageListener>>>,
}

fn same_listener(a: &Arc<dyn MessageListener>, b: &Arc<dyn MessageListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ListenerSet {
    /// Add a listener. Returns `false` if it was already registered.
    pub(crate) fn add(&self, listener: Arc<dyn MessageListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|known| same_listener(known, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|known| !same_listener(known, listener));
        listeners.len() != before
    }

    pub(crate) fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `message` to every listener registered right now.
    ///
    /// Listeners run outside the lock, so they may add or remove listeners;
    /// such changes apply from the next message on. A panicking listener is
    /// logged and does not stop delivery to the others.
    pub(crate) fn dispatch(&self, message: &Bytes, peer: &PeerId) -> usize {
        let snapshot: Vec<Arc<dyn MessageListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in &snapshot {
            trace!(target: MESSAGE_LOG_TARGET, peer = %peer, size = message.len(), "invoking message handler");
            if catch_unwind(AssertUnwindSafe(|| listener.on_message(message, peer))).is_err() {
                warn!(target: LOG_TARGET, peer = %peer, "message handler panicked");
            }
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<dyn MessageListener> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Bytes, _: &PeerId| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn adding_same_listener_twice_is_a_no_op() {
        let set = ListenerSet::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = counting(&calls);

        assert!(set.add(Arc::clone(&listener)));
        assert!(!set.add(Arc::clone(&listener)));
        assert_eq!(set.len(), 1);

        set.dispatch(&Bytes::from_static(b"x"), &PeerId::new("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_closures_are_distinct_listeners() {
        let set = ListenerSet::default();
        let calls = Arc::new(AtomicUsize::new(0));

        set.add(counting(&calls));
        set.add(counting(&calls));

        assert_eq!(set.dispatch(&Bytes::new(), &PeerId::new("a")), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_unknown_listener_is_a_no_op() {
        let set = ListenerSet::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let registered = counting(&calls);
        set.add(Arc::clone(&registered));

        assert!(!set.remove(&counting(&calls)));
        assert!(set.remove(&registered));
        assert!(!set.remove(&registered));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn listener_receives_message_and_peer() {
        let set = ListenerSet::default();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set.add(Arc::new(move |message: &Bytes, peer: &PeerId| {
            sink.write().unwrap().push((message.clone(), peer.clone()));
        }));

        set.dispatch(&Bytes::from_static(b"hi"), &PeerId::new("peer-a"));

        let seen = seen.read().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_ref(), b"hi");
        assert_eq!(seen[0].1.as_str(), "peer-a");
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let set = ListenerSet::default();
        let calls = Arc::new(AtomicUsize::new(0));
        set.add(Arc::new(|_: &Bytes, _: &PeerId| panic!("listener failure")));
        set.add(counting(&calls));

        set.dispatch(&Bytes::from_static(b"x"), &PeerId::new("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let set = ListenerSet::default();
        let calls = Arc::new(AtomicUsize::new(0));
        set.add(counting(&calls));
        set.add(counting(&calls));

        set.clear();
        assert_eq!(set.dispatch(&Bytes::new(), &PeerId::new("a")), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
