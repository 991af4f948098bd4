//! Peer-to-peer message exchange over reusable streams.
//!
//! This is the "just works" layer. Given a connection substrate, send whole
//! binary messages to connected peers and observe the messages they send
//! back, with one length-prefixed duplex stream per peer:
//!
//! - at most one live session (and outbound queue) per peer, whether the
//!   stream was opened by us or by the remote side
//! - outbound streams are opened lazily on first send and reopened after
//!   the previous one dies
//! - every decoded inbound message is delivered to every registered
//!   listener, in arrival order per stream

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod queue;
mod session;

pub use config::{HandlerConfig, DEFAULT_PROTOCOL};
pub use error::{HandlerError, Result};
pub use handler::{create_message_handler, HandlerComponents, MessageHandler, SendOutcome};
pub use listener::MessageListener;
pub use queue::{outbound_queue, OutboundQueue, QueueReceiver};

/// Log target for lifecycle events.
pub(crate) const LOG_TARGET: &str = "peermsg::handler";
/// Log target for per-message events.
pub(crate) const MESSAGE_LOG_TARGET: &str = "peermsg::messages";
