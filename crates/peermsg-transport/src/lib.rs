//! Connection substrate contracts.
//!
//! peermsg does not dial, secure, or multiplex connections itself. It is
//! handed a substrate that already does, described by the traits here:
//! - [`ConnectionManager`] enumerates open connections to remote peers
//! - [`Connection`] opens new protocol streams on one of them
//! - [`Registrar`] announces a protocol and hands over inbound streams
//!
//! The [`memory`] module provides a complete in-process substrate built on
//! `tokio::io::duplex`, used by tests and the CLI loopback command.

pub mod error;
pub mod memory;
pub mod peer;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryConnection, MemoryNetwork, MemoryNode};
pub use peer::PeerId;
pub use stream::{PeerStream, StreamReadHalf, StreamWriteHalf};
pub use traits::{Connection, ConnectionManager, IncomingStream, Registrar, StreamHandler};
