//! Discrete messages between peers over reusable length-prefixed streams.
//!
//! peermsg keeps one duplex stream per connected peer, frames every message
//! with an unsigned varint length prefix, and fans inbound messages out to
//! registered listeners.
//!
//! # Crate Structure
//!
//! - [`transport`]: connection substrate contracts and an in-memory network
//! - [`frame`]: varint length-prefixed message framing
//! - [`handler`]: the message handler (behind the `handler` feature)

/// Re-export transport types.
pub mod transport {
    pub use peermsg_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use peermsg_frame::*;
}

/// Re-export handler types (requires `handler` feature).
#[cfg(feature = "handler")]
pub mod handler {
    pub use peermsg_handler::*;
}
