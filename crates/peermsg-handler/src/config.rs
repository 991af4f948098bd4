use peermsg_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};

/// Protocol identifier used when none is configured.
pub const DEFAULT_PROTOCOL: &str = "/message-handler/0.0.1";

/// Message handler configuration.
///
/// Missing fields fall back to their defaults when deserialized, so a
/// partial config file such as `{"protocol": "/chat/1.0.0"}` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Protocol identifier negotiated for every stream.
    pub protocol: String,
    /// Largest message accepted in either direction, in bytes.
    pub max_message_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl HandlerConfig {
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Frame codec settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
        }
    }
}
