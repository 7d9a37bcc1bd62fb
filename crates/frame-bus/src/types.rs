use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const DEFAULT_ADDRESS: &str = "redis://localhost:6379";

/// Subscribe to every channel unless configured otherwise.
pub const DEFAULT_PATTERN: &str = "*";

/// One message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

impl BusMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Queue into which a subscription delivers inbound messages.
pub type MessageSink = mpsc::UnboundedSender<BusMessage>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            pattern: default_pattern(),
        }
    }
}
