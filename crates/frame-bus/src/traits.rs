use crate::{MessageSink, Result};
use async_trait::async_trait;

/// Factory for bus connections (e.g. a Redis client).
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Establish one connection to the bus at `address`.
    async fn connect(&self, address: &str) -> Result<Box<dyn BusConnection>>;
}

/// One live connection to the bus.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Deliver every message published on a channel matching `pattern`
    /// (glob syntax) into `sink` until the connection is dropped.
    async fn subscribe_pattern(&mut self, pattern: &str, sink: MessageSink) -> Result<()>;

    /// Publish an already serialized payload on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}
