//! frame-bus: publish/subscribe bus facade
//!
//! A [`Broker`] owns two logical connections obtained from a [`BusTransport`]:
//! one subscribed to a channel pattern that feeds every inbound message into a
//! single handler queue, and one used for outbound publishes. The default build
//! ships an in-process `mock` transport; a Redis adapter sits behind the
//! `redis` feature.

mod types;
pub use types::{BrokerConfig, BusMessage, MessageSink, DEFAULT_ADDRESS, DEFAULT_PATTERN};

mod error;
pub use error::{BusError, Result};

mod traits;
pub use traits::{BusConnection, BusTransport};

mod broker;
pub use broker::{Broker, StartOutcome};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBus, MockBusConnection};

#[cfg(feature = "redis")]
mod redis_bus;

#[cfg(feature = "redis")]
pub use redis_bus::{RedisConnection, RedisTransport};
