use crate::{BrokerConfig, BusConnection, BusError, BusTransport, MessageSink, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

enum State {
    Unstarted,
    Starting,
    Started {
        // Kept alive so the subscription keeps feeding the handler queue.
        _subscriber: Box<dyn BusConnection>,
        publisher: Box<dyn BusConnection>,
    },
}

/// Result of [`Broker::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyStarted,
}

/// Pub/sub facade: one receiving and one sending connection, started lazily.
pub struct Broker {
    transport: Arc<dyn BusTransport>,
    config: BrokerConfig,
    state: State,
}

impl Broker {
    pub fn new(transport: Arc<dyn BusTransport>, config: BrokerConfig) -> Self {
        Self {
            transport,
            config,
            state: State::Unstarted,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, State::Started { .. })
    }

    /// Connect both sides and subscribe to the configured pattern, forwarding
    /// every inbound message into `handler`.
    ///
    /// Calling `start` again once connected does not reconnect. On failure the
    /// broker returns to the unstarted state and may be started again. The same
    /// holds when a `start` future is dropped before it completes, e.g. by an
    /// outer timeout.
    pub async fn start(&mut self, handler: MessageSink) -> Result<StartOutcome> {
        match self.state {
            State::Started { .. } => {
                info!("broker already started");
                return Ok(StartOutcome::AlreadyStarted);
            }
            // `start` holds `&mut self`, so a leftover `Starting` belongs to an
            // attempt that was cancelled mid-connect.
            State::Starting => warn!("previous broker start was abandoned, reconnecting"),
            State::Unstarted => {}
        }

        self.state = State::Starting;
        match self.connect(handler).await {
            Ok((subscriber, publisher)) => {
                self.state = State::Started {
                    _subscriber: subscriber,
                    publisher,
                };
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.state = State::Unstarted;
                Err(e)
            }
        }
    }

    async fn connect(
        &self,
        handler: MessageSink,
    ) -> Result<(Box<dyn BusConnection>, Box<dyn BusConnection>)> {
        let address = &self.config.address;
        info!("connecting to bus on {address}...");
        let mut subscriber = self.transport.connect(address).await?;
        info!("  ... (1/2) subscriber connected");
        let publisher = self.transport.connect(address).await?;
        info!("  ... (2/2) publisher connected");

        subscriber
            .subscribe_pattern(&self.config.pattern, handler)
            .await?;
        info!("subscribed to channels matching {:?}", self.config.pattern);
        Ok((subscriber, publisher))
    }

    /// Serialize `payload` as JSON and publish it on `channel`.
    pub async fn publish<T: Serialize + ?Sized>(&self, payload: &T, channel: &str) -> Result<()> {
        let State::Started { publisher, .. } = &self.state else {
            return Err(BusError::NotConnected);
        };
        let body = serde_json::to_string(payload)?;
        publisher.publish(channel, &body).await
    }
}
