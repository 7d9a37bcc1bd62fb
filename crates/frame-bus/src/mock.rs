use crate::{BusConnection, BusError, BusMessage, BusTransport, MessageSink, Result};
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockBusState {
    subscriptions: Vec<(GlobMatcher, MessageSink)>,
    published: Vec<BusMessage>,
    connections: usize,
    refuse: Option<String>,
    fail_publish: bool,
}

impl MockBusState {
    fn deliver(&mut self, msg: &BusMessage) -> usize {
        self.subscriptions.retain(|(_, sink)| !sink.is_closed());
        let mut delivered = 0;
        for (matcher, sink) in &self.subscriptions {
            if matcher.is_match(&msg.channel) && sink.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

fn lock(state: &Mutex<MockBusState>) -> MutexGuard<'_, MockBusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process loopback bus. Like a real broker, a publish is delivered to
/// every matching pattern subscription, including the publisher's own.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse new connections with `reason` (`None` accepts again).
    pub fn refuse_connections(&self, reason: Option<&str>) {
        lock(&self.state).refuse = reason.map(str::to_string);
    }

    pub fn fail_publish(&self, fail: bool) {
        lock(&self.state).fail_publish = fail;
    }

    /// Simulate another client publishing `payload` on `channel`.
    /// Returns the number of subscriptions it reached.
    pub fn inject(&self, channel: &str, payload: &str) -> usize {
        lock(&self.state).deliver(&BusMessage::new(channel, payload))
    }

    /// Messages published through connections of this bus, oldest first.
    pub fn published(&self) -> Vec<BusMessage> {
        lock(&self.state).published.clone()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        lock(&self.state)
            .published
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn connections(&self) -> usize {
        lock(&self.state).connections
    }
}

#[async_trait]
impl BusTransport for MockBus {
    async fn connect(&self, address: &str) -> Result<Box<dyn BusConnection>> {
        let mut st = lock(&self.state);
        if let Some(reason) = &st.refuse {
            return Err(BusError::Connection {
                address: address.to_string(),
                reason: reason.clone(),
            });
        }
        st.connections += 1;
        Ok(Box::new(MockBusConnection {
            state: self.state.clone(),
        }))
    }
}

/// Connection handed out by [`MockBus`].
pub struct MockBusConnection {
    state: Arc<Mutex<MockBusState>>,
}

#[async_trait]
impl BusConnection for MockBusConnection {
    async fn subscribe_pattern(&mut self, pattern: &str, sink: MessageSink) -> Result<()> {
        let matcher = Glob::new(pattern)
            .map_err(|e| BusError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();
        lock(&self.state).subscriptions.push((matcher, sink));
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut st = lock(&self.state);
        if st.fail_publish {
            return Err(BusError::Publish {
                channel: channel.to_string(),
                reason: "mock publish failure".to_string(),
            });
        }
        let msg = BusMessage::new(channel, payload);
        st.published.push(msg.clone());
        st.deliver(&msg);
        Ok(())
    }
}
