use crate::{BusConnection, BusError, BusMessage, BusTransport, MessageSink, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Redis pub/sub transport (`redis://host:port` addresses).
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisTransport;

#[async_trait]
impl BusTransport for RedisTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn BusConnection>> {
        let conn_err = |e: redis::RedisError| BusError::Connection {
            address: address.to_string(),
            reason: e.to_string(),
        };
        let client = redis::Client::open(address).map_err(conn_err)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(conn_err)?;
        Ok(Box::new(RedisConnection {
            address: address.to_string(),
            client,
            publisher,
            pump: None,
        }))
    }
}

/// A Redis client plus, once subscribed, the task pumping `PSUBSCRIBE`
/// messages into the sink.
pub struct RedisConnection {
    address: String,
    client: redis::Client,
    publisher: MultiplexedConnection,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl BusConnection for RedisConnection {
    async fn subscribe_pattern(&mut self, pattern: &str, sink: MessageSink) -> Result<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connection {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;
        pubsub
            .psubscribe(pattern)
            .await
            .map_err(|e| BusError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        let pump = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("dropping undecodable message on {}: {e}", msg.get_channel_name());
                        continue;
                    }
                };
                let inbound = BusMessage::new(msg.get_channel_name(), payload);
                if sink.send(inbound).is_err() {
                    debug!("message handler gone, stopping redis subscription");
                    return;
                }
            }
            warn!("redis subscription stream ended");
        });
        if let Some(old) = self.pump.replace(pump) {
            old.abort();
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.publisher.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
