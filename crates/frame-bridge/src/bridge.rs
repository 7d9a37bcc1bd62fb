use crate::{
    decode_inbound, parse_channel, BridgeConfig, BridgeError, BufferEnvelope, ChannelProfile,
    Direction, Discovery, DiscoveryMode, Result, TickReport,
};
use device_registry::{DeviceEvent, DeviceMetrics, DeviceRegistry};
use frame_bus::{Broker, BusMessage, BusTransport, MessageSink, StartOutcome};
use hid_transport::HidBackend;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What happened to a device event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Published { channel: String, len: usize },
    /// Event from a subscription that has since been revoked.
    Stale,
    DeviceError,
}

/// What happened to a bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Written { token: String, len: usize },
    NotBinary,
    /// One of our own `:in` publishes seen through the wildcard subscription.
    Echo,
    InboundDisabled,
}

/// Owns the registry, broker and discovery, and routes between devices and the bus.
pub struct Bridge {
    registry: DeviceRegistry,
    broker: Broker,
    discovery: Discovery,
    mode: DiscoveryMode,
    profile: ChannelProfile,
    metrics: DeviceMetrics,
    device_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    bus_tx: MessageSink,
    bus_rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Bridge {
    pub fn new(
        config: &BridgeConfig,
        backend: Arc<dyn HidBackend>,
        transport: Arc<dyn BusTransport>,
        metrics: DeviceMetrics,
    ) -> Self {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let registry = DeviceRegistry::new(backend.clone(), device_tx).with_metrics(metrics.clone());
        let discovery = Discovery::new(
            backend,
            config.discovery.filter(),
            config.discovery.interval(),
        );
        Self {
            registry,
            broker: Broker::new(transport, config.bus.clone()),
            discovery,
            mode: config.discovery.mode,
            profile: config.channels.profile,
            metrics,
            device_rx,
            bus_tx,
            bus_rx,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn profile(&self) -> ChannelProfile {
        self.profile
    }

    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// Connect the broker; bus messages start queueing for the loop.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        Ok(self.broker.start(self.bus_tx.clone()).await?)
    }

    pub async fn discover_once(&mut self) -> TickReport {
        self.discovery.discover_once(&mut self.registry).await
    }

    pub async fn reconcile(&mut self) -> TickReport {
        self.discovery.tick(&mut self.registry).await
    }

    /// Publish a device report on its outbound channel.
    pub async fn forward_outbound(&mut self, event: DeviceEvent) -> Result<Outbound> {
        if !self.registry.is_current(&event) {
            debug!(
                "dropping event from {} ({}): device no longer registered",
                event.token(),
                event.subscription()
            );
            return Ok(Outbound::Stale);
        }
        match event {
            DeviceEvent::Error { token, error, .. } => {
                let path = self
                    .registry
                    .lookup_by_token(&token)
                    .map_or("?", |h| h.path());
                error!("error with device {path} ({token}): {error}");
                Ok(Outbound::DeviceError)
            }
            DeviceEvent::Data { token, report, .. } => {
                let handle = self
                    .registry
                    .lookup_by_token(&token)
                    .ok_or_else(|| BridgeError::RouteMissing(token.clone()))?;
                let channel = self.profile.outbound_channel(handle.token(), handle.path());
                self.broker
                    .publish(&BufferEnvelope::new(&report), &channel)
                    .await
                    .map_err(|source| BridgeError::Publish {
                        path: handle.path().to_string(),
                        source,
                    })?;
                self.metrics.frames_published.inc();
                Ok(Outbound::Published {
                    channel,
                    len: report.len(),
                })
            }
        }
    }

    /// Route a bus message to the device named by its channel.
    pub fn route_inbound(&mut self, msg: &BusMessage) -> Result<Inbound> {
        if !self.profile.routes_inbound() {
            return Ok(Inbound::InboundDisabled);
        }
        let route = parse_channel(&msg.channel)?;
        if route.direction == Direction::In {
            return Ok(Inbound::Echo);
        }
        if self.registry.lookup_by_token(&route.token).is_none() {
            return Err(BridgeError::RouteMissing(route.token));
        }
        let Some(report) = decode_inbound(&msg.payload)? else {
            return Ok(Inbound::NotBinary);
        };
        let len = self.registry.write(&route.token, &report)?;
        self.metrics.frames_written.inc();
        Ok(Inbound::Written {
            token: route.token,
            len,
        })
    }

    pub async fn handle_device_event(&mut self, event: DeviceEvent) {
        match self.forward_outbound(event).await {
            Ok(Outbound::Published { channel, len }) => {
                debug!("published {len} bytes on {channel}")
            }
            Ok(_) => {}
            Err(e) => {
                self.metrics.publish_errors.inc();
                error!("{e}");
            }
        }
    }

    pub fn handle_bus_message(&mut self, msg: BusMessage) {
        match self.route_inbound(&msg) {
            Ok(Inbound::Written { token, len }) => debug!("wrote {len} bytes to {token}"),
            Ok(Inbound::NotBinary) => debug!("ignoring non-binary message on {}", msg.channel),
            Ok(Inbound::Echo | Inbound::InboundDisabled) => {}
            Err(e) => {
                self.metrics.routing_errors.inc();
                error!("{e}");
            }
        }
    }

    /// Handle everything already queued. Returns the number of items handled.
    pub async fn drain_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(event) = self.device_rx.try_recv() {
                self.handle_device_event(event).await;
            } else if let Ok(msg) = self.bus_rx.try_recv() {
                self.handle_bus_message(msg);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    /// Start, discover and route until `shutdown` resolves, then close every device.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if self.start().await? == StartOutcome::AlreadyStarted {
            warn!("broker was already started");
        }
        let polling = self.mode == DiscoveryMode::Polling;
        if !polling {
            self.discover_once().await;
        }
        let mut ticker = tokio::time::interval(self.discovery.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = self.device_rx.recv() => self.handle_device_event(event).await,
                Some(msg) = self.bus_rx.recv() => self.handle_bus_message(msg),
                _ = ticker.tick(), if polling => {
                    self.reconcile().await;
                }
            }
        }

        let closed = self.registry.close_all();
        info!("shutdown: closed {closed} devices");
        Ok(())
    }
}
