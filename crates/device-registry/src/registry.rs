use crate::{
    DeviceEvent, DeviceEventSink, DeviceHandle, DeviceMetrics, PathIdentifier, RegistryError,
    Result, Subscription, SubscriptionId,
};
use hid_transport::{DeviceInfo, HidBackend, HidConnection, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Live set of open devices keyed by path, with a token index for routing.
///
/// Every entry owns an open connection and every connection opened through the
/// registry is owned by an entry; a failed registration leaves nothing behind.
pub struct DeviceRegistry {
    backend: Arc<dyn HidBackend>,
    identifier: PathIdentifier,
    devices: HashMap<String, DeviceHandle>,
    tokens: HashMap<String, String>,
    events: DeviceEventSink,
    next_subscription: u64,
    metrics: Option<DeviceMetrics>,
}

impl DeviceRegistry {
    /// Listeners of registered devices push into `events`.
    pub fn new(backend: Arc<dyn HidBackend>, events: DeviceEventSink) -> Self {
        Self {
            backend,
            identifier: PathIdentifier::new(),
            devices: HashMap::new(),
            tokens: HashMap::new(),
            events,
            next_subscription: 0,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        metrics.devices_registered.set(self.devices.len() as i64);
        self.metrics = Some(metrics);
        self
    }

    pub fn backend(&self) -> &Arc<dyn HidBackend> {
        &self.backend
    }

    /// Open `device`, issue its token and start forwarding its events.
    pub async fn register(&mut self, device: DeviceInfo) -> Result<&DeviceHandle> {
        let path = device.path.clone();
        if self.devices.contains_key(&path) {
            return Err(RegistryError::AlreadyRegistered(path));
        }
        // Reject unusable paths before touching hardware.
        PathIdentifier::normalize(&path)?;

        let connection = self.open(&path).await?;
        let token = self.identifier.assign(&path)?;
        self.next_subscription += 1;
        let subscription = Subscription::new(SubscriptionId(self.next_subscription));
        let handle = DeviceHandle::attach(device, token.clone(), connection, &self.events, subscription);

        info!(
            "registered {} as {} (product={}, manufacturer={}, opened_at={})",
            path,
            token,
            handle.info().product.as_deref().unwrap_or("-"),
            handle.info().manufacturer.as_deref().unwrap_or("-"),
            handle.opened_at(),
        );
        self.tokens.insert(token, path.clone());
        self.devices.insert(path.clone(), handle);
        self.update_gauge();
        self.devices
            .get(&path)
            .ok_or(RegistryError::NotFound(path))
    }

    async fn open(&self, path: &str) -> Result<Box<dyn HidConnection>> {
        let backend = self.backend.clone();
        let owned = path.to_string();
        let opened = tokio::task::spawn_blocking(move || backend.open(&owned)).await;
        match opened {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(source)) => Err(RegistryError::HardwareOpen {
                path: path.to_string(),
                source,
            }),
            Err(join) => Err(RegistryError::HardwareOpen {
                path: path.to_string(),
                source: TransportError::Open {
                    path: path.to_string(),
                    reason: join.to_string(),
                },
            }),
        }
    }

    /// Detach listeners, close the connection and drop the entry. No event
    /// from the old handle is accepted once this returns.
    pub fn deregister(&mut self, path: &str) -> Result<()> {
        let Some(handle) = self.devices.get_mut(path) else {
            return Err(RegistryError::NotFound(path.to_string()));
        };
        if let Err(e) = handle.close() {
            warn!("closing {path} reported an error: {e}");
        }
        if let Some(handle) = self.devices.remove(path) {
            self.tokens.remove(handle.token());
            info!(
                "deregistered {} ({}) after {}ms",
                path,
                handle.token(),
                handle.opened_at().elapsed().whole_milliseconds()
            );
        }
        self.update_gauge();
        Ok(())
    }

    pub fn lookup_by_token(&self, token: &str) -> Option<&DeviceHandle> {
        self.tokens
            .get(token)
            .and_then(|path| self.devices.get(path))
    }

    pub fn lookup_by_path(&self, path: &str) -> Option<&DeviceHandle> {
        self.devices.get(path)
    }

    /// Write one output report to the device registered under `token`.
    pub fn write(&mut self, token: &str, report: &[u8]) -> Result<usize> {
        let handle = self
            .tokens
            .get(token)
            .and_then(|path| self.devices.get_mut(path))
            .ok_or_else(|| RegistryError::NotFound(token.to_string()))?;
        handle.write(report)
    }

    /// True when `event` came from the live subscription of a registered
    /// device. Events queued before a deregistration fail this check.
    pub fn is_current(&self, event: &DeviceEvent) -> bool {
        self.lookup_by_token(event.token())
            .is_some_and(|h| h.subscription_id() == event.subscription())
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.devices.contains_key(path)
    }

    /// Registered paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.devices.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn handles(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Deregister everything; returns how many devices were closed.
    pub fn close_all(&mut self) -> usize {
        let paths = self.paths();
        let mut closed = 0;
        for path in paths {
            match self.deregister(&path) {
                Ok(()) => closed += 1,
                Err(e) => debug!("close_all: {e}"),
            }
        }
        closed
    }

    fn update_gauge(&self) {
        if let Some(m) = &self.metrics {
            m.devices_registered.set(self.devices.len() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hid_transport::MockBackend;
    use tokio::sync::mpsc;

    fn dali(path: &str) -> DeviceInfo {
        DeviceInfo::new(path)
            .with_ids(0x16c0, 0x05df)
            .with_product("DALIUSBInterface")
            .with_manufacturer("Lunatone")
    }

    fn setup(
        paths: &[&str],
    ) -> (
        MockBackend,
        DeviceRegistry,
        mpsc::UnboundedReceiver<DeviceEvent>,
    ) {
        let backend = MockBackend::with_devices(paths.iter().map(|p| dali(p)));
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = DeviceRegistry::new(Arc::new(backend.clone()), tx);
        (backend, registry, rx)
    }

    #[tokio::test]
    async fn test_register_opens_and_indexes() {
        let (backend, mut reg, _rx) = setup(&["/dev/hidraw1"]);
        let handle = reg.register(dali("/dev/hidraw1")).await.unwrap();
        assert_eq!(handle.token(), "dev-hidraw1");
        assert!(handle.is_open());
        assert!(!handle.opened_at().elapsed().is_negative());
        assert!(backend.is_open("/dev/hidraw1"));
        assert_eq!(
            reg.lookup_by_token("dev-hidraw1").unwrap().path(),
            "/dev/hidraw1"
        );
        assert!(reg.lookup_by_path("/dev/hidraw1").is_some());
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let (backend, mut reg, _rx) = setup(&["/dev/hidraw1"]);
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        let err = reg.register(dali("/dev/hidraw1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
        assert_eq!(reg.len(), 1);
        assert_eq!(backend.opened_total(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_leaves_no_state() {
        let (backend, mut reg, _rx) = setup(&["/dev/hidraw1"]);
        backend.fail_open("/dev/hidraw1", true);
        let err = reg.register(dali("/dev/hidraw1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::HardwareOpen { .. }));
        assert!(reg.is_empty());
        assert!(reg.lookup_by_token("dev-hidraw1").is_none());
        assert!(backend.open_paths().is_empty());

        // The failed attempt did not burn the token.
        backend.fail_open("/dev/hidraw1", false);
        let handle = reg.register(dali("/dev/hidraw1")).await.unwrap();
        assert_eq!(handle.token(), "dev-hidraw1");
    }

    #[tokio::test]
    async fn test_register_rejects_symbol_only_path() {
        let (backend, mut reg, _rx) = setup(&["///"]);
        let err = reg.register(dali("///")).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert_eq!(backend.opened_total(), 0);
    }

    #[tokio::test]
    async fn test_deregister_unknown_path() {
        let (_backend, mut reg, _rx) = setup(&["/dev/hidraw1"]);
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        let err = reg.deregister("/dev/hidraw9").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_closes_and_detaches() {
        let (backend, mut reg, mut rx) = setup(&["/dev/hidraw1"]);
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        reg.deregister("/dev/hidraw1").unwrap();

        assert!(reg.is_empty());
        assert!(reg.lookup_by_token("dev-hidraw1").is_none());
        assert!(!backend.is_open("/dev/hidraw1"));
        assert_eq!(backend.emit_data("/dev/hidraw1", &[1]), 0);
        assert!(rx.try_recv().is_err());

        let err = reg.deregister("/dev/hidraw1").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_events_carry_token_and_subscription() {
        let (backend, mut reg, mut rx) = setup(&["/dev/hidraw1"]);
        let sub = reg
            .register(dali("/dev/hidraw1"))
            .await
            .unwrap()
            .subscription_id();

        backend.emit_data("/dev/hidraw1", &[0x10, 0x20]);
        backend.emit_error("/dev/hidraw1", TransportError::Read("io".into()));

        let data = rx.try_recv().unwrap();
        assert_eq!(
            data,
            DeviceEvent::Data {
                subscription: sub,
                token: "dev-hidraw1".into(),
                report: vec![0x10, 0x20],
            }
        );
        assert!(reg.is_current(&data));
        let err = rx.try_recv().unwrap();
        assert!(matches!(err, DeviceEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_queued_event_is_stale_after_deregister() {
        let (backend, mut reg, mut rx) = setup(&["/dev/hidraw1"]);
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        backend.emit_data("/dev/hidraw1", &[1, 2, 3]);
        reg.deregister("/dev/hidraw1").unwrap();

        let late = rx.try_recv().unwrap();
        assert!(!reg.is_current(&late));

        // Re-registration issues a fresh token; the old event still does not match.
        let handle = reg.register(dali("/dev/hidraw1")).await.unwrap();
        assert_eq!(handle.token(), "dev-hidraw1-1");
        assert!(!reg.is_current(&late));
    }

    #[tokio::test]
    async fn test_write_by_token() {
        let (backend, mut reg, _rx) = setup(&["/dev/hidraw1"]);
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        assert_eq!(reg.write("dev-hidraw1", &[9, 8]).unwrap(), 2);
        assert_eq!(backend.written("/dev/hidraw1"), vec![vec![9, 8]]);

        assert!(matches!(
            reg.write("nope", &[1]),
            Err(RegistryError::NotFound(_))
        ));
        backend.fail_write("/dev/hidraw1", true);
        assert!(matches!(
            reg.write("dev-hidraw1", &[1]),
            Err(RegistryError::HardwareWrite { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_connections_match_entries() {
        let (backend, mut reg, _rx) = setup(&["/dev/hidraw1", "/dev/hidraw2", "/dev/hidraw3"]);
        for p in ["/dev/hidraw1", "/dev/hidraw2", "/dev/hidraw3"] {
            reg.register(dali(p)).await.unwrap();
        }
        reg.deregister("/dev/hidraw2").unwrap();
        assert_eq!(backend.open_paths(), reg.paths());

        assert_eq!(reg.close_all(), 2);
        assert!(backend.open_paths().is_empty());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_gauge_follows_registry() {
        let hub = crate::MetricsHub::new().unwrap();
        let (_backend, reg, _rx) = setup(&["/dev/hidraw1"]);
        let mut reg = reg.with_metrics(hub.dev.clone());
        reg.register(dali("/dev/hidraw1")).await.unwrap();
        assert_eq!(hub.dev.devices_registered.get(), 1);
        reg.deregister("/dev/hidraw1").unwrap();
        assert_eq!(hub.dev.devices_registered.get(), 0);
    }
}
