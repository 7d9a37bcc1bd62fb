use crate::{BridgeError, Result};
use device_registry::{DeviceFilter, DeviceRegistry};
use hid_transport::{DeviceInfo, HidBackend, TransportError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of one hardware listing after the allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub matching: Vec<DeviceInfo>,
    pub total: usize,
}

/// Changes needed to make the registry mirror a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_add: Vec<DeviceInfo>,
    pub to_remove: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Outcome of a discovery pass or reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub listed: usize,
    pub matching: usize,
    pub registered: Vec<String>,
    pub deregistered: Vec<String>,
    /// `(path, reason)` for devices that could not be registered.
    pub failed: Vec<(String, String)>,
    pub list_error: Option<String>,
}

impl TickReport {
    pub fn changed(&self) -> bool {
        !self.registered.is_empty() || !self.deregistered.is_empty()
    }
}

/// Compare matching hardware against registered paths.
///
/// Listed devices are deduplicated by path; a registered path is removed only
/// when it is absent from the listing.
pub fn plan(listed: &[DeviceInfo], registered: &[String]) -> ReconcilePlan {
    let registered_set: HashSet<&str> = registered.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let to_add = listed
        .iter()
        .filter(|d| seen.insert(d.path.as_str()) && !registered_set.contains(d.path.as_str()))
        .cloned()
        .collect();
    let to_remove = registered
        .iter()
        .filter(|path| !seen.contains(path.as_str()))
        .cloned()
        .collect();
    ReconcilePlan { to_add, to_remove }
}

/// Enumerates hardware through the allow-list and drives the registry toward it.
pub struct Discovery {
    backend: Arc<dyn HidBackend>,
    filter: DeviceFilter,
    interval: Duration,
}

impl Discovery {
    pub fn new(backend: Arc<dyn HidBackend>, filter: DeviceFilter, interval: Duration) -> Self {
        Self {
            backend,
            filter,
            interval,
        }
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn scan(&self) -> Result<Scan> {
        let backend = self.backend.clone();
        let listed = tokio::task::spawn_blocking(move || backend.list())
            .await
            .map_err(|e| BridgeError::Discovery(TransportError::Enumerate(e.to_string())))?
            .map_err(BridgeError::Discovery)?;
        let total = listed.len();
        let matching = self
            .filter
            .apply(listed)
            .into_iter()
            .filter(|d| {
                if d.path.is_empty() {
                    error!("device path is undefined, skipping {d}");
                }
                !d.path.is_empty()
            })
            .collect();
        Ok(Scan { matching, total })
    }

    /// Single pass: register every matching device not yet registered.
    pub async fn discover_once(&self, registry: &mut DeviceRegistry) -> TickReport {
        let scan = match self.scan().await {
            Ok(scan) => scan,
            Err(e) => {
                error!("{e}");
                return TickReport {
                    list_error: Some(e.to_string()),
                    ..TickReport::default()
                };
            }
        };
        info!(
            "discovered {}/{} HID devices matching products: {}",
            scan.matching.len(),
            scan.total,
            self.describe_filter()
        );
        let mut plan = plan(&scan.matching, &registry.paths());
        plan.to_remove.clear();
        apply(registry, &scan, plan).await
    }

    /// One reconciliation step. A failed listing changes nothing.
    pub async fn tick(&self, registry: &mut DeviceRegistry) -> TickReport {
        let scan = match self.scan().await {
            Ok(scan) => scan,
            Err(e) => {
                warn!("{e}; keeping current registrations");
                return TickReport {
                    list_error: Some(e.to_string()),
                    ..TickReport::default()
                };
            }
        };
        let plan = plan(&scan.matching, &registry.paths());
        if plan.is_empty() {
            debug!("reconcile: {} devices registered, nothing to do", registry.len());
        } else {
            info!(
                "reconcile: {} to register, {} to deregister",
                plan.to_add.len(),
                plan.to_remove.len()
            );
        }
        apply(registry, &scan, plan).await
    }

    fn describe_filter(&self) -> String {
        let mut parts: Vec<String> = self.filter.products.clone();
        parts.extend(self.filter.product_ids.iter().map(|id| format!("{id:#06x}")));
        if parts.is_empty() {
            "(none)".into()
        } else {
            parts.join(", ")
        }
    }
}

async fn apply(registry: &mut DeviceRegistry, scan: &Scan, plan: ReconcilePlan) -> TickReport {
    let mut report = TickReport {
        listed: scan.total,
        matching: scan.matching.len(),
        ..TickReport::default()
    };
    for device in plan.to_add {
        let path = device.path.clone();
        match registry.register(device).await {
            Ok(_) => report.registered.push(path),
            Err(e) => {
                error!("failed to register {path}: {e}");
                report.failed.push((path, e.to_string()));
            }
        }
    }
    for path in plan.to_remove {
        match registry.deregister(&path) {
            Ok(()) => report.deregistered.push(path),
            Err(e) => warn!("failed to deregister {path}: {e}"),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use hid_transport::MockBackend;
    use tokio::sync::mpsc;

    fn dali(path: &str) -> DeviceInfo {
        DeviceInfo::new(path).with_product("DALIUSBInterface")
    }

    fn paths(devices: &[DeviceInfo]) -> Vec<&str> {
        devices.iter().map(|d| d.path.as_str()).collect()
    }

    fn setup(devices: Vec<DeviceInfo>) -> (MockBackend, Discovery, DeviceRegistry) {
        let backend = MockBackend::with_devices(devices);
        let shared: Arc<dyn HidBackend> = Arc::new(backend.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let discovery = Discovery::new(
            shared.clone(),
            DeviceFilter::products(["DALIUSBInterface"]),
            Duration::from_secs(5),
        );
        (backend, discovery, DeviceRegistry::new(shared, tx))
    }

    #[test]
    fn test_plan_adds_and_removes() {
        let listed = vec![dali("A"), dali("B")];
        let registered = vec!["A".to_string(), "C".to_string()];
        let plan = plan(&listed, &registered);
        assert_eq!(paths(&plan.to_add), vec!["B"]);
        assert_eq!(plan.to_remove, vec!["C".to_string()]);
    }

    #[test]
    fn test_plan_dedupes_listing() {
        let listed = vec![dali("A"), dali("A"), dali("B")];
        let plan = plan(&listed, &[]);
        assert_eq!(paths(&plan.to_add), vec!["A", "B"]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_plan_empty_listing_removes_everything() {
        let plan = plan(&[], &["A".to_string()]);
        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_remove, vec!["A".to_string()]);
        assert!(super::plan(&[dali("A")], &["A".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn test_scan_applies_filter_and_skips_missing_path() {
        let (_backend, discovery, _registry) = setup(vec![
            dali("A"),
            DeviceInfo::new("M").with_product("USB Mouse"),
            dali(""),
        ]);
        let scan = discovery.scan().await.unwrap();
        assert_eq!(scan.total, 3);
        assert_eq!(paths(&scan.matching), vec!["A"]);
    }

    #[tokio::test]
    async fn test_tick_converges_registry_to_hardware() {
        let (backend, discovery, mut registry) = setup(vec![dali("A"), dali("C")]);
        discovery.tick(&mut registry).await;
        assert_eq!(registry.paths(), vec!["A", "C"]);

        backend.unplug("C");
        backend.plug(dali("B"));
        let report = discovery.tick(&mut registry).await;
        assert_eq!(registry.paths(), vec!["A", "B"]);
        assert_eq!(report.registered, vec!["B".to_string()]);
        assert_eq!(report.deregistered, vec!["C".to_string()]);
        assert!(!backend.is_open("C"));
        assert_eq!(backend.open_paths(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_tick_isolates_open_failures_and_retries() {
        let (backend, discovery, mut registry) = setup(vec![dali("A"), dali("B"), dali("C")]);
        backend.fail_open("B", true);
        let report = discovery.tick(&mut registry).await;
        assert_eq!(registry.paths(), vec!["A", "C"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "B");

        backend.fail_open("B", false);
        let report = discovery.tick(&mut registry).await;
        assert_eq!(report.registered, vec!["B".to_string()]);
        assert_eq!(registry.paths(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_list_failure_keeps_registrations() {
        let (backend, discovery, mut registry) = setup(vec![dali("A")]);
        discovery.tick(&mut registry).await;
        backend.set_list_error(Some("usb bus reset"));
        let report = discovery.tick(&mut registry).await;
        assert!(report.list_error.is_some());
        assert!(!report.changed());
        assert_eq!(registry.paths(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_discover_once_registers_without_removing() {
        let (backend, discovery, mut registry) = setup(vec![dali("A"), dali("B")]);
        let report = discovery.discover_once(&mut registry).await;
        assert_eq!(report.registered, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.matching, 2);

        backend.unplug("B");
        let report = discovery.discover_once(&mut registry).await;
        assert!(!report.changed());
        assert_eq!(registry.paths(), vec!["A", "B"]);
    }
}
