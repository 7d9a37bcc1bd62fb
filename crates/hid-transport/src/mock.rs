use crate::{
    DataListener, DeviceInfo, ErrorListener, HidBackend, HidConnection, ListenerSet, Result,
    TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockState {
    devices: Vec<DeviceInfo>,
    list_error: Option<String>,
    fail_open: HashSet<String>,
    fail_write: HashSet<String>,
    /// Listener lists of the live connection for each path.
    open: HashMap<String, ListenerSet>,
    written: HashMap<String, Vec<Vec<u8>>>,
    opened_total: usize,
}

/// A simple in-process mock driver. Clones share the same simulated hardware,
/// so a test can keep one clone to drive devices while the code under test
/// owns another.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = DeviceInfo>) -> Self {
        let backend = Self::new();
        for d in devices {
            backend.plug(d);
        }
        backend
    }

    /// Attach a device. Replaces any device already attached at the same path.
    pub fn plug(&self, device: DeviceInfo) {
        let mut st = lock(&self.state);
        st.devices.retain(|d| d.path != device.path);
        st.devices.push(device);
    }

    /// Detach a device; an open connection to it sees a read error.
    pub fn unplug(&self, path: &str) {
        let listeners = {
            let mut st = lock(&self.state);
            st.devices.retain(|d| d.path != path);
            st.open.get(path).cloned()
        };
        if let Some(listeners) = listeners {
            listeners.emit_error(&TransportError::Read(format!("{path} disconnected")));
        }
    }

    /// Make the next and all following enumerations fail (`None` restores).
    pub fn set_list_error(&self, reason: Option<&str>) {
        lock(&self.state).list_error = reason.map(str::to_string);
    }

    pub fn fail_open(&self, path: &str, fail: bool) {
        let mut st = lock(&self.state);
        if fail {
            st.fail_open.insert(path.to_string());
        } else {
            st.fail_open.remove(path);
        }
    }

    pub fn fail_write(&self, path: &str, fail: bool) {
        let mut st = lock(&self.state);
        if fail {
            st.fail_write.insert(path.to_string());
        } else {
            st.fail_write.remove(path);
        }
    }

    /// Push an input report through the live connection for `path`.
    /// Returns the number of listeners fired.
    pub fn emit_data(&self, path: &str, report: &[u8]) -> usize {
        let listeners = lock(&self.state).open.get(path).cloned();
        listeners.map_or(0, |l| l.emit_data(report))
    }

    pub fn emit_error(&self, path: &str, err: TransportError) -> usize {
        let listeners = lock(&self.state).open.get(path).cloned();
        listeners.map_or(0, |l| l.emit_error(&err))
    }

    /// Output reports written to `path`, oldest first.
    pub fn written(&self, path: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .written
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_open(&self, path: &str) -> bool {
        lock(&self.state).open.contains_key(path)
    }

    pub fn open_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.state).open.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Total number of successful opens since creation.
    pub fn opened_total(&self) -> usize {
        lock(&self.state).opened_total
    }
}

impl HidBackend for MockBackend {
    fn list(&self) -> Result<Vec<DeviceInfo>> {
        let st = lock(&self.state);
        if let Some(reason) = &st.list_error {
            return Err(TransportError::Enumerate(reason.clone()));
        }
        Ok(st.devices.clone())
    }

    fn open(&self, path: &str) -> Result<Box<dyn HidConnection>> {
        let mut st = lock(&self.state);
        if !st.devices.iter().any(|d| d.path == path) {
            return Err(TransportError::DeviceNotFound(path.to_string()));
        }
        if st.fail_open.contains(path) {
            return Err(TransportError::Open {
                path: path.to_string(),
                reason: "mock open failure".to_string(),
            });
        }
        let listeners = ListenerSet::new();
        st.open.insert(path.to_string(), listeners.clone());
        st.opened_total += 1;
        Ok(Box::new(MockConnection {
            path: path.to_string(),
            state: self.state.clone(),
            listeners,
            closed: false,
        }))
    }
}

/// Connection handed out by [`MockBackend`].
pub struct MockConnection {
    path: String,
    state: Arc<Mutex<MockState>>,
    listeners: ListenerSet,
    closed: bool,
}

impl HidConnection for MockConnection {
    fn path(&self) -> &str {
        &self.path
    }

    fn on_data(&mut self, listener: DataListener) {
        self.listeners.add_data(listener);
    }

    fn on_error(&mut self, listener: ErrorListener) {
        self.listeners.add_error(listener);
    }

    fn remove_all_listeners(&mut self) {
        self.listeners.clear();
    }

    fn write(&mut self, report: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut st = lock(&self.state);
        if st.fail_write.contains(&self.path) {
            return Err(TransportError::Write(format!(
                "mock write failure on {}",
                self.path
            )));
        }
        st.written
            .entry(self.path.clone())
            .or_default()
            .push(report.to_vec());
        Ok(report.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.listeners.clear();
        let mut st = lock(&self.state);
        // Only forget the path if it still points at this connection.
        if st
            .open
            .get(&self.path)
            .is_some_and(|l| l.same(&self.listeners))
        {
            st.open.remove(&self.path);
        }
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
