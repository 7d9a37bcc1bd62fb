use crate::TransportError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback fired with every input report read from a device.
pub type DataListener = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Callback fired when a device reports an I/O failure.
pub type ErrorListener = Box<dyn Fn(&TransportError) + Send + Sync>;

#[derive(Default)]
struct Inner {
    data: Vec<DataListener>,
    error: Vec<ErrorListener>,
}

/// Listener lists shared between a connection and its reader.
///
/// Listeners are invoked while the internal lock is held, so once
/// [`ListenerSet::clear`] returns no callback is running and none will run.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<Mutex<Inner>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking listener must not wedge the device.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_data(&self, listener: DataListener) {
        self.lock().data.push(listener);
    }

    pub fn add_error(&self, listener: ErrorListener) {
        self.lock().error.push(listener);
    }

    /// Returns the number of data listeners that were fired.
    pub fn emit_data(&self, report: &[u8]) -> usize {
        let inner = self.lock();
        for listener in &inner.data {
            listener(report);
        }
        inner.data.len()
    }

    pub fn emit_error(&self, err: &TransportError) -> usize {
        let inner = self.lock();
        for listener in &inner.error {
            listener(err);
        }
        inner.error.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.data.clear();
        inner.error.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.data.len() + inner.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same listener lists.
    pub fn same(&self, other: &ListenerSet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
