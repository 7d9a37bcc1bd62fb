use crate::{DataListener, DeviceInfo, ErrorListener, Result};

/// A blocking HID driver: enumeration plus opening connections by path.
pub trait HidBackend: Send + Sync {
    /// Attempt to list the devices currently attached to this backend.
    fn list(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a device by the path reported from [`HidBackend::list`].
    fn open(&self, path: &str) -> Result<Box<dyn HidConnection>>;
}

/// An open device. Input reports are pushed to registered listeners by the
/// backend; output reports are written synchronously.
pub trait HidConnection: Send {
    fn path(&self) -> &str;

    /// Register a listener for input reports.
    fn on_data(&mut self, listener: DataListener);

    /// Register a listener for device errors.
    fn on_error(&mut self, listener: ErrorListener);

    /// Detach every listener. No callback may fire once this returns.
    fn remove_all_listeners(&mut self);

    /// Send one output report, returning the number of bytes written.
    fn write(&mut self, report: &[u8]) -> Result<usize>;

    /// Release the underlying hardware handle. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}
