use crate::{
    DataListener, DeviceInfo, ErrorListener, HidBackend, HidConnection, ListenerSet, Result,
    TransportError,
};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Poll period of the reader thread; bounds how long `close` waits.
const READ_TIMEOUT_MS: i32 = 50;
const MAX_REPORT_LEN: usize = 1024;

/// Native HID access through `hidapi` (hidraw on Linux, IOHIDManager on macOS).
pub struct HidapiBackend {
    api: Mutex<HidApi>,
}

impl HidapiBackend {
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|e| TransportError::Enumerate(e.to_string()))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }
}

impl HidBackend for HidapiBackend {
    fn list(&self) -> Result<Vec<DeviceInfo>> {
        let mut api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        api.refresh_devices()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;
        Ok(api
            .device_list()
            .map(|d| DeviceInfo {
                path: d.path().to_string_lossy().into_owned(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                product: d.product_string().map(str::to_string),
                manufacturer: d.manufacturer_string().map(str::to_string),
                serial_number: d.serial_number().map(str::to_string),
            })
            .collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn HidConnection>> {
        let open_err = |reason: String| TransportError::Open {
            path: path.to_string(),
            reason,
        };
        let c_path = CString::new(path).map_err(|_| open_err("path contains NUL".into()))?;
        let device = {
            let api = self.api.lock().unwrap_or_else(PoisonError::into_inner);
            api.open_path(&c_path).map_err(|e| open_err(e.to_string()))?
        };
        let conn = HidapiConnection::spawn(path, device).map_err(open_err)?;
        Ok(Box::new(conn))
    }
}

/// An open hidapi device with a dedicated reader thread.
pub struct HidapiConnection {
    path: String,
    device: Option<Arc<Mutex<HidDevice>>>,
    listeners: ListenerSet,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl HidapiConnection {
    fn spawn(path: &str, device: HidDevice) -> core::result::Result<Self, String> {
        let device = Arc::new(Mutex::new(device));
        let listeners = ListenerSet::new();
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let device = device.clone();
            let listeners = listeners.clone();
            let running = running.clone();
            let path = path.to_string();
            thread::Builder::new()
                .name("hid-reader".to_string())
                .spawn(move || read_loop(&path, &device, &listeners, &running))
                .map_err(|e| e.to_string())?
        };

        Ok(Self {
            path: path.to_string(),
            device: Some(device),
            listeners,
            running,
            reader: Some(reader),
        })
    }
}

fn read_loop(path: &str, device: &Mutex<HidDevice>, listeners: &ListenerSet, running: &AtomicBool) {
    let mut buf = [0u8; MAX_REPORT_LEN];
    while running.load(Ordering::Acquire) {
        let res = {
            let dev = device.lock().unwrap_or_else(PoisonError::into_inner);
            dev.read_timeout(&mut buf, READ_TIMEOUT_MS)
        };
        match res {
            Ok(0) => continue,
            Ok(n) => {
                listeners.emit_data(&buf[..n]);
            }
            Err(e) => {
                if running.load(Ordering::Acquire) {
                    warn!("hid read error on {path}: {e}");
                    listeners.emit_error(&TransportError::Read(e.to_string()));
                }
                break;
            }
        }
    }
    debug!("hid reader for {path} stopped");
}

impl HidConnection for HidapiConnection {
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
        let device = self.device.as_ref().ok_or(TransportError::Closed)?;
        let dev = device.lock().unwrap_or_else(PoisonError::into_inner);
        dev.write(report)
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("hid reader for {} panicked", self.path);
            }
        }
        // Last reference: dropping it closes the OS handle.
        self.device = None;
        Ok(())
    }
}

impl Drop for HidapiConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
