use crate::{DeviceEvent, DeviceEventSink, RegistryError, Result};
use hid_transport::{DeviceInfo, HidConnection, Timestamp, TransportError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Revocable link between one connection's listeners and the event queue.
///
/// Listeners check the flag before forwarding anything; revoking it is the
/// first step of closing a handle.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId) -> Self {
        Self {
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// One open device: its metadata, routing token, connection and subscription,
/// assembled once at registration.
pub struct DeviceHandle {
    info: DeviceInfo,
    token: String,
    connection: Box<dyn HidConnection>,
    subscription: Subscription,
    opened_at: Timestamp,
    open: bool,
}

impl DeviceHandle {
    pub(crate) fn attach(
        info: DeviceInfo,
        token: String,
        mut connection: Box<dyn HidConnection>,
        events: &DeviceEventSink,
        subscription: Subscription,
    ) -> Self {
        {
            let sink = events.clone();
            let sub = subscription.clone();
            let token = token.clone();
            connection.on_data(Box::new(move |report| {
                if !sub.is_active() {
                    return;
                }
                let _ = sink.send(DeviceEvent::Data {
                    subscription: sub.id(),
                    token: token.clone(),
                    report: report.to_vec(),
                });
            }));
        }
        {
            let sink = events.clone();
            let sub = subscription.clone();
            let token = token.clone();
            connection.on_error(Box::new(move |err| {
                if !sub.is_active() {
                    return;
                }
                let _ = sink.send(DeviceEvent::Error {
                    subscription: sub.id(),
                    token: token.clone(),
                    error: err.clone(),
                });
            }));
        }

        Self {
            info,
            token,
            connection,
            subscription,
            opened_at: Timestamp::now(),
            open: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// Send one output report to the device.
    pub fn write(&mut self, report: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(RegistryError::HardwareWrite {
                path: self.info.path.clone(),
                source: TransportError::Closed,
            });
        }
        self.connection
            .write(report)
            .map_err(|source| RegistryError::HardwareWrite {
                path: self.info.path.clone(),
                source,
            })
    }

    /// Revoke the subscription, detach listeners, then release the hardware.
    pub(crate) fn close(&mut self) -> core::result::Result<(), TransportError> {
        self.subscription.revoke();
        self.connection.remove_all_listeners();
        self.open = false;
        self.connection.close()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.info.path)
            .field("token", &self.token)
            .field("subscription", &self.subscription.id())
            .field("open", &self.open)
            .finish()
    }
}
