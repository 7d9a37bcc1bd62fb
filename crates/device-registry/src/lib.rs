//! device-registry: live registry of open HID devices and their routing tokens

mod error;
pub use error::{RegistryError, Result};

mod identifier;
pub use identifier::{is_valid_token, PathIdentifier};

mod event;
pub use event::{DeviceEvent, DeviceEventSink};

mod handle;
pub use handle::{DeviceHandle, Subscription, SubscriptionId};

mod filter;
pub use filter::DeviceFilter;

mod registry;
pub use registry::DeviceRegistry;

mod metrics;
pub use metrics::{DeviceMetrics, MetricsHub};
