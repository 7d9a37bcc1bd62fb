//! hid-transport: cross-platform HID device abstractions
//!
//! This crate provides traits and types for enumerating and talking to
//! human-interface-class devices, with feature-gated backends. The default build
//! enables a `mock` backend so that binaries can compile on any host without
//! native drivers.

mod types;
pub use types::{DeviceInfo, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod listeners;
pub use listeners::{DataListener, ErrorListener, ListenerSet};

mod traits;
pub use traits::{HidBackend, HidConnection};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBackend, MockConnection};

#[cfg(feature = "hidapi")]
mod native;

#[cfg(feature = "hidapi")]
pub use native::{HidapiBackend, HidapiConnection};
