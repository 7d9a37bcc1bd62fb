use crate::{ChannelError, EnvelopeError};
use device_registry::RegistryError;
use frame_bus::BusError;
use hid_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("no device registered for token {0:?}")]
    RouteMissing(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to publish report from {path}: {source}")]
    Publish {
        path: String,
        #[source]
        source: BusError,
    },
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("device enumeration failed: {0}")]
    Discovery(#[source] TransportError),
}

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;
