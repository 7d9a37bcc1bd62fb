use hid_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("device already registered: {0}")]
    AlreadyRegistered(String),
    #[error("device not registered: {0}")]
    NotFound(String),
    #[error("failed to open device {path}: {source}")]
    HardwareOpen {
        path: String,
        #[source]
        source: TransportError,
    },
    #[error("failed to write to device {path}: {source}")]
    HardwareWrite {
        path: String,
        #[source]
        source: TransportError,
    },
}
