use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("device enumeration failed: {0}")]
    Enumerate(String),
    #[error("connection closed")]
    Closed,
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
}
