use thiserror::Error;

pub type Result<T, E = BusError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },
    #[error("bus not connected")]
    NotConnected,
    #[error("invalid subscription pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
