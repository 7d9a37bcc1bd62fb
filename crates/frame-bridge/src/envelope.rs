use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Discriminator of the binary payload envelope.
pub const BUFFER_TYPE: &str = "Buffer";

/// Binary report as it travels over the bus: `{"type":"Buffer","data":[..]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a [u8],
}

impl<'a> BufferEnvelope<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            kind: BUFFER_TYPE,
            data,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed message payload: {0}")]
    Malformed(String),
    #[error("invalid buffer data: {0}")]
    InvalidData(String),
}

/// Decode an inbound payload.
///
/// `Ok(None)` means the message is valid JSON but not a binary envelope and
/// should be skipped without complaint.
pub fn decode_inbound(payload: &str) -> Result<Option<Vec<u8>>, EnvelopeError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    if value.get("type").and_then(Value::as_str) != Some(BUFFER_TYPE) {
        return Ok(None);
    }
    let Some(items) = value.get("data").and_then(Value::as_array) else {
        return Err(EnvelopeError::InvalidData("`data` is not an array".into()));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| EnvelopeError::InvalidData(format!("element {i} ({item}) is not a byte")))
        })
        .collect::<Result<Vec<u8>, _>>()
        .map(Some)
}
