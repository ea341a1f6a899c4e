use crate::envelope::Envelope;

/// Maximum inbound message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode an envelope to its JSON wire form.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    if envelope.message.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(envelope.message.len()));
    }
    serde_json::to_string(envelope).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Decode a JSON wire frame into an envelope.
pub fn decode_envelope(data: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str(data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}
