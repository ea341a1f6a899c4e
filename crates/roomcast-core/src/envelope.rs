use serde::{Deserialize, Serialize};

/// The broadcast envelope delivered to every room member.
///
/// Serialized on the wire as a UTF-8 JSON text frame:
/// `{"room_id": <id>, "message": <raw text>}`. The message payload is
/// opaque to the server; only the room context is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub room_id: String,
    pub message: String,
}

impl Envelope {
    pub fn new(room_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            message: message.into(),
        }
    }
}
