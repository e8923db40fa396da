use serde::{Deserialize, Serialize};

/// Message envelope carried over the client ↔ relay WebSocket.
///
/// Every frame is a self-describing JSON object with a `type`
/// discriminator. Unknown discriminators fail deserialization as a
/// whole; there is no partial parse.
///
/// | direction | type     | fields               |
/// |-----------|----------|----------------------|
/// | C→S       | `text`   | `text`               |
/// | C→S       | `audio`  | `base64`             |
/// | C→S       | `reset`  | —                    |
/// | S→C       | `status` | `message`            |
/// | S→C       | `text`   | `text`               |
/// | S→C       | `audio`  | `base64`, `mimeType` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportMessage {
    /// User text input (C→S) or model text output (S→C)
    Text { text: String },

    /// One PCM16 frame, base64-encoded. The relay attaches the
    /// upstream blob's mime type on the way down; clients omit it.
    Audio {
        base64: String,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    /// Request upstream session replacement (C→S only)
    Reset,

    /// Human-readable lifecycle event (S→C only)
    Status { message: String },
}

impl TransportMessage {
    pub fn status(message: impl Into<String>) -> Self {
        TransportMessage::Status {
            message: message.into(),
        }
    }

    /// Shape validation beyond what serde enforces: payload-carrying
    /// variants must not be empty.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            TransportMessage::Text { text } if text.is_empty() => Err("empty text field"),
            TransportMessage::Audio { base64, .. } if base64.is_empty() => {
                Err("empty base64 field")
            }
            _ => Ok(()),
        }
    }
}
