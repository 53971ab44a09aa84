//! Typed events decoded from stream records.

use serde::{Deserialize, Serialize};

/// Tag prefixing every well-formed record on the wire.
pub const FRAME_TAG: &str = "data: ";

/// One event in a chat stream.
///
/// The server frames each event as `data: <json>` with a `type` field
/// selecting the variant. Event types this client does not know map to
/// [`StreamEvent::Unknown`] so a newer server does not break an older
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Server-assigned identity of the conversation this stream belongs to
    Meta { conversation_id: String },
    /// A fragment of the assistant's reply
    Content { chunk: String },
    /// Terminal event of a successful turn, carrying the persisted ids
    Done {
        #[serde(default)]
        user_message_id: Option<String>,
        #[serde(default)]
        assistant_message_id: Option<String>,
    },
    /// Terminal event of a failed turn
    Error { error: String },
    /// Unrecognized event type; ignored
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Check if this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Decode one raw record into an event.
///
/// Records without the frame tag are dropped silently. Tagged records that
/// fail to parse are logged and dropped; a bad record never terminates the
/// stream.
pub fn decode_event(record: &str) -> Option<StreamEvent> {
    let payload = record.strip_prefix(FRAME_TAG)?;
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("dropping malformed stream record: {}", e);
            None
        }
    }
}
