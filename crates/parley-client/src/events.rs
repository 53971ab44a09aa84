//! Session events consumed by the hosting UI.

use serde::{Deserialize, Serialize};

/// Events emitted while the client mutates session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A turn was accepted and its request is going out
    TurnStart { conversation_id: String },

    /// A content chunk was appended to the streaming assistant message
    Chunk { delta: String },

    /// The provisional conversation received its server identity
    Promoted { conversation_id: String },

    /// The turn completed; ids are present when the server acknowledged
    /// both messages
    TurnEnd {
        user_message_id: Option<String>,
        assistant_message_id: Option<String>,
    },

    /// The turn ended without completing; partial content is retained
    TurnFailed { message: String },

    /// The conversation catalog changed (refresh, pin, delete, new)
    CatalogChanged,

    /// Outcome of a favorite toggle. `confirmed` is false when the server
    /// rejected the change and the prior value was restored
    FavoriteChanged {
        message_id: String,
        favorite: bool,
        confirmed: bool,
    },
}

impl SessionEvent {
    /// Check if this event ends the current turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::TurnEnd { .. } | SessionEvent::TurnFailed { .. }
        )
    }
}
