//! Session-scoped state: the conversation catalog and the active
//! conversation.

use crate::model::{Conversation, PROVISIONAL_ID};
use parley_wire::ConversationSummary;

/// Where the in-flight turn currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Finalizing,
    Failed,
}

/// All client-side chat state for one session.
///
/// Owned by the [`crate::ChatClient`] and passed by reference to the
/// components that act on it; nothing here is global.
#[derive(Default)]
pub struct SessionStore {
    /// Sorted conversation catalog.
    pub catalog: Vec<ConversationSummary>,
    /// The conversation currently loaded, if any.
    pub active: Option<Conversation>,
    /// Lifecycle phase of the in-flight turn.
    pub phase: TurnPhase,
    /// Terminal error of the most recent turn, if it failed.
    pub last_error: Option<String>,
}

impl SessionStore {
    /// Re-establish the catalog's total order: pinned first, then most
    /// recently updated.
    pub fn sort_catalog(&mut self) {
        self.catalog.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.last_updated.cmp(&a.last_updated))
        });
    }

    /// Merge server summaries into the catalog.
    ///
    /// Server entries replace everything the server knows about; a
    /// provisional entry the server cannot know about yet is kept.
    pub fn merge_summaries(&mut self, summaries: Vec<ConversationSummary>) {
        let provisional = self
            .catalog
            .iter()
            .find(|c| c.id == PROVISIONAL_ID)
            .cloned();
        self.catalog = summaries;
        if let Some(entry) = provisional {
            self.catalog.push(entry);
        }
        self.sort_catalog();
    }

    /// Promote the provisional conversation to its server-assigned id,
    /// rewriting the active conversation and the single provisional
    /// catalog entry together.
    ///
    /// Idempotent: calling it again, or when nothing is provisional,
    /// changes nothing. Returns whether a rewrite happened.
    pub fn promote(&mut self, conversation_id: &str) -> bool {
        let mut promoted = false;
        if let Some(active) = self.active.as_mut() {
            if active.is_provisional() {
                active.id = conversation_id.to_string();
                promoted = true;
            }
        }
        if let Some(entry) = self.catalog.iter_mut().find(|c| c.id == PROVISIONAL_ID) {
            entry.id = conversation_id.to_string();
            promoted = true;
        }
        if promoted {
            self.sort_catalog();
        }
        promoted
    }

    /// Make a provisional conversation the active one.
    ///
    /// At most one provisional entry ever exists: when the catalog already
    /// holds one it is reused rather than duplicated.
    pub fn open_provisional(&mut self) {
        let conversation = Conversation::provisional();
        if !self.catalog.iter().any(|c| c.id == PROVISIONAL_ID) {
            self.catalog.push(summary_of(&conversation));
            self.sort_catalog();
        }
        self.active = Some(conversation);
    }
}

fn summary_of(conversation: &Conversation) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id.clone(),
        title: conversation.title.clone(),
        last_updated: conversation.updated_at,
        pinned: conversation.pinned,
        preview: None,
    }
}
