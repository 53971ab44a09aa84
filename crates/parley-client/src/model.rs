//! Client-side data model: conversations and their messages.

use chrono::{DateTime, Utc};
use parley_wire::{ConversationDetail, MessageDetail};
use serde::{Deserialize, Serialize};

/// Sentinel id for a conversation that exists client-side but has not been
/// persisted by the server yet.
pub const PROVISIONAL_ID: &str = "temp";

/// Title shown for a conversation before the server names it.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-issued id; absent until the turn that produced this message
    /// has been acknowledged.
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
}

impl ChatMessage {
    /// A user message carrying the submitted prompt.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            favorite: false,
        }
    }

    /// The empty assistant message a stream accumulates into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: None,
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            favorite: false,
        }
    }
}

/// A conversation as the client sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
}

impl Conversation {
    /// Create a conversation the server does not know about yet.
    pub fn provisional() -> Self {
        Self {
            id: PROVISIONAL_ID.to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            updated_at: Utc::now(),
            pinned: false,
        }
    }

    /// Whether this conversation still carries the provisional marker.
    pub fn is_provisional(&self) -> bool {
        self.id == PROVISIONAL_ID
    }

    /// Whether no turn has been exchanged yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the user's prompt and the empty assistant placeholder for a
    /// new turn. The placeholder is the only message mutated while the
    /// turn streams.
    pub fn begin_turn(&mut self, prompt: &str) {
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::assistant_placeholder());
    }

    /// Append a streamed chunk to the trailing assistant message.
    ///
    /// Returns false, changing nothing, when the tail is not an assistant
    /// message. That can only happen on out-of-order delivery.
    pub fn append_chunk(&mut self, chunk: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(chunk);
                true
            }
            _ => false,
        }
    }

    /// Attach the server-issued ids from a completed turn: the assistant
    /// id to the last message, the user id to the one before it. No-op
    /// unless the list holds both turn messages.
    pub fn attach_turn_ids(&mut self, user_message_id: &str, assistant_message_id: &str) {
        let len = self.messages.len();
        if len < 2 {
            return;
        }
        self.messages[len - 1].id = Some(assistant_message_id.to_string());
        self.messages[len - 2].id = Some(user_message_id.to_string());
    }

    /// Favorited messages, in conversation order.
    pub fn favorites(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.favorite)
    }
}

impl From<ConversationDetail> for Conversation {
    fn from(detail: ConversationDetail) -> Self {
        Self {
            id: detail.id,
            title: detail.title,
            updated_at: detail.last_updated,
            pinned: detail.pinned,
            messages: detail.messages.into_iter().map(ChatMessage::from).collect(),
        }
    }
}

impl From<MessageDetail> for ChatMessage {
    fn from(detail: MessageDetail) -> Self {
        Self {
            id: detail.id,
            role: if detail.role == "user" {
                Role::User
            } else {
                Role::Assistant
            },
            content: detail.text,
            timestamp: detail.date,
            favorite: detail.favorite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_turn_appends_user_then_placeholder() {
        let mut conversation = Conversation::provisional();
        conversation.begin_turn("hello");

        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "hello");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert!(conversation.messages[1].content.is_empty());
        assert!(conversation.messages.iter().all(|m| m.id.is_none()));
    }

    #[test]
    fn test_append_chunk_accumulates_exactly_once() {
        let mut conversation = Conversation::provisional();
        conversation.begin_turn("hi");

        for chunk in ["He", "llo", "!"] {
            assert!(conversation.append_chunk(chunk));
        }
        assert_eq!(conversation.messages[1].content, "Hello!");
    }

    #[test]
    fn test_append_chunk_noop_when_tail_is_user() {
        let mut conversation = Conversation::provisional();
        conversation.messages.push(ChatMessage::user("just me"));

        assert!(!conversation.append_chunk("stray"));
        assert_eq!(conversation.messages[0].content, "just me");
    }

    #[test]
    fn test_append_chunk_noop_when_empty() {
        let mut conversation = Conversation::provisional();
        assert!(!conversation.append_chunk("stray"));
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_attach_turn_ids_sets_last_two_only() {
        let mut conversation = Conversation::provisional();
        conversation.begin_turn("first");
        conversation.attach_turn_ids("u1", "a1");
        conversation.begin_turn("second");
        conversation.attach_turn_ids("u2", "a2");

        let ids: Vec<_> = conversation.messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                Some("u1".into()),
                Some("a1".into()),
                Some("u2".into()),
                Some("a2".into()),
            ]
        );
    }

    #[test]
    fn test_attach_turn_ids_requires_two_messages() {
        let mut conversation = Conversation::provisional();
        conversation.messages.push(ChatMessage::user("alone"));
        conversation.attach_turn_ids("u1", "a1");
        assert_eq!(conversation.messages[0].id, None);
    }

    #[test]
    fn test_favorites_preserve_order() {
        let mut conversation = Conversation::provisional();
        for (content, favorite) in [("a", true), ("b", false), ("c", true)] {
            let mut message = ChatMessage::user(content);
            message.favorite = favorite;
            conversation.messages.push(message);
        }
        let favorites: Vec<_> = conversation.favorites().map(|m| m.content.as_str()).collect();
        assert_eq!(favorites, vec!["a", "c"]);
    }

    #[test]
    fn test_from_detail_maps_roles() {
        let detail = ConversationDetail {
            id: "c1".into(),
            title: "Trip planning".into(),
            last_updated: Utc::now(),
            pinned: true,
            messages: vec![
                MessageDetail {
                    id: Some("m1".into()),
                    role: "user".into(),
                    text: "where to?".into(),
                    date: Utc::now(),
                    favorite: false,
                },
                MessageDetail {
                    id: Some("m2".into()),
                    role: "assistant".into(),
                    text: "somewhere warm".into(),
                    date: Utc::now(),
                    favorite: true,
                },
            ],
        };

        let conversation = Conversation::from(detail);
        assert!(!conversation.is_provisional());
        assert!(conversation.pinned);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert!(conversation.messages[1].favorite);
    }
}
