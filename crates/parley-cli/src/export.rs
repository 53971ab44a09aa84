//! Plain-text transcript export.

use parley_client::{Conversation, Role};
use std::path::PathBuf;

/// Format a conversation as readable text, one block per message.
pub fn format_transcript(conversation: &Conversation) -> String {
    conversation
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
            };
            format!("[{}] {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Default export filename derived from the conversation title.
pub fn default_filename(title: &str) -> PathBuf {
    let stem: String = title.split_whitespace().collect::<Vec<_>>().join("_");
    let stem = if stem.is_empty() {
        "conversation".to_string()
    } else {
        stem
    };
    PathBuf::from(format!("{}_history.txt", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_client::ChatMessage;

    #[test]
    fn test_transcript_labels_roles() {
        let mut conversation = Conversation::provisional();
        conversation.messages.push(ChatMessage::user("hello"));
        let mut reply = ChatMessage::assistant_placeholder();
        reply.content = "hi there".into();
        conversation.messages.push(reply);

        assert_eq!(
            format_transcript(&conversation),
            "[USER] hello\n\n[ASSISTANT] hi there"
        );
    }

    #[test]
    fn test_transcript_empty_conversation() {
        let conversation = Conversation::provisional();
        assert_eq!(format_transcript(&conversation), "");
    }

    #[test]
    fn test_filename_replaces_whitespace() {
        assert_eq!(
            default_filename("Trip  to the\tcoast"),
            PathBuf::from("Trip_to_the_coast_history.txt")
        );
    }

    #[test]
    fn test_filename_fallback_for_blank_title() {
        assert_eq!(
            default_filename("   "),
            PathBuf::from("conversation_history.txt")
        );
    }
}
