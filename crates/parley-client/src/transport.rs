//! Backend seam between the client core and the chat service.

use async_trait::async_trait;
use parley_wire::{ApiClient, ConversationDetail, ConversationSummary, EventStream};

/// Operations the client core needs from the chat service.
///
/// [`ApiClient`] is the production implementation; tests substitute
/// scripted mocks.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a streaming turn. `conversation_id` is `None` for a
    /// conversation the server has not created yet.
    async fn open_stream(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> parley_wire::Result<EventStream>;

    /// List conversation summaries.
    async fn list_conversations(&self) -> parley_wire::Result<Vec<ConversationSummary>>;

    /// Fetch one conversation with its messages.
    async fn fetch_conversation(&self, id: &str) -> parley_wire::Result<ConversationDetail>;

    /// Delete a conversation.
    async fn delete_conversation(&self, id: &str) -> parley_wire::Result<()>;

    /// Set a conversation's pin flag.
    async fn set_pinned(&self, id: &str, pinned: bool) -> parley_wire::Result<()>;

    /// Set a message's favorite flag.
    async fn set_favorite(
        &self,
        conversation_id: &str,
        message_id: &str,
        favorite: bool,
    ) -> parley_wire::Result<()>;
}

#[async_trait]
impl Backend for ApiClient {
    async fn open_stream(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> parley_wire::Result<EventStream> {
        self.stream_chat(conversation_id, message).await
    }

    async fn list_conversations(&self) -> parley_wire::Result<Vec<ConversationSummary>> {
        ApiClient::list_conversations(self).await
    }

    async fn fetch_conversation(&self, id: &str) -> parley_wire::Result<ConversationDetail> {
        ApiClient::fetch_conversation(self, id).await
    }

    async fn delete_conversation(&self, id: &str) -> parley_wire::Result<()> {
        ApiClient::delete_conversation(self, id).await
    }

    async fn set_pinned(&self, id: &str, pinned: bool) -> parley_wire::Result<()> {
        ApiClient::set_pinned(self, id, pinned).await
    }

    async fn set_favorite(
        &self,
        conversation_id: &str,
        message_id: &str,
        favorite: bool,
    ) -> parley_wire::Result<()> {
        ApiClient::set_favorite(self, conversation_id, message_id, favorite).await
    }
}
