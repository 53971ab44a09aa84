//! HTTP client for the chat service: the streaming turn request plus the
//! persistence endpoints.

use crate::{
    error::{Error, Result},
    event::{StreamEvent, decode_event},
    frame::FrameDecoder,
};
use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// A stream of decoded chat events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Wire request for one chat turn.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    /// `None` asks the server to create a fresh conversation.
    conversation_id: Option<&'a str>,
    message: &'a str,
}

/// Catalog entry returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    /// Leading text of the latest reply, for list display.
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    conversations: Vec<ConversationSummary>,
}

/// Full conversation returned by the fetch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub messages: Vec<MessageDetail>,
}

/// One stored message inside a fetched conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDetail {
    pub id: Option<String>,
    pub role: String,
    pub text: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
}

/// Client for the chat service API.
///
/// Carries the bearer credential when one is configured; obtaining it is
/// the host application's concern.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: None,
        }
    }

    /// Attach a bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Open a streaming chat turn.
    ///
    /// A `conversation_id` of `None` asks the server to create a fresh
    /// conversation; its identity arrives in the stream's `meta` event. A
    /// non-success status before any frame is a terminal error; once the
    /// stream is open, transport failures surface as a final
    /// [`StreamEvent::Error`].
    pub async fn stream_chat(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<EventStream> {
        let response = self
            .request(reqwest::Method::POST, "/chat/stream")
            .json(&ChatRequest {
                conversation_id,
                message,
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(Box::pin(decode_stream(response.bytes_stream())))
    }

    /// List conversation summaries.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let response = self
            .request(reqwest::Method::GET, "/conversations/list")
            .send()
            .await?;
        let response = check_status(response).await?;
        let list: ListResponse = response.json().await?;
        Ok(list.conversations)
    }

    /// Fetch one conversation with its messages.
    pub async fn fetch_conversation(&self, id: &str) -> Result<ConversationDetail> {
        let response = self
            .request(reqwest::Method::GET, &format!("/conversations/{}", id))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Delete a conversation.
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/conversations/{}", id))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Set a conversation's pin flag.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/conversations/{}/pin", id),
            )
            .query(&[("pinned", pinned)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Set a message's favorite flag.
    pub async fn set_favorite(
        &self,
        conversation_id: &str,
        message_id: &str,
        favorite: bool,
    ) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!(
                    "/conversations/{}/messages/{}/favorite",
                    conversation_id, message_id
                ),
            )
            .query(&[("favorite", favorite)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Adapt a raw chunked body into decoded events.
///
/// Frames are reassembled across fragment boundaries; undecodable records
/// are dropped without ending the stream. A transport failure mid-read
/// yields a final error event, and whatever partial frame is left at
/// end-of-stream is logged and discarded, never merged into a record.
fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream! {
        let mut body = Box::pin(body);
        let mut decoder = FrameDecoder::new();
        while let Some(fragment) = body.next().await {
            let fragment = match fragment {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield StreamEvent::Error {
                        error: format!("stream transport failed: {}", e),
                    };
                    return;
                }
            };
            for record in decoder.push(fragment.as_ref()) {
                if let Some(event) = decode_event(&record) {
                    yield event;
                }
            }
        }
        if let Some(leftover) = decoder.finish() {
            tracing::warn!(
                "discarding {} bytes of incomplete trailing frame",
                leftover.len()
            );
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Status {
        status: status.as_u16(),
        message,
    })
}
