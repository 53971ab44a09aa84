//! The submit-and-stream turn lifecycle.

use crate::{
    client::ChatClient,
    error::{Error, Result},
    events::SessionEvent,
    store::TurnPhase,
};
use futures::StreamExt;
use parley_wire::{EventStream, StreamEvent};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy for opening the stream.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Tuning knobs for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Retry policy for opening a stream. Applies only before any frame
    /// has been read; a stream is never reopened mid-turn, since replaying
    /// a half-consumed stream could duplicate appended chunks.
    pub retry: RetryConfig,
    /// How long a single read may stall before the turn is failed.
    pub idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// How a turn ended.
enum TurnOutcome {
    Completed {
        user_message_id: Option<String>,
        assistant_message_id: Option<String>,
    },
    Failed(String),
    Cancelled,
}

impl ChatClient {
    /// Submit a prompt on the active conversation, creating a provisional
    /// one when nothing is active, and drive the stream to completion.
    ///
    /// Returns once the turn has finalized. Content accumulates into the
    /// store as it arrives; subscribe to [`SessionEvent`]s to observe it
    /// live. A second submission while a turn is in flight is refused.
    pub async fn submit(&self, prompt: &str) -> Result<()> {
        // Submitting: claim the turn slot and stage both turn messages.
        let (wire_id, start_id) = {
            let mut store = self.store.lock();
            if store.phase != TurnPhase::Idle {
                return Err(Error::Busy);
            }
            store.phase = TurnPhase::Submitting;
            store.last_error = None;
            if store.active.is_none() {
                store.open_provisional();
            }
            match store.active.as_mut() {
                Some(active) => {
                    active.begin_turn(prompt);
                    // The server creates a fresh conversation when the
                    // request carries no id.
                    let wire_id = if active.is_provisional() {
                        None
                    } else {
                        Some(active.id.clone())
                    };
                    (wire_id, active.id.clone())
                }
                None => {
                    store.phase = TurnPhase::Idle;
                    return Err(Error::NoConversation);
                }
            }
        };
        let _ = self.event_tx.send(SessionEvent::TurnStart {
            conversation_id: start_id,
        });

        // Fresh cancellation scope for this turn.
        let cancel = {
            let mut slot = self.cancel.lock();
            *slot = CancellationToken::new();
            slot.clone()
        };

        let outcome = self.drive_turn(wire_id.as_deref(), prompt, &cancel).await;

        if let TurnOutcome::Failed(ref message) = outcome {
            {
                let mut store = self.store.lock();
                store.phase = TurnPhase::Failed;
                store.last_error = Some(message.clone());
            }
            let _ = self.event_tx.send(SessionEvent::TurnFailed {
                message: message.clone(),
            });
        }

        // Finalizing runs regardless of how the turn went: list metadata
        // (title, recency) comes from the server.
        self.store.lock().phase = TurnPhase::Finalizing;
        if let Err(e) = self.refresh_catalog().await {
            tracing::warn!("catalog refresh after turn failed: {}", e);
        }
        self.store.lock().phase = TurnPhase::Idle;

        match outcome {
            TurnOutcome::Completed {
                user_message_id,
                assistant_message_id,
            } => {
                let _ = self.event_tx.send(SessionEvent::TurnEnd {
                    user_message_id,
                    assistant_message_id,
                });
                Ok(())
            }
            TurnOutcome::Cancelled => Ok(()),
            TurnOutcome::Failed(message) => Err(Error::Turn(message)),
        }
    }

    /// Streaming: apply events in order until a terminal event,
    /// end-of-stream, cancellation, or a stalled read.
    async fn drive_turn(
        &self,
        wire_id: Option<&str>,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return TurnOutcome::Cancelled,
            opened = self.open_with_retry(wire_id, prompt) => match opened {
                Ok(stream) => stream,
                Err(e) => return TurnOutcome::Failed(e.to_string()),
            },
        };

        self.store.lock().phase = TurnPhase::Streaming;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return TurnOutcome::Cancelled,
                read = tokio::time::timeout(self.config.idle_timeout, stream.next()) => match read {
                    Ok(next) => next,
                    Err(_) => {
                        return TurnOutcome::Failed(format!(
                            "stream stalled for {:?}",
                            self.config.idle_timeout
                        ));
                    }
                },
            };
            let Some(event) = next else {
                // End of stream without a done event; the turn still
                // finalizes, the ids just never arrived.
                return TurnOutcome::Completed {
                    user_message_id: None,
                    assistant_message_id: None,
                };
            };
            match event {
                StreamEvent::Meta { conversation_id } => {
                    let promoted = self.store.lock().promote(&conversation_id);
                    if promoted {
                        let _ = self.event_tx.send(SessionEvent::Promoted { conversation_id });
                    }
                }
                StreamEvent::Content { chunk } => {
                    let applied = {
                        let mut store = self.store.lock();
                        store.active.as_mut().is_some_and(|c| c.append_chunk(&chunk))
                    };
                    if applied {
                        let _ = self.event_tx.send(SessionEvent::Chunk { delta: chunk });
                    }
                }
                StreamEvent::Done {
                    user_message_id,
                    assistant_message_id,
                } => {
                    if let (Some(user_id), Some(assistant_id)) =
                        (user_message_id.as_deref(), assistant_message_id.as_deref())
                    {
                        let mut store = self.store.lock();
                        if let Some(active) = store.active.as_mut() {
                            active.attach_turn_ids(user_id, assistant_id);
                        }
                    }
                    return TurnOutcome::Completed {
                        user_message_id,
                        assistant_message_id,
                    };
                }
                StreamEvent::Error { error } => return TurnOutcome::Failed(error),
                StreamEvent::Unknown => {}
            }
        }
    }

    /// Open the stream, retrying transient failures with exponential
    /// backoff. Nothing has been mutated by a failed open, so retrying is
    /// safe; the provisional invariant guarantees a repeated no-id request
    /// still addresses the same pending conversation.
    async fn open_with_retry(
        &self,
        wire_id: Option<&str>,
        prompt: &str,
    ) -> parley_wire::Result<EventStream> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.backend.open_stream(wire_id, prompt).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < retry.max_retries && e.is_retryable() => {
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "opening stream failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        retry.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PROVISIONAL_ID;
    use crate::transport::Backend;
    use async_trait::async_trait;
    use chrono::Utc;
    use parley_wire::{ConversationDetail, ConversationSummary};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum Script {
        Events(Vec<StreamEvent>),
        /// Yield the events, then stall until the read loop gives up.
        EventsThenHang(Vec<StreamEvent>),
    }

    #[derive(Default)]
    struct MockBackend {
        /// One script per successful open, consumed in order.
        scripts: parking_lot::Mutex<Vec<Script>>,
        /// Number of opens to fail with a retryable status first.
        fail_opens: AtomicU32,
        opens: AtomicU32,
        /// Conversation ids observed on the wire.
        wire_ids: parking_lot::Mutex<Vec<Option<String>>>,
        /// What list_conversations returns.
        summaries: parking_lot::Mutex<Vec<ConversationSummary>>,
    }

    impl MockBackend {
        fn scripted(events: Vec<StreamEvent>) -> Self {
            let mock = Self::default();
            mock.scripts.lock().push(Script::Events(events));
            mock
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn open_stream(
            &self,
            conversation_id: Option<&str>,
            _message: &str,
        ) -> parley_wire::Result<EventStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.wire_ids
                .lock()
                .push(conversation_id.map(str::to_string));

            let remaining = self.fail_opens.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_opens.store(remaining - 1, Ordering::SeqCst);
                return Err(parley_wire::Error::Status {
                    status: 503,
                    message: "overloaded".into(),
                });
            }

            let script = {
                let mut scripts = self.scripts.lock();
                if scripts.is_empty() {
                    Script::Events(vec![])
                } else {
                    scripts.remove(0)
                }
            };
            let stream: EventStream = match script {
                Script::Events(events) => Box::pin(futures::stream::iter(events)),
                Script::EventsThenHang(events) => Box::pin(async_stream::stream! {
                    for event in events {
                        yield event;
                    }
                    futures::future::pending::<()>().await;
                }),
            };
            Ok(stream)
        }

        async fn list_conversations(&self) -> parley_wire::Result<Vec<ConversationSummary>> {
            Ok(self.summaries.lock().clone())
        }

        async fn fetch_conversation(&self, id: &str) -> parley_wire::Result<ConversationDetail> {
            Ok(ConversationDetail {
                id: id.to_string(),
                title: "fetched".into(),
                last_updated: Utc::now(),
                pinned: false,
                messages: vec![],
            })
        }

        async fn delete_conversation(&self, _id: &str) -> parley_wire::Result<()> {
            Ok(())
        }

        async fn set_pinned(&self, _id: &str, _pinned: bool) -> parley_wire::Result<()> {
            Ok(())
        }

        async fn set_favorite(
            &self,
            _conversation_id: &str,
            _message_id: &str,
            _favorite: bool,
        ) -> parley_wire::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig {
            retry: RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            idle_timeout: Duration::from_secs(5),
        }
    }

    fn full_turn_script() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Meta {
                conversation_id: "C7".into(),
            },
            StreamEvent::Content { chunk: "He".into() },
            StreamEvent::Unknown,
            StreamEvent::Content {
                chunk: "llo".into(),
            },
            StreamEvent::Content { chunk: "!".into() },
            StreamEvent::Done {
                user_message_id: Some("u9".into()),
                assistant_message_id: Some("a9".into()),
            },
        ]
    }

    fn server_summary(id: &str, title: &str) -> ConversationSummary {
        ConversationSummary {
            id: id.into(),
            title: title.into(),
            last_updated: Utc::now(),
            pinned: false,
            preview: None,
        }
    }

    #[tokio::test]
    async fn test_submit_full_turn() {
        let backend = Arc::new(MockBackend::scripted(full_turn_script()));
        backend
            .summaries
            .lock()
            .push(server_summary("C7", "Hello thread"));
        let client = ChatClient::with_config(backend.clone(), fast_config());
        client.new_conversation();

        client.submit("hello").await.unwrap();

        client.with_store(|store| {
            let active = store.active.as_ref().expect("active conversation");
            assert_eq!(active.id, "C7");
            assert_eq!(active.messages.len(), 2);
            assert_eq!(active.messages[0].content, "hello");
            assert_eq!(active.messages[0].id.as_deref(), Some("u9"));
            assert_eq!(active.messages[1].content, "Hello!");
            assert_eq!(active.messages[1].id.as_deref(), Some("a9"));
            assert!(store.catalog.iter().all(|c| c.id != PROVISIONAL_ID));
            assert!(store.catalog.iter().any(|c| c.title == "Hello thread"));
            assert_eq!(store.phase, TurnPhase::Idle);
            assert!(store.last_error.is_none());
        });

        // A provisional conversation goes out with no id on the wire.
        assert_eq!(backend.wire_ids.lock().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_second_turn_carries_promoted_id() {
        let backend = Arc::new(MockBackend::scripted(full_turn_script()));
        backend.scripts.lock().push(Script::Events(vec![
            StreamEvent::Content { chunk: "ok".into() },
            StreamEvent::Done {
                user_message_id: None,
                assistant_message_id: None,
            },
        ]));
        let client = ChatClient::with_config(backend.clone(), fast_config());
        client.new_conversation();

        client.submit("hello").await.unwrap();
        client.submit("again").await.unwrap();

        assert_eq!(
            backend.wire_ids.lock().as_slice(),
            &[None, Some("C7".to_string())]
        );
    }

    #[tokio::test]
    async fn test_second_meta_is_noop() {
        let backend = Arc::new(MockBackend::scripted(vec![
            StreamEvent::Meta {
                conversation_id: "C1".into(),
            },
            StreamEvent::Meta {
                conversation_id: "C2".into(),
            },
            StreamEvent::Done {
                user_message_id: None,
                assistant_message_id: None,
            },
        ]));
        let client = ChatClient::with_config(backend, fast_config());
        client.new_conversation();

        client.submit("hi").await.unwrap();

        client.with_store(|store| {
            assert_eq!(store.active.as_ref().map(|c| c.id.as_str()), Some("C1"));
        });
    }

    #[tokio::test]
    async fn test_error_event_fails_turn_keeps_partial() {
        let backend = Arc::new(MockBackend::scripted(vec![
            StreamEvent::Meta {
                conversation_id: "C1".into(),
            },
            StreamEvent::Content {
                chunk: "par".into(),
            },
            StreamEvent::Error {
                error: "model unavailable".into(),
            },
        ]));
        let client = ChatClient::with_config(backend, fast_config());
        client.new_conversation();

        let err = client.submit("hi").await.unwrap_err();
        assert!(matches!(err, Error::Turn(ref m) if m.contains("model unavailable")));

        client.with_store(|store| {
            let active = store.active.as_ref().expect("active conversation");
            assert_eq!(active.messages[1].content, "par");
            assert_eq!(active.messages[1].id, None);
            assert_eq!(store.phase, TurnPhase::Idle);
            assert_eq!(store.last_error.as_deref(), Some("model unavailable"));
        });
    }

    #[tokio::test]
    async fn test_end_of_stream_without_done_still_finalizes() {
        let backend = Arc::new(MockBackend::scripted(vec![
            StreamEvent::Meta {
                conversation_id: "C1".into(),
            },
            StreamEvent::Content { chunk: "Hi".into() },
        ]));
        let client = ChatClient::with_config(backend, fast_config());
        client.new_conversation();

        client.submit("hello").await.unwrap();

        client.with_store(|store| {
            let active = store.active.as_ref().expect("active conversation");
            assert_eq!(active.messages[1].content, "Hi");
            assert_eq!(active.messages[1].id, None);
            assert_eq!(store.phase, TurnPhase::Idle);
        });
    }

    #[tokio::test]
    async fn test_open_retries_then_succeeds() {
        let backend = Arc::new(MockBackend::scripted(full_turn_script()));
        backend.fail_opens.store(1, Ordering::SeqCst);
        let client = ChatClient::with_config(backend.clone(), fast_config());
        client.new_conversation();

        client.submit("hello").await.unwrap();

        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
        client.with_store(|store| {
            assert_eq!(store.active.as_ref().map(|c| c.id.as_str()), Some("C7"));
        });
    }

    #[tokio::test]
    async fn test_open_failure_exhausts_retries() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_opens.store(10, Ordering::SeqCst);
        let client = ChatClient::with_config(backend.clone(), fast_config());
        client.new_conversation();

        let err = client.submit("hello").await.unwrap_err();
        assert!(matches!(err, Error::Turn(_)));
        // initial attempt + max_retries
        assert_eq!(backend.opens.load(Ordering::SeqCst), 3);
        client.with_store(|store| {
            assert_eq!(store.phase, TurnPhase::Idle);
            assert!(store.last_error.is_some());
        });
    }

    #[tokio::test]
    async fn test_submit_while_streaming_is_refused() {
        let backend = Arc::new(MockBackend::default());
        let client = ChatClient::with_config(backend, fast_config());
        client.new_conversation();
        client.store.lock().phase = TurnPhase::Streaming;

        let err = client.submit("hello").await.unwrap_err();
        assert!(matches!(err, Error::Busy));
    }

    #[tokio::test]
    async fn test_abort_stops_reading_keeps_partial() {
        let backend = Arc::new(MockBackend::default());
        backend.scripts.lock().push(Script::EventsThenHang(vec![
            StreamEvent::Meta {
                conversation_id: "C1".into(),
            },
            StreamEvent::Content {
                chunk: "par".into(),
            },
        ]));
        let client = Arc::new(ChatClient::with_config(backend, fast_config()));
        client.new_conversation();

        let mut events = client.subscribe();
        let submitting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.submit("hello").await })
        };

        // Wait for the chunk to land, then abandon the turn.
        loop {
            match events.recv().await {
                Ok(SessionEvent::Chunk { .. }) => break,
                Ok(_) => continue,
                Err(e) => panic!("event feed closed early: {}", e),
            }
        }
        client.abort();

        let result = submitting.await.expect("submit task");
        assert!(result.is_ok(), "cancellation must not be an error");

        client.with_store(|store| {
            let active = store.active.as_ref().expect("active conversation");
            assert_eq!(active.messages[1].content, "par");
            assert_eq!(store.phase, TurnPhase::Idle);
            assert!(store.last_error.is_none());
        });
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let backend = Arc::new(MockBackend::default());
        backend
            .scripts
            .lock()
            .push(Script::EventsThenHang(vec![StreamEvent::Content {
                chunk: "He".into(),
            }]));
        let mut config = fast_config();
        config.idle_timeout = Duration::from_millis(50);
        let client = ChatClient::with_config(backend, config);
        client.new_conversation();

        let err = client.submit("hello").await.unwrap_err();
        assert!(matches!(err, Error::Turn(ref m) if m.contains("stalled")));

        client.with_store(|store| {
            let active = store.active.as_ref().expect("active conversation");
            assert_eq!(active.messages[1].content, "He");
            assert_eq!(store.phase, TurnPhase::Idle);
        });
    }
}
