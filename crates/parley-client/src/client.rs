//! The chat client facade: session state, catalog maintenance, and
//! out-of-band mutations. The streaming turn lifecycle lives in
//! [`crate::session`].

use crate::{
    error::{Error, Result},
    events::SessionEvent,
    model::{Conversation, PROVISIONAL_ID},
    mutation,
    session::ClientConfig,
    store::{SessionStore, TurnPhase},
    transport::Backend,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Client-side core for one chat session.
///
/// All state lives behind the session store; methods take `&self` so
/// catalog maintenance and favorite toggles may run while a turn streams.
pub struct ChatClient {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) store: Arc<Mutex<SessionStore>>,
    pub(crate) event_tx: broadcast::Sender<SessionEvent>,
    pub(crate) cancel: Mutex<CancellationToken>,
    pub(crate) config: ClientConfig,
}

impl ChatClient {
    /// Create a client over the given backend with default tuning.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_config(backend, ClientConfig::default())
    }

    /// Create a client with explicit tuning.
    pub fn with_config(backend: Arc<dyn Backend>, config: ClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            backend,
            store: Arc::new(Mutex::new(SessionStore::default())),
            event_tx,
            cancel: Mutex::new(CancellationToken::new()),
            config,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Run `f` against the current session state.
    pub fn with_store<R>(&self, f: impl FnOnce(&SessionStore) -> R) -> R {
        f(&self.store.lock())
    }

    /// Abandon the in-flight turn, if any.
    ///
    /// The read loop stops without error; content already streamed stays
    /// in place. Call this before navigating away mid-stream.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a turn is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.store.lock().phase != TurnPhase::Idle
    }

    /// Fetch the catalog and merge it into the store.
    pub async fn refresh_catalog(&self) -> Result<()> {
        let summaries = self.backend.list_conversations().await?;
        self.store.lock().merge_summaries(summaries);
        let _ = self.event_tx.send(SessionEvent::CatalogChanged);
        Ok(())
    }

    /// Start a new provisional conversation.
    ///
    /// An empty conversation being abandoned is cleaned up on the way out,
    /// and an existing provisional entry is reused rather than letting a
    /// second one into the catalog.
    pub fn new_conversation(&self) {
        {
            let mut store = self.store.lock();
            self.cleanup_abandoned(&mut store);
            store.open_provisional();
        }
        let _ = self.event_tx.send(SessionEvent::CatalogChanged);
    }

    /// Load a conversation and make it active, cleaning up an abandoned
    /// empty conversation on the way out.
    pub async fn select_conversation(&self, id: &str) -> Result<()> {
        {
            let mut store = self.store.lock();
            if store.active.as_ref().is_some_and(|c| c.id != id) {
                self.cleanup_abandoned(&mut store);
            }
        }

        let detail = self.backend.fetch_conversation(id).await?;
        let conversation = Conversation::from(detail);

        let mut store = self.store.lock();
        if let Some(entry) = store.catalog.iter_mut().find(|c| c.id == conversation.id) {
            entry.title = conversation.title.clone();
            entry.last_updated = conversation.updated_at;
            entry.pinned = conversation.pinned;
        }
        store.active = Some(conversation);
        Ok(())
    }

    /// Delete a conversation outright.
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.backend.delete_conversation(id).await?;
        {
            let mut store = self.store.lock();
            store.catalog.retain(|c| c.id != id);
            if store.active.as_ref().is_some_and(|c| c.id == id) {
                store.active = None;
            }
        }
        let _ = self.event_tx.send(SessionEvent::CatalogChanged);
        Ok(())
    }

    /// Pin or unpin a conversation, then restore the catalog order.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        self.backend.set_pinned(id, pinned).await?;
        {
            let mut store = self.store.lock();
            if let Some(entry) = store.catalog.iter_mut().find(|c| c.id == id) {
                entry.pinned = pinned;
            }
            if let Some(active) = store.active.as_mut() {
                if active.id == id {
                    active.pinned = pinned;
                }
            }
            store.sort_catalog();
        }
        let _ = self.event_tx.send(SessionEvent::CatalogChanged);
        Ok(())
    }

    /// Toggle a message's favorite flag, optimistically.
    ///
    /// The flag flips locally before the server answers; a rejected
    /// confirmation restores the captured prior value. Requires a
    /// persisted conversation and a server-acknowledged message, otherwise
    /// the request is refused before anything is written. Returns the
    /// confirmed value.
    pub async fn toggle_favorite(&self, message_id: &str) -> Result<bool> {
        let (conversation_id, prior) = {
            let store = self.store.lock();
            let active = store.active.as_ref().ok_or(Error::NoConversation)?;
            if active.is_provisional() {
                return Err(Error::NotPersisted);
            }
            let message = active
                .messages
                .iter()
                .find(|m| m.id.as_deref() == Some(message_id))
                .ok_or(Error::NotPersisted)?;
            (active.id.clone(), message.favorite)
        };
        let next = !prior;

        let write = |store: &mut SessionStore, value: bool| {
            if let Some(active) = store.active.as_mut() {
                if let Some(message) = active
                    .messages
                    .iter_mut()
                    .find(|m| m.id.as_deref() == Some(message_id))
                {
                    message.favorite = value;
                }
            }
        };
        let confirm = self.backend.set_favorite(&conversation_id, message_id, next);

        match mutation::apply(&self.store, prior, next, write, confirm).await {
            Ok(()) => {
                let _ = self.event_tx.send(SessionEvent::FavoriteChanged {
                    message_id: message_id.to_string(),
                    favorite: next,
                    confirmed: true,
                });
                Ok(next)
            }
            Err(e) => {
                let _ = self.event_tx.send(SessionEvent::FavoriteChanged {
                    message_id: message_id.to_string(),
                    favorite: prior,
                    confirmed: false,
                });
                Err(Error::Backend(e))
            }
        }
    }

    /// Drop an abandoned empty conversation: a provisional one just leaves
    /// the catalog, a persisted one also gets a fire-and-forget delete.
    /// Failures of that delete are logged and never retried.
    fn cleanup_abandoned(&self, store: &mut SessionStore) {
        let Some(active) = store.active.as_ref() else {
            return;
        };
        if !active.is_empty() {
            return;
        }
        let id = active.id.clone();
        if id != PROVISIONAL_ID {
            let backend = Arc::clone(&self.backend);
            let doomed = id.clone();
            tokio::spawn(async move {
                if let Err(e) = backend.delete_conversation(&doomed).await {
                    tracing::warn!(
                        "best-effort delete of empty conversation {} failed: {}",
                        doomed,
                        e
                    );
                }
            });
        }
        store.catalog.retain(|c| c.id != id);
        store.active = None;
    }
}
