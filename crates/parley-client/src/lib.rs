//! parley-client: client-side state core for the parley chat service
//!
//! Owns the conversation catalog and the active conversation, drives the
//! submit-and-stream turn lifecycle, and applies optimistic out-of-band
//! mutations, reconciling everything against what the server confirms.

pub mod client;
pub mod error;
pub mod events;
pub mod model;
pub mod mutation;
pub mod session;
pub mod store;
pub mod transport;

pub use client::ChatClient;
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use model::{ChatMessage, Conversation, DEFAULT_TITLE, PROVISIONAL_ID, Role};
pub use session::{ClientConfig, RetryConfig};
pub use store::{SessionStore, TurnPhase};
pub use transport::Backend;
