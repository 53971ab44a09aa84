//! Error types for parley-client

use thiserror::Error;

/// Result type alias using parley-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Backend(#[from] parley_wire::Error),

    /// A turn is already in flight for this session
    #[error("a turn is already in progress")]
    Busy,

    /// The operation needs identities the server has not issued yet
    #[error("message is not persisted yet")]
    NotPersisted,

    /// No conversation is active
    #[error("no active conversation")]
    NoConversation,

    /// The turn ended before completing; partial content is retained
    #[error("turn failed: {0}")]
    Turn(String),
}
