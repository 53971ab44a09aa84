//! Error types for parley-wire

use thiserror::Error;

/// Result type alias using parley-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat service.
///
/// Failures inside an already-open stream are not errors at this level:
/// the stream itself ends with a terminal error event instead.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status before any frame
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },
}

impl Error {
    /// Check if retrying the request could plausibly succeed.
    ///
    /// Only failures that happen before any frame has been read are safe
    /// to retry; callers enforce that.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Status { status, .. } => matches!(status, 408 | 429) || *status >= 500,
        }
    }
}
