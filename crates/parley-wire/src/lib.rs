//! parley-wire: wire protocol layer for the parley chat client
//!
//! This crate decodes the chat service's framed event stream into typed
//! events and hosts the HTTP client for the streaming turn request and the
//! persistence endpoints.

pub mod api;
pub mod error;
pub mod event;
pub mod frame;

pub use api::{ApiClient, ConversationDetail, ConversationSummary, EventStream, MessageDetail};
pub use error::{Error, Result};
pub use event::{FRAME_TAG, StreamEvent, decode_event};
pub use frame::FrameDecoder;
