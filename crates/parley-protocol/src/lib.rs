//! Wire types for Parley relay communication.
//!
//! ```text
//! Client <--[POST /api/chat + SSE]--> Relay <--[streamed completion]--> Provider
//! ```
//!
//! The client sends the full ordered turn history in one request. The relay answers
//! with a `text/event-stream` body where every event carries one text fragment.
//! These types are the only contract between the two sides; provider-specific
//! shapes never leave the relay.

pub mod events;
pub mod messages;

pub use events::{ContentChunk, StreamFailure, StreamPayload, DATA_PREFIX, ERROR_EVENT};
pub use messages::{ChatMessage, ChatRequest, FileAttachment, Role};
