//! Client side of the relay protocol.
//!
//! [`ChatClient`] owns the send path: it mutates the [`SessionStore`](crate::sessions::SessionStore)
//! while a reply streams in, so any store subscriber sees the message grow.

mod chat;
mod decoder;
mod error;
mod lines;
mod relay_client;

pub use chat::{APOLOGY_MESSAGE, ChatClient, StreamOutcome};
pub use decoder::Utf8Decoder;
pub use error::{ClientError, ClientResult};
pub use lines::LineBuffer;
pub use relay_client::{DEFAULT_SERVER_URL, RelayClient, RelayStatus};
