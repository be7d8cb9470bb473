//! Upstream completion providers.
//!
//! The relay only depends on [`CompletionProvider`]: hand it ordered turns, get
//! back a stream of text fragments. Any failure before the stream is returned is a
//! setup failure; an `Err` item afterwards is a mid-stream failure.

mod error;
mod openai;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use error::{ProviderError, ProviderResult};
pub use openai::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE, OpenAiProvider, ProviderConfig,
};
pub use types::{CompletionTurn, DONE_SENTINEL};

/// Stream of generated text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// A streaming chat-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Open a streamed completion for the given turns.
    async fn stream_completion(&self, turns: Vec<CompletionTurn>) -> ProviderResult<FragmentStream>;
}
