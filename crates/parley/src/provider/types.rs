//! Upstream chat-completions wire shapes.

use parley_protocol::Role;
use serde::{Deserialize, Serialize};

/// Sentinel data line that ends an upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One turn forwarded upstream. File payloads are already inlined into `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionTurn {
    pub role: Role,
    pub content: String,
}

impl CompletionTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [CompletionTurn],
    pub temperature: f64,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// In-band failure reported mid-stream, e.g. `{"error":{"message":"..."}}`.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// Message of an in-band error frame, if this chunk is one.
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        match error.get("message").and_then(|m| m.as_str()) {
            Some(message) => Some(message.to_string()),
            None => Some(error.to_string()),
        }
    }

    /// Text carried by the first choice, if any.
    pub fn into_fragment(self) -> Option<String> {
        self.choices.into_iter().next()?.delta.content
    }
}
