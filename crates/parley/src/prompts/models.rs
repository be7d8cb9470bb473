//! Prompt template models.

use serde::{Deserialize, Serialize};

/// A reusable prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub title: String,
    /// Body copied verbatim into a pending message.
    pub content: String,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Fields supplied when creating a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrompt {
    pub title: String,
    pub content: String,
}

impl NewPrompt {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Partial update applied by `PromptStore::update_prompt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PromptPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Change notification published after every prompt store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    Created { prompt_id: String },
    Updated { prompt_id: String },
    Deleted { prompt_id: String },
}
