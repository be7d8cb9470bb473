//! Reusable prompt templates.

mod models;
mod store;

pub use models::{NewPrompt, Prompt, PromptEvent, PromptPatch};
pub use store::{PROMPTS_STORAGE_KEY, PromptStore};
