//! Session data models.

use parley_protocol::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Name given to sessions until the first user message or an explicit rename.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Number of characters of the first user message kept in a derived name.
pub const SESSION_NAME_MAX_CHARS: usize = 30;

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ordered turns.
    pub messages: Vec<ChatMessage>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds, refreshed on every mutation.
    pub updated_at: i64,
}

impl ChatSession {
    /// Whether the name is still the placeholder.
    pub fn has_default_name(&self) -> bool {
        self.name == DEFAULT_SESSION_NAME
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Push a message, deriving the name from the first user message.
    pub(crate) fn push_message(&mut self, message: ChatMessage, now: i64) {
        if self.has_default_name() && message.role == Role::User {
            self.name = derive_session_name(&message.content);
        }
        self.messages.push(message);
        self.updated_at = now;
    }
}

/// Fields supplied when creating a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Default for NewSession {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.to_string(),
            messages: Vec::new(),
        }
    }
}

/// Partial update applied by `SessionStore::update_session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
}

impl SessionPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            messages: None,
        }
    }
}

/// Change notification published after every session store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { session_id: String },
    Updated { session_id: String },
    Deleted { session_id: String },
    MessageAppended { session_id: String, index: usize },
    FragmentAppended { session_id: String, fragment: String },
    LastMessageReplaced { session_id: String },
    MessagesCleared { session_id: String },
    CurrentChanged { session_id: Option<String> },
}

impl SessionEvent {
    /// Session the event refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Created { session_id }
            | Self::Updated { session_id }
            | Self::Deleted { session_id }
            | Self::MessageAppended { session_id, .. }
            | Self::FragmentAppended { session_id, .. }
            | Self::LastMessageReplaced { session_id }
            | Self::MessagesCleared { session_id } => Some(session_id),
            Self::CurrentChanged { session_id } => session_id.as_deref(),
        }
    }
}

/// Derive a display name from message content: the first 30 characters, with
/// "..." appended when anything was cut.
pub fn derive_session_name(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SESSION_NAME_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name_truncates() {
        assert_eq!(
            derive_session_name("Explain quicksort in detail please"),
            "Explain quicksort in detail pl..."
        );
    }

    #[test]
    fn test_derive_name_short_content_kept() {
        assert_eq!(derive_session_name("Hi there"), "Hi there");

        let exact = "a".repeat(SESSION_NAME_MAX_CHARS);
        assert_eq!(derive_session_name(&exact), exact);
    }

    #[test]
    fn test_derive_name_counts_characters_not_bytes() {
        let content = "ü".repeat(31);
        let name = derive_session_name(&content);
        assert_eq!(name, format!("{}...", "ü".repeat(30)));
    }

    #[test]
    fn test_push_message_renames_once() {
        let mut session = ChatSession {
            id: "s1".to_string(),
            name: DEFAULT_SESSION_NAME.to_string(),
            messages: vec![],
            created_at: 0,
            updated_at: 0,
        };

        session.push_message(ChatMessage::assistant("hello"), 1);
        assert!(session.has_default_name());

        session.push_message(ChatMessage::user("first question"), 2);
        assert_eq!(session.name, "first question");

        session.push_message(ChatMessage::user("second question"), 3);
        assert_eq!(session.name, "first question");
        assert_eq!(session.updated_at, 3);
        assert_eq!(session.messages.len(), 3);
    }
}
