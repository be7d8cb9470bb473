//! Persisted session store.

use std::sync::Arc;

use log::{debug, warn};
use parley_protocol::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use super::models::{ChatSession, NewSession, SessionEvent, SessionPatch};
use crate::storage::Storage;
use crate::store::{
    EVENT_BUFFER_SIZE, StoreError, StoreResult, load_record, new_id, now_millis, save_record,
};

/// Storage key of the session collection record.
pub const SESSIONS_STORAGE_KEY: &str = "chat-sessions-storage";

/// Persisted shape of the session collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionsState {
    sessions: Vec<ChatSession>,
    current_session_id: Option<String>,
}

impl SessionsState {
    fn find_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

/// Ordered collection of chat sessions plus the current-session pointer.
///
/// All mutations run under one async mutex, persist the full collection, and then
/// publish a [`SessionEvent`]. Operations addressing an unknown session are
/// no-ops that return `false`.
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    state: Mutex<SessionsState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Open the store, loading any previously persisted sessions.
    pub async fn open(storage: Arc<dyn Storage>) -> StoreResult<Self> {
        let state: SessionsState = load_record(&storage, SESSIONS_STORAGE_KEY).await?;
        debug!("Loaded {} session(s)", state.sessions.len());
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Ok(Self {
            storage,
            state: Mutex::new(state),
            events,
        })
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn list_sessions(&self) -> Vec<ChatSession> {
        self.state.lock().await.sessions.clone()
    }

    pub async fn get_session(&self, id: &str) -> Option<ChatSession> {
        self.state
            .lock()
            .await
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.state.lock().await.current_session_id.clone()
    }

    pub async fn current_session(&self) -> Option<ChatSession> {
        let state = self.state.lock().await;
        let id = state.current_session_id.as_deref()?;
        state.sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Insert a session and make it current.
    pub async fn add_session(&self, new: NewSession) -> StoreResult<ChatSession> {
        let now = now_millis();
        let session = ChatSession {
            id: new_id(),
            name: new.name,
            messages: new.messages,
            created_at: now,
            updated_at: now,
        };

        let created = session.clone();
        self.mutate(move |state| {
            let session_id = session.id.clone();
            state.sessions.push(session);
            state.current_session_id = Some(session_id.clone());
            (
                (),
                vec![
                    SessionEvent::Created {
                        session_id: session_id.clone(),
                    },
                    SessionEvent::CurrentChanged {
                        session_id: Some(session_id),
                    },
                ],
            )
        })
        .await?;

        debug!("Created session {}", created.id);
        Ok(created)
    }

    /// Create an empty "New Chat" session and make it current.
    pub async fn create_session(&self) -> StoreResult<ChatSession> {
        self.add_session(NewSession::default()).await
    }

    /// Return the current session, creating one when the collection is empty.
    ///
    /// Falls back to the first session when the pointer is unset or stale.
    pub async fn ensure_session(&self) -> StoreResult<ChatSession> {
        if let Some(session) = self.current_session().await {
            return Ok(session);
        }

        let first = self.state.lock().await.sessions.first().cloned();
        match first {
            Some(session) => {
                self.set_current_session(Some(&session.id)).await?;
                Ok(session)
            }
            None => self.create_session().await,
        }
    }

    /// Apply a partial update.
    pub async fn update_session(&self, id: &str, patch: SessionPatch) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| match state.find_mut(id) {
            Some(session) => {
                if let Some(name) = patch.name {
                    session.name = name;
                }
                if let Some(messages) = patch.messages {
                    session.messages = messages;
                }
                session.updated_at = now;
                (
                    true,
                    vec![SessionEvent::Updated {
                        session_id: id.to_string(),
                    }],
                )
            }
            None => (false, vec![]),
        })
        .await
    }

    /// Delete a session, clearing the current pointer if it referenced it.
    pub async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        self.mutate(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|s| s.id != id);
            if state.sessions.len() == before {
                return (false, vec![]);
            }

            let mut events = vec![SessionEvent::Deleted {
                session_id: id.to_string(),
            }];
            if state.current_session_id.as_deref() == Some(id) {
                state.current_session_id = None;
                events.push(SessionEvent::CurrentChanged { session_id: None });
            }
            (true, events)
        })
        .await
    }

    /// Select the current session. `None` clears the selection.
    pub async fn set_current_session(&self, id: Option<&str>) -> StoreResult<()> {
        self.mutate(|state| {
            if let Some(unknown) = id.filter(|id| !state.sessions.iter().any(|s| s.id == *id)) {
                return (Err(StoreError::session_not_found(unknown)), vec![]);
            }
            let next = id.map(str::to_string);
            if state.current_session_id == next {
                return (Ok(()), vec![]);
            }
            state.current_session_id = next.clone();
            (Ok(()), vec![SessionEvent::CurrentChanged { session_id: next }])
        })
        .await?
    }

    /// Append a message; the first user message names a "New Chat" session.
    pub async fn append_message(&self, id: &str, message: ChatMessage) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| match state.find_mut(id) {
            Some(session) => {
                let renamed = session.has_default_name();
                session.push_message(message, now);
                let mut events = vec![SessionEvent::MessageAppended {
                    session_id: id.to_string(),
                    index: session.messages.len() - 1,
                }];
                if renamed && !session.has_default_name() {
                    events.push(SessionEvent::Updated {
                        session_id: id.to_string(),
                    });
                }
                (true, events)
            }
            None => (false, vec![]),
        })
        .await
    }

    /// Concatenate a fragment onto the last message. No-op on an empty session.
    pub async fn append_to_last_message(&self, id: &str, fragment: &str) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| {
            let Some(session) = state.find_mut(id) else {
                return (false, vec![]);
            };
            let Some(last) = session.messages.last_mut() else {
                return (false, vec![]);
            };
            last.content.push_str(fragment);
            session.updated_at = now;
            (
                true,
                vec![SessionEvent::FragmentAppended {
                    session_id: id.to_string(),
                    fragment: fragment.to_string(),
                }],
            )
        })
        .await
    }

    /// Overwrite the last message's content. No-op on an empty session.
    pub async fn replace_last_message_content(&self, id: &str, content: &str) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| {
            let Some(session) = state.find_mut(id) else {
                return (false, vec![]);
            };
            let Some(last) = session.messages.last_mut() else {
                return (false, vec![]);
            };
            last.content = content.to_string();
            session.updated_at = now;
            (
                true,
                vec![SessionEvent::LastMessageReplaced {
                    session_id: id.to_string(),
                }],
            )
        })
        .await
    }

    /// Remove every message from a session.
    pub async fn clear_session_messages(&self, id: &str) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| match state.find_mut(id) {
            Some(session) => {
                session.messages.clear();
                session.updated_at = now;
                (
                    true,
                    vec![SessionEvent::MessagesCleared {
                        session_id: id.to_string(),
                    }],
                )
            }
            None => (false, vec![]),
        })
        .await
    }

    /// Run a mutation, persist if it produced events, then notify.
    ///
    /// A failed write restores the previous in-memory state.
    async fn mutate<R>(
        &self,
        apply: impl FnOnce(&mut SessionsState) -> (R, Vec<SessionEvent>),
    ) -> StoreResult<R> {
        let mut state = self.state.lock().await;
        let snapshot = state.clone();
        let (result, events) = apply(&mut state);

        if events.is_empty() {
            return Ok(result);
        }

        if let Err(e) = save_record(&self.storage, SESSIONS_STORAGE_KEY, &*state).await {
            warn!("Failed to persist sessions, rolling back: {}", e);
            *state = snapshot;
            return Err(e);
        }

        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        Ok(result)
    }
}
