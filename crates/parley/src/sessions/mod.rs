//! Chat session collection.
//!
//! Sessions are persisted as one record and mutated through [`SessionStore`].

mod models;
mod store;

pub use models::{
    ChatSession, DEFAULT_SESSION_NAME, NewSession, SESSION_NAME_MAX_CHARS, SessionEvent,
    SessionPatch, derive_session_name,
};
pub use store::{SESSIONS_STORAGE_KEY, SessionStore};
