//! Shared plumbing for the persisted client stores.
//!
//! Each store keeps its whole collection in one JSON record under a fixed key and
//! rewrites that record after every mutation.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::storage::{Storage, StorageError};

/// Size of the broadcast channel used for store change notifications.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the session and prompt stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Persisted record could not be decoded or encoded.
    #[error("corrupt {key} record: {source}")]
    Codec {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Persistence backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Session",
            id: id.into(),
        }
    }

    pub fn prompt_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Prompt",
            id: id.into(),
        }
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// New random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Load a record, falling back to the default value when it was never written.
pub async fn load_record<T>(storage: &Arc<dyn Storage>, key: &'static str) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    match storage.read_optional(key).await? {
        Some(bytes) => {
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Codec { key, source })
        }
        None => Ok(T::default()),
    }
}

/// Replace a record with the serialized value.
pub async fn save_record<T>(storage: &Arc<dyn Storage>, key: &'static str, value: &T) -> StoreResult<()>
where
    T: Serialize,
{
    let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Codec { key, source })?;
    storage.write(key, &bytes).await?;
    Ok(())
}
