//! Storage trait definitions.

use async_trait::async_trait;

use super::{StorageError, StorageResult};

/// Keyed record storage.
///
/// Each key names one independent record. Stores write whole records; there is
/// no partial update.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a record's bytes.
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Read a record if present.
    async fn read_optional(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.read(key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace a record.
    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()>;
}
