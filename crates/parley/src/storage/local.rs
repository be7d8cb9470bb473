//! Local filesystem storage implementation.

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use tokio::fs;

use super::{Storage, StorageError, StorageResult};

const RECORD_EXTENSION: &str = "json";

/// Local filesystem storage: one file per key under a base directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage instance.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get the full path for a record key.
    fn full_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self
            .base_path
            .join(format!("{}.{}", key, RECORD_EXTENSION)))
    }

    /// Ensure the base directory exists.
    async fn ensure_base_dir(&self) -> StorageResult<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(key)?;
        fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.ensure_base_dir().await?;
        let full_path = self.full_path(key)?;

        // Write to a sibling temp file and rename so a crash never leaves a torn record.
        let tmp_path = full_path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &full_path).await?;

        debug!("Wrote {} bytes to {}", data.len(), full_path.display());
        Ok(())
    }
}
