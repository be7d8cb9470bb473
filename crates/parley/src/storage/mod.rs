//! Storage abstraction layer.
//!
//! Provides a trait-based keyed record store with implementations for:
//! - Local filesystem storage (durable client state)
//! - In-memory storage (tests)

mod error;
mod local;
mod memory;
mod traits;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use traits::Storage;

/// Create storage based on configuration.
pub fn create_storage(config: StorageConfig) -> Arc<dyn Storage> {
    match config {
        StorageConfig::Local(path) => Arc::new(LocalStorage::new(path)),
        StorageConfig::Memory => Arc::new(MemoryStorage::new()),
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default)]
pub enum StorageConfig {
    /// Local filesystem storage rooted at a directory.
    Local(PathBuf),
    /// Volatile in-memory storage.
    #[default]
    Memory,
}
