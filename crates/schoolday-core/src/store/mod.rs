//! Durable string-keyed storage.
//!
//! Values are opaque strings; JSON encoding of structured values is done by
//! the callers (cache, settings, timetable reconciler).
//!
//! - `MemoryStore`: process-local map, used by tests and ephemeral sessions
//! - `FileStore`: a single JSON file in the data directory

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a key that does not exist is not an error.
    async fn remove_key(&self, key: &str) -> Result<(), StoreError>;

    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn remove_keys(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.remove_key(key).await?;
        }
        Ok(())
    }
}
