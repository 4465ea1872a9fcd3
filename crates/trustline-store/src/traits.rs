use async_trait::async_trait;

use crate::error::StoreError;

/// Key-value persistence contract.
///
/// Backends are provided by the host application (redis, sqlite, files);
/// the engine only ships [`crate::memory::MemoryStore`]. Values are opaque
/// strings, usually JSON. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value at `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` at `key`, overwriting any previous value.
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
