//! TTL-bound key-value store used for sessions, one-shot tickets, and
//! read-through caches.
//!
//! Everything above this layer talks to the [`KvStore`] trait so unit tests
//! can run against [`memory::MemoryKv`] while production uses
//! [`redis::RedisKv`].

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod redis;

pub use memory::MemoryKv;
pub use redis::RedisKv;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key-value store error: {0}")]
    Store(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value. `Ok(None)` means absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store a value with a bounded lifetime. Unbounded keys are not
    /// supported; every entry must eventually expire.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Delete a key, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// List every live key starting with `prefix`. O(total keys); callers
    /// rely on TTL eviction keeping the namespace small.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    /// Liveness probe for health reporting.
    async fn ping(&self) -> Result<(), KvError>;
}
