//! In-memory [`KvStore`] with real TTL semantics, used by unit and
//! integration tests in place of Redis.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{KvError, KvStore};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Store("poisoned lock".to_string()))?;
        match entries.get(key) {
            Some(entry) if Self::live(entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Lazy eviction, mirroring what the real store does for us.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Store("poisoned lock".to_string()))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Store("poisoned lock".to_string()))?;
        let existed = entries
            .remove(key)
            .is_some_and(|entry| Self::live(&entry));
        Ok(existed)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Store("poisoned lock".to_string()))?;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && Self::live(entry))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}
