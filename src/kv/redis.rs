//! Redis-backed [`KvStore`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{KvError, KvStore};

/// Thin wrapper over a multiplexed connection manager. Cloning is cheap and
/// every operation works on its own clone, so `&self` methods are fine.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis. `address` is `host:port`; the password may be empty
    /// for unauthenticated instances.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(address: &str, password: &SecretString) -> Result<Self, KvError> {
        let url = if password.expose_secret().is_empty() {
            format!("redis://{address}")
        } else {
            format!("redis://:{}@{address}", password.expose_secret())
        };
        let client = redis::Client::open(url).map_err(|err| KvError::Store(err.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|err| KvError::Store(err.to_string()))?;
        debug!("Connected to redis at {address}");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|err| KvError::Store(err.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex(key, value, seconds)
            .await
            .map_err(|err| KvError::Store(err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|err| KvError::Store(err.to_string()))?;
        Ok(removed != 0)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|err| KvError::Store(err.to_string()))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| KvError::Store(err.to_string()))
    }
}
