//! Bearer-token sessions stored in the TTL key-value store.
//!
//! A session token is 16 random bytes rendered as 32 lowercase hex
//! characters. The token itself is the only handle; the store keeps a small
//! JSON document under `session:<token>` describing who it belongs to.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::kv::{KvError, KvStore};

const SESSION_PREFIX: &str = "session:";

/// Concurrent KV lookups when walking the session namespace.
const SCAN_FANOUT: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session for that token: expired, revoked, or never issued.
    #[error("unknown or expired session token")]
    Unknown,
    /// The stored value is not a session document.
    #[error("malformed session record")]
    Malformed,
    #[error(transparent)]
    Store(#[from] KvError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub ip: String,
}

pub struct SessionManager {
    kv: Arc<dyn KvStore>,
    default_ttl: Duration,
    remember_ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, default_ttl: Duration, remember_ttl: Duration) -> Self {
        Self {
            kv,
            default_ttl,
            remember_ttl,
        }
    }

    fn new_token() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Issue a fresh session for `user_id` observed from `ip`. `remember`
    /// selects the long-lived TTL.
    pub async fn issue(&self, user_id: &str, ip: &str, remember: bool) -> Result<String, SessionError> {
        let token = Self::new_token();
        let session = Session {
            user_id: user_id.to_string(),
            ip: ip.to_string(),
        };
        let value = serde_json::to_string(&session).map_err(|_| SessionError::Malformed)?;
        let ttl = if remember {
            self.remember_ttl
        } else {
            self.default_ttl
        };
        self.kv
            .set(&format!("{SESSION_PREFIX}{token}"), &value, ttl)
            .await?;
        Ok(token)
    }

    /// Resolve a bearer token to its session. Absence and corruption are
    /// distinct errors so the API layer can report them differently.
    pub async fn resolve(&self, token: &str) -> Result<Session, SessionError> {
        let value = self
            .kv
            .get(&format!("{SESSION_PREFIX}{token}"))
            .await?
            .ok_or(SessionError::Unknown)?;
        serde_json::from_str(&value).map_err(|_| SessionError::Malformed)
    }

    /// Revoke a single session. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> Result<bool, SessionError> {
        Ok(self.kv.delete(&format!("{SESSION_PREFIX}{token}")).await?)
    }

    /// The source IPs of every live session belonging to `user_id`.
    pub async fn ips_for_user(&self, user_id: &str) -> Result<Vec<String>, SessionError> {
        let keys = self.kv.scan(SESSION_PREFIX).await?;
        Ok(self
            .owned_sessions(keys, user_id)
            .await
            .into_iter()
            .map(|(_, session)| session.ip)
            .collect())
    }

    /// Delete every session belonging to `user_id`. Returns the number of
    /// session keys scanned across ALL users, not the number deleted. A
    /// single scan feeds both the count and the deletion set.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<usize, SessionError> {
        let keys = self.kv.scan(SESSION_PREFIX).await?;
        let scanned = keys.len();
        let sessions = self.owned_sessions(keys, user_id).await;
        stream::iter(sessions)
            .map(|(key, _)| {
                let kv = Arc::clone(&self.kv);
                async move {
                    if let Err(err) = kv.delete(&key).await {
                        warn!("Failed to delete session key: {err}");
                    }
                }
            })
            .buffer_unordered(SCAN_FANOUT)
            .collect::<Vec<_>>()
            .await;
        Ok(scanned)
    }

    /// Fetch the scanned keys and keep entries owned by `user_id`. Records
    /// that vanish or fail to parse mid-scan are skipped.
    async fn owned_sessions(&self, keys: Vec<String>, user_id: &str) -> Vec<(String, Session)> {
        let found: Vec<Option<(String, Session)>> = stream::iter(keys)
            .map(|key| {
                let kv = Arc::clone(&self.kv);
                async move {
                    match kv.get(&key).await {
                        Ok(Some(value)) => serde_json::from_str::<Session>(&value)
                            .ok()
                            .map(|session| (key, session)),
                        Ok(None) => None,
                        Err(err) => {
                            warn!("Failed to read session key: {err}");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(SCAN_FANOUT)
            .collect()
            .await;
        found
            .into_iter()
            .flatten()
            .filter(|(_, session)| session.user_id == user_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::kv::MemoryKv;

    fn manager(kv: Arc<dyn KvStore>) -> SessionManager {
        SessionManager::new(kv, Duration::from_secs(60), Duration::from_secs(600))
    }

    /// In-memory store that counts namespace scans.
    struct CountingKv {
        inner: MemoryKv,
        scans: AtomicUsize,
    }

    impl CountingKv {
        fn new() -> Self {
            Self {
                inner: MemoryKv::new(),
                scans: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KvStore for CountingKv {
        async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, KvError> {
            self.inner.delete(key).await
        }

        async fn scan(&self, prefix: &str) -> Result<Vec<String>, KvError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.scan(prefix).await
        }

        async fn ping(&self) -> Result<(), KvError> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn issue_and_resolve() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = manager(kv);
        let token = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
        assert_eq!(token.len(), 32);
        let session = sessions.resolve(&token).await.unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn unknown_token_is_distinct_from_malformed() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        kv.set("session:bad", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let sessions = manager(Arc::clone(&kv));
        assert!(matches!(
            sessions.resolve("missing").await,
            Err(SessionError::Unknown)
        ));
        assert!(matches!(
            sessions.resolve("bad").await,
            Err(SessionError::Malformed)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent_on_absent_tokens() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = manager(kv);
        let token = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
        assert!(sessions.revoke(&token).await.unwrap());
        assert!(!sessions.revoke(&token).await.unwrap());
        assert!(matches!(
            sessions.resolve(&token).await,
            Err(SessionError::Unknown)
        ));
    }

    #[tokio::test]
    async fn revoke_all_only_touches_the_owner() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = manager(Arc::clone(&kv));
        let mine_a = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
        let mine_b = sessions.issue("user-1", "10.0.0.2", true).await.unwrap();
        let theirs = sessions.issue("user-2", "10.0.0.3", false).await.unwrap();

        // The reported count covers every scanned session key, not only the
        // deleted ones.
        let scanned = sessions.revoke_all_for_user("user-1").await.unwrap();
        assert_eq!(scanned, 3);
        assert!(sessions.resolve(&mine_a).await.is_err());
        assert!(sessions.resolve(&mine_b).await.is_err());
        assert!(sessions.resolve(&theirs).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_all_scans_the_namespace_once() {
        let kv = Arc::new(CountingKv::new());
        let sessions = manager(Arc::clone(&kv) as Arc<dyn KvStore>);
        sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
        sessions.issue("user-2", "10.0.0.2", false).await.unwrap();

        let scanned = sessions.revoke_all_for_user("user-1").await.unwrap();
        assert_eq!(scanned, 2);
        // The count and the deletion set come from the same snapshot.
        assert_eq!(kv.scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ips_for_user_lists_live_sessions() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let sessions = manager(kv);
        sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
        sessions.issue("user-1", "10.0.0.2", false).await.unwrap();
        sessions.issue("user-2", "10.0.0.9", false).await.unwrap();
        let mut ips = sessions.ips_for_user("user-1").await.unwrap();
        ips.sort();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
