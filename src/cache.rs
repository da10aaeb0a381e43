//! Read-through caching over the TTL key-value store.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::kv::KvStore;

#[derive(Debug, thiserror::Error)]
pub enum CacheError<E> {
    /// A cached value existed but was not valid JSON for `T`.
    #[error("failed to decode cached value")]
    Decode(#[source] serde_json::Error),
    /// The underlying fetch failed.
    #[error(transparent)]
    Fetch(E),
}

/// Return the cached value under `key` if present, otherwise run `fetch`,
/// cache its result for `ttl`, and return it.
///
/// Store failures on either side are logged and ignored; the cache degrades
/// to a plain fetch. A present-but-undecodable value is an error because it
/// means writer and reader disagree about the schema.
pub async fn read_through<T, E, F, Fut>(
    kv: &dyn KvStore,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<T, CacheError<E>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match kv.get(key).await {
        Ok(Some(cached)) => {
            return serde_json::from_str(&cached).map_err(CacheError::Decode);
        }
        Ok(None) => {}
        Err(err) => warn!("Cache read failed for {key}: {err}"),
    }

    let fresh = fetch().await.map_err(CacheError::Fetch)?;

    match serde_json::to_string(&fresh) {
        Ok(encoded) => {
            if let Err(err) = kv.set(key, &encoded, ttl).await {
                warn!("Cache write failed for {key}: {err}");
            }
        }
        Err(err) => warn!("Cache encode failed for {key}: {err}"),
    }

    Ok(fresh)
}

/// Drop a cache entry, typically after a write invalidates it.
pub async fn invalidate(kv: &dyn KvStore, key: &str) {
    if let Err(err) = kv.delete(key).await {
        warn!("Cache invalidation failed for {key}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_read_skips_the_fetch() {
        let kv = MemoryKv::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let value: Vec<String> = read_through(&kv, "users", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(vec!["a".to_string()])
            })
            .await
            .unwrap();
            assert_eq!(value, vec!["a".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_nothing_is_cached() {
        let kv = MemoryKv::new();
        let result: Result<Vec<String>, _> =
            read_through(&kv, "users", Duration::from_secs(60), || async {
                Err::<Vec<String>, _>("db down")
            })
            .await;
        assert!(matches!(result, Err(CacheError::Fetch("db down"))));
        assert_eq!(kv.get("users").await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecodable_cache_entry_is_an_error() {
        let kv = MemoryKv::new();
        kv.set("users", "{broken", Duration::from_secs(60))
            .await
            .unwrap();
        let result: Result<Vec<String>, _> =
            read_through(&kv, "users", Duration::from_secs(60), || async {
                Ok::<_, Infallible>(vec![])
            })
            .await;
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let kv = MemoryKv::new();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(1u32)
        };
        let _: u32 = read_through(&kv, "n", Duration::from_secs(60), fetch)
            .await
            .unwrap();
        invalidate(&kv, "n").await;
        let _: u32 = read_through(&kv, "n", Duration::from_secs(60), fetch)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
