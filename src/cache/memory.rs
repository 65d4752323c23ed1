//! In-process TTL cache.

use super::{CacheError, CacheKey, CachedChains, ChainCache};
use crate::domain::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    expires_at: Instant,
    value: Arc<CachedChains>,
}

#[derive(Debug, Default)]
pub struct InMemoryChainCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ChainCache for InMemoryChainCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedChains>, CacheError> {
        let k = key.to_key_string();
        {
            let entries = self.entries.read().await;
            match entries.get(&k) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.as_ref().clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict under the write lock, rechecking in case of a
        // concurrent refresh.
        let mut entries = self.entries.write().await;
        if entries
            .get(&k)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&k);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: &CachedChains,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            expires_at: Instant::now() + ttl,
            value: Arc::new(value.clone()),
        };
        self.entries.write().await.insert(key.to_key_string(), entry);
        Ok(())
    }

    async fn invalidate_user(&self, user: &UserId) -> Result<usize, CacheError> {
        let prefix = CacheKey::user_prefix(user);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChainFilter;

    fn key(user: &str, lookback: u32) -> CacheKey {
        CacheKey::new(UserId::new(user), ChainFilter::new(lookback, 2))
    }

    fn empty(lookback_days: u32) -> CachedChains {
        CachedChains::new(lookback_days, Vec::new())
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = InMemoryChainCache::new();
        assert_eq!(cache.get(&key("u1", 30)).await.unwrap(), None);
        cache.put(&key("u1", 30), &empty(30), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&key("u1", 30)).await.unwrap(), Some(empty(30)));
        assert_eq!(cache.get(&key("u1", 31)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let cache = InMemoryChainCache::new();
        cache.put(&key("u1", 30), &empty(30), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&key("u1", 30)).await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_user_only_touches_that_user() {
        let cache = InMemoryChainCache::new();
        let ttl = Duration::from_secs(60);
        cache.put(&key("u1", 30), &empty(30), ttl).await.unwrap();
        cache.put(&key("u1", 90), &empty(90), ttl).await.unwrap();
        cache.put(&key("u10", 30), &empty(30), ttl).await.unwrap();

        assert_eq!(cache.invalidate_user(&UserId::new("u1")).await.unwrap(), 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&key("u10", 30)).await.unwrap().is_some());
    }
}
