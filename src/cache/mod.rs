//! Read-through caches for served chain lists.
//!
//! Tiers are queried fastest first. A hit in a lower tier is copied into the
//! tiers above it so the next read is served locally.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryChainCache;
pub use self::redis::RedisChainCache;

use crate::domain::{Chain, ChainFilter, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const KEY_PREFIX: &str = "rollchain:chains";

/// Key for one user's chain list under one filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user: UserId,
    pub filter: ChainFilter,
}

impl CacheKey {
    pub fn new(user: UserId, filter: ChainFilter) -> Self {
        Self { user, filter }
    }

    /// `rollchain:chains:{user}:{lookback}:{symbol|all}:{status|any}:{min_orders}`
    pub fn to_key_string(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            KEY_PREFIX,
            self.user,
            self.filter.lookback_days,
            self.filter.symbol.as_deref().unwrap_or("all"),
            self.filter.status.map(|s| s.as_str()).unwrap_or("any"),
            self.filter.min_orders,
        )
    }

    /// Glob matching every key of `user`.
    pub fn user_pattern(user: &UserId) -> String {
        format!("{}:{}:*", KEY_PREFIX, user)
    }

    pub fn user_prefix(user: &UserId) -> String {
        format!("{}:{}:", KEY_PREFIX, user)
    }
}

/// A cached chain list with the lookback it was actually computed over, which
/// can be shorter than the one in its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChains {
    pub lookback_days: u32,
    pub chains: Vec<Chain>,
}

impl CachedChains {
    pub fn new(lookback_days: u32, chains: Vec<Chain>) -> Self {
        Self {
            lookback_days,
            chains,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait ChainCache: Send + Sync + fmt::Debug {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedChains>, CacheError>;

    async fn put(&self, key: &CacheKey, value: &CachedChains, ttl: Duration)
        -> Result<(), CacheError>;

    /// Drop every entry for `user`; returns how many entries were removed.
    async fn invalidate_user(&self, user: &UserId) -> Result<usize, CacheError>;
}

/// Ordered stack of caches, fastest first.
///
/// Tier errors are logged and treated as misses so a down Redis never fails a
/// read.
#[derive(Debug, Clone)]
pub struct LayeredChainCache {
    tiers: Vec<Arc<dyn ChainCache>>,
    backfill_ttl: Duration,
}

impl LayeredChainCache {
    pub fn new(backfill_ttl: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            backfill_ttl,
        }
    }

    pub fn with_tier(mut self, tier: Arc<dyn ChainCache>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

#[async_trait]
impl ChainCache for LayeredChainCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedChains>, CacheError> {
        for (idx, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(Some(cached)) => {
                    for upper in &self.tiers[..idx] {
                        if let Err(e) = upper.put(key, &cached, self.backfill_ttl).await {
                            warn!(key = %key.to_key_string(), error = %e, "Cache backfill failed");
                        }
                    }
                    return Ok(Some(cached));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key.to_key_string(), tier = idx, error = %e, "Cache read failed");
                }
            }
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: &CachedChains,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        for (idx, tier) in self.tiers.iter().enumerate() {
            if let Err(e) = tier.put(key, value, ttl).await {
                warn!(key = %key.to_key_string(), tier = idx, error = %e, "Cache write failed");
            }
        }
        Ok(())
    }

    /// Unlike reads, invalidation reports the first tier failure after
    /// attempting every tier.
    async fn invalidate_user(&self, user: &UserId) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut first_err = None;
        for tier in &self.tiers {
            match tier.invalidate_user(user).await {
                Ok(n) => removed += n,
                Err(e) => {
                    warn!(user = %user, error = %e, "Cache invalidation failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChainStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FailingCache {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ChainCache for FailingCache {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CachedChains>, CacheError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Payload(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            ))
        }

        async fn put(&self, _: &CacheKey, _: &CachedChains, _: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn invalidate_user(&self, _user: &UserId) -> Result<usize, CacheError> {
            Ok(0)
        }
    }

    fn key(user: &str) -> CacheKey {
        CacheKey::new(UserId::new(user), ChainFilter::new(90, 2))
    }

    fn empty(lookback_days: u32) -> CachedChains {
        CachedChains::new(lookback_days, Vec::new())
    }

    #[test]
    fn test_key_format() {
        let k = CacheKey::new(
            UserId::new("u1"),
            ChainFilter::new(30, 3)
                .with_symbol(Some("aapl".to_string()))
                .with_status(Some(ChainStatus::Active)),
        );
        assert_eq!(k.to_key_string(), "rollchain:chains:u1:30:AAPL:active:3");
        assert_eq!(key("u1").to_key_string(), "rollchain:chains:u1:90:all:any:2");
        assert_eq!(CacheKey::user_pattern(&UserId::new("u1")), "rollchain:chains:u1:*");
    }

    #[tokio::test]
    async fn test_lower_tier_hit_backfills_upper() {
        let upper = Arc::new(InMemoryChainCache::new());
        let lower = Arc::new(InMemoryChainCache::new());
        lower.put(&key("u1"), &empty(30), Duration::from_secs(60)).await.unwrap();

        let layered = LayeredChainCache::new(Duration::from_secs(60))
            .with_tier(upper.clone())
            .with_tier(lower.clone());

        assert_eq!(layered.get(&key("u1")).await.unwrap(), Some(empty(30)));
        // The backfilled copy keeps the lookback the lower tier recorded.
        assert_eq!(upper.get(&key("u1")).await.unwrap(), Some(empty(30)));
    }

    #[tokio::test]
    async fn test_failing_tier_is_a_miss() {
        let failing = Arc::new(FailingCache::default());
        let memory = Arc::new(InMemoryChainCache::new());
        memory.put(&key("u1"), &empty(90), Duration::from_secs(60)).await.unwrap();

        let layered = LayeredChainCache::new(Duration::from_secs(60))
            .with_tier(failing.clone())
            .with_tier(memory);

        assert_eq!(layered.get(&key("u1")).await.unwrap(), Some(empty(90)));
        assert_eq!(layered.get(&key("u2")).await.unwrap(), None);
        assert_eq!(failing.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_tiers() {
        let a = Arc::new(InMemoryChainCache::new());
        let b = Arc::new(InMemoryChainCache::new());
        let layered = LayeredChainCache::new(Duration::from_secs(60))
            .with_tier(a.clone())
            .with_tier(b.clone());
        layered.put(&key("u1"), &empty(90), Duration::from_secs(60)).await.unwrap();

        assert_eq!(layered.invalidate_user(&UserId::new("u1")).await.unwrap(), 2);
        assert_eq!(a.get(&key("u1")).await.unwrap(), None);
        assert_eq!(b.get(&key("u1")).await.unwrap(), None);
    }
}
