//! Shared Redis tier. Values are JSON-encoded `CachedChains` written with `SET EX`.

use super::{CacheError, CacheKey, CachedChains, ChainCache};
use crate::domain::UserId;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RedisChainCache {
    client: Client,
}

impl RedisChainCache {
    /// Opening the client does not connect; connections are made per call.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: Client::open(url)?,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl ChainCache for RedisChainCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedChains>, CacheError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(key.to_key_string()).await?;
        match payload {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: &CachedChains,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key.to_key_string(), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn invalidate_user(&self, user: &UserId) -> Result<usize, CacheError> {
        let pattern = CacheKey::user_pattern(user);
        let mut conn = self.connection().await?;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(k) = iter.next_item().await {
                keys.push(k);
            }
        }

        if keys.is_empty() {
            return Ok(0);
        }
        let removed: usize = conn.del(&keys).await?;
        debug!(user = %user, removed, "Invalidated redis chain cache");
        Ok(removed)
    }
}
