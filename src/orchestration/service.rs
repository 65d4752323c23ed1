//! Chain detection and the cache-first read path.

use crate::cache::{CacheError, CacheKey, CachedChains, ChainCache};
use crate::config::Config;
use crate::datasource::{DataSourceError, OrderFeed, OrderQuery};
use crate::db::Repository;
use crate::domain::{Chain, ChainFilter, ChainStatus, Page, TimeMs, UserId};
use crate::engine::{ChainDetector, DetectionOutput, DetectionParams};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("order feed unavailable: {0}")]
    Feed(#[from] DataSourceError),
    #[error("chain store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("detection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where a served page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainSource {
    Cache,
    Store,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedChains {
    pub source: ChainSource,
    /// Lookback actually applied; smaller than requested on a fresh fallback.
    pub lookback_days: u32,
    #[serde(flatten)]
    pub page: Page<Chain>,
}

#[derive(Debug, Clone)]
pub struct ChainService {
    feed: Arc<dyn OrderFeed>,
    repo: Arc<Repository>,
    cache: Arc<dyn ChainCache>,
    config: Config,
}

impl ChainService {
    pub fn new(
        feed: Arc<dyn OrderFeed>,
        repo: Arc<Repository>,
        cache: Arc<dyn ChainCache>,
        config: Config,
    ) -> Self {
        Self {
            feed,
            repo,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch the user's orders and run detection, returning chains only.
    pub async fn detect_chains(
        &self,
        user: &UserId,
        lookback_days: u32,
        symbol: Option<String>,
        status: Option<ChainStatus>,
        min_orders: usize,
    ) -> Result<Vec<Chain>, ServiceError> {
        let filter = ChainFilter::new(lookback_days, min_orders)
            .with_symbol(symbol)
            .with_status(status);
        Ok(self.detect(user, &filter).await?.chains)
    }

    /// Fetch the user's orders and run detection.
    ///
    /// The feed is queried for the lookback window; detection itself runs on
    /// the blocking pool since it is CPU-bound.
    pub async fn detect(
        &self,
        user: &UserId,
        filter: &ChainFilter,
    ) -> Result<DetectionOutput, ServiceError> {
        self.detect_holding(user, filter, ()).await
    }

    /// Like [`detect`](Self::detect), but `hold` moves into the blocking
    /// detection task and is dropped when that task ends. Dropping this
    /// future does not stop a detection already on the blocking pool, so
    /// `hold` outlives it until the computation actually finishes.
    pub async fn detect_holding<H: Send + 'static>(
        &self,
        user: &UserId,
        filter: &ChainFilter,
        hold: H,
    ) -> Result<DetectionOutput, ServiceError> {
        let started = Instant::now();
        let as_of = TimeMs::now();
        let query = OrderQuery {
            user: user.clone(),
            since: as_of.days_before(filter.lookback_days),
            symbol: filter.symbol.clone(),
        };

        let raw_orders = self.feed.fetch_all_orders(&query).await?;
        let fetched = raw_orders.len();

        let params = DetectionParams::new(as_of)
            .with_lookback_days(filter.lookback_days)
            .with_symbol(filter.symbol.clone())
            .with_status(filter.status)
            .with_min_orders(filter.min_orders);
        let output = tokio::task::spawn_blocking(move || {
            let _hold = hold;
            ChainDetector::detect(&raw_orders, &params)
        })
        .await?;

        for ambiguity in &output.ambiguities {
            warn!(
                user = %user,
                chain_id = %ambiguity.chain_id,
                symbol = %ambiguity.underlying_symbol,
                chosen = %ambiguity.chosen_order_id,
                candidates = ambiguity.candidate_order_ids.len(),
                "Opener chosen among tied candidates"
            );
        }
        info!(
            user = %user,
            fetched,
            skipped = output.report.skipped_total(),
            chains = output.chains.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Detection complete"
        );
        Ok(output)
    }

    /// Serve one page of chains.
    ///
    /// Tiers: cache, then the durable store, then a fresh detection. The store
    /// answers only once the user has a succeeded refresh and only for filters
    /// inside the refresh's own lookback and minimum order count. Fresh
    /// detection uses the shortened fallback lookback until that first
    /// refresh, and the requested lookback after it. Whatever is found below
    /// the cache is written back to it along with the lookback actually
    /// applied.
    pub async fn get_cached_chains(
        &self,
        user: &UserId,
        filter: &ChainFilter,
        page: usize,
        page_size: usize,
    ) -> Result<ServedChains, ServiceError> {
        let key = CacheKey::new(user.clone(), filter.clone());

        if let Some(cached) = self.cache.get(&key).await? {
            debug!(key = %key.to_key_string(), "Chain cache hit");
            return Ok(ServedChains {
                source: ChainSource::Cache,
                lookback_days: cached.lookback_days,
                page: Page::paginate(&cached.chains, page, page_size),
            });
        }

        let materialized = self.repo.last_successful_run(user).await?.is_some();
        let store_covers =
            filter.is_covered_by(self.config.default_lookback_days, self.config.min_orders);
        let (source, lookback_days, chains) =
            if materialized && store_covers {
                let chains = self.repo.query_chains(user, filter, TimeMs::now()).await?;
                (ChainSource::Store, filter.lookback_days, chains)
            } else {
                let lookback_days = if materialized {
                    filter.lookback_days
                } else {
                    filter.lookback_days.min(self.config.fallback_lookback_days)
                };
                let fresh = ChainFilter {
                    lookback_days,
                    ..filter.clone()
                };
                let chains = self.detect(user, &fresh).await?.chains;
                (ChainSource::Fresh, lookback_days, chains)
            };

        let cached = CachedChains::new(lookback_days, chains);
        if let Err(e) = self.cache.put(&key, &cached, self.config.cache_ttl()).await {
            warn!(key = %key.to_key_string(), error = %e, "Failed to populate chain cache");
        }

        Ok(ServedChains {
            source,
            lookback_days,
            page: Page::paginate(&cached.chains, page, page_size),
        })
    }
}
