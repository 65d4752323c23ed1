use anyhow::Context;
use rollchain::{
    api, config::Config, db::init_db, ChainCache, ChainService, HttpOrderFeed, InMemoryChainCache,
    LayeredChainCache, OrderFeed, RedisChainCache, RefreshCoordinator, Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize chain store")?;
    let repo = Arc::new(Repository::new(pool));

    let mut layered =
        LayeredChainCache::new(config.cache_ttl()).with_tier(Arc::new(InMemoryChainCache::new()));
    if let Some(url) = config.redis_url.as_deref() {
        let redis = RedisChainCache::new(url).context("invalid REDIS_URL")?;
        layered = layered.with_tier(Arc::new(redis));
    }
    tracing::info!(tiers = layered.tier_count(), "Chain cache configured");
    let cache: Arc<dyn ChainCache> = Arc::new(layered);

    let feed: Arc<dyn OrderFeed> = Arc::new(HttpOrderFeed::new(config.order_feed_url.clone()));
    let service = ChainService::new(feed, repo.clone(), cache.clone(), config.clone());
    let refresh = RefreshCoordinator::new(service.clone(), repo.clone(), cache);

    let scheduler = if config.refresh_users.is_empty() {
        tracing::info!("No refresh users configured; scheduler disabled");
        None
    } else {
        Some(refresh.spawn_scheduler())
    };

    let app = api::create_router(api::AppState::new(repo, config.clone(), service, refresh));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(listener, app).await.context("server error");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    served
}
