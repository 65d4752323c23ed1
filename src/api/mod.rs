pub mod chains;
pub mod health;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::{ChainService, RefreshCoordinator};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub service: ChainService,
    pub refresh: RefreshCoordinator,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        service: ChainService,
        refresh: RefreshCoordinator,
    ) -> Self {
        Self {
            repo,
            config,
            service,
            refresh,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/chains", get(chains::get_chains))
        .route("/v1/chains/detect", get(chains::detect_chains))
        .route("/v1/users/:user/chains/:chain_id", get(chains::get_stored_chain))
        .route("/v1/users/:user/refresh", post(chains::refresh_user))
        .route("/v1/users/:user/refresh-runs", get(chains::get_refresh_runs))
        .layer(cors)
        .with_state(state)
}
