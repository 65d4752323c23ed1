use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db::RefreshRun;
use crate::domain::{Chain, ChainFilter, ChainStatus, UserId};
use crate::engine::DetectionOutput;
use crate::error::AppError;
use crate::orchestration::{RefreshOutcome, ServedChains};

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_RUNS_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainsQuery {
    pub user: String,
    pub lookback_days: Option<u32>,
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub min_orders: Option<usize>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub user: String,
    pub outcome: RefreshOutcome,
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RefreshRun>,
}

pub async fn get_chains(
    Query(params): Query<ChainsQuery>,
    State(state): State<AppState>,
) -> Result<Json<ServedChains>, AppError> {
    let user = parse_user(&params.user)?;
    let filter = parse_filter(&params, &state)?;

    let served = state
        .service
        .get_cached_chains(
            &user,
            &filter,
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(served))
}

/// Always runs detection against the order feed, bypassing every cache tier.
pub async fn detect_chains(
    Query(params): Query<ChainsQuery>,
    State(state): State<AppState>,
) -> Result<Json<DetectionOutput>, AppError> {
    let user = parse_user(&params.user)?;
    let filter = parse_filter(&params, &state)?;
    let output = state.service.detect(&user, &filter).await?;
    Ok(Json(output))
}

/// One materialized chain from the durable store. Only chains written by a
/// successful refresh run are visible here.
pub async fn get_stored_chain(
    Path((user, chain_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Chain>, AppError> {
    let user = parse_user(&user)?;
    state
        .repo
        .get_chain(&user, &chain_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("chain {} for user {}", chain_id, user)))
}

pub async fn refresh_user(
    Path(user): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshResponse>), AppError> {
    let user = parse_user(&user)?;
    let outcome = state.refresh.refresh_user(&user);
    let status = match outcome {
        RefreshOutcome::Accepted => StatusCode::ACCEPTED,
        RefreshOutcome::AlreadyRunning => StatusCode::CONFLICT,
    };
    Ok((
        status,
        Json(RefreshResponse {
            user: user.to_string(),
            outcome,
        }),
    ))
}

pub async fn get_refresh_runs(
    Path(user): Path<String>,
    Query(params): Query<RunsQuery>,
    State(state): State<AppState>,
) -> Result<Json<RunsResponse>, AppError> {
    let user = parse_user(&user)?;
    let limit = params.limit.unwrap_or(DEFAULT_RUNS_LIMIT).clamp(1, 500);
    let runs = state.repo.recent_refresh_runs(&user, limit).await?;
    Ok(Json(RunsResponse { runs }))
}

fn parse_user(raw: &str) -> Result<UserId, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("user is required".into()));
    }
    Ok(UserId::new(trimmed))
}

fn parse_filter(params: &ChainsQuery, state: &AppState) -> Result<ChainFilter, AppError> {
    let lookback_days = params
        .lookback_days
        .unwrap_or(state.config.default_lookback_days);
    if lookback_days == 0 {
        return Err(AppError::BadRequest("lookbackDays must be at least 1".into()));
    }

    let min_orders = params.min_orders.unwrap_or(state.config.min_orders);
    if min_orders == 0 {
        return Err(AppError::BadRequest("minOrders must be at least 1".into()));
    }

    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(ChainStatus::parse(&s.to_ascii_lowercase()).ok_or_else(|| {
            AppError::BadRequest(format!("status must be active or closed, got {}", s))
        })?),
    };

    Ok(ChainFilter::new(lookback_days, min_orders)
        .with_symbol(params.symbol.clone())
        .with_status(status))
}
