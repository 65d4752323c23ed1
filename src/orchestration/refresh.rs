//! Background re-materialization of each user's chains.
//!
//! At most one run per user is in flight. A run detects, then replaces the
//! user's stored chains in one transaction, then drops the user's cache
//! entries. A run that exceeds its timeout is abandoned before anything is
//! written, so the previous stored set stays authoritative. The user's
//! in-flight slot stays taken until an abandoned detection has also left the
//! blocking pool.

use crate::cache::ChainCache;
use crate::db::{RefreshRun, Repository, RunStatus};
use crate::domain::{ChainFilter, TimeMs, UserId};
use crate::orchestration::service::{ChainService, ServiceError};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Accepted,
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh already running for {0}")]
    AlreadyRunning(UserId),
    #[error("refresh for {user} timed out after {elapsed_ms}ms")]
    TimedOut { user: UserId, elapsed_ms: u64 },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

type InFlight = Arc<Mutex<HashSet<UserId>>>;

/// Releases the user's in-flight slot when dropped.
#[derive(Debug)]
struct InFlightGuard {
    in_flight: InFlight,
    user: UserId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.user);
    }
}

#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    service: ChainService,
    repo: Arc<Repository>,
    cache: Arc<dyn ChainCache>,
    in_flight: InFlight,
}

impl RefreshCoordinator {
    pub fn new(service: ChainService, repo: Arc<Repository>, cache: Arc<dyn ChainCache>) -> Self {
        Self {
            service,
            repo,
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, user: &UserId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user)
    }

    fn try_acquire(&self, user: &UserId) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(user.clone()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            user: user.clone(),
        })
    }

    /// Start a run in the background unless one is already in flight.
    pub fn refresh_user(&self, user: &UserId) -> RefreshOutcome {
        let Some(guard) = self.try_acquire(user) else {
            info!(user = %user, "Refresh already running");
            return RefreshOutcome::AlreadyRunning;
        };

        let this = self.clone();
        let user = user.clone();
        tokio::spawn(async move {
            // Outcome is recorded and logged by execute.
            let _ = this.execute(&user, guard).await;
        });
        RefreshOutcome::Accepted
    }

    /// Run inline and return the recorded run.
    pub async fn run_user(&self, user: &UserId) -> Result<RefreshRun, RefreshError> {
        let guard = self
            .try_acquire(user)
            .ok_or_else(|| RefreshError::AlreadyRunning(user.clone()))?;
        self.execute(user, guard).await
    }

    /// Run every user concurrently; one user's failure does not affect others.
    pub async fn run_all(&self, users: &[UserId]) -> Vec<Result<RefreshRun, RefreshError>> {
        join_all(users.iter().map(|user| self.run_user(user))).await
    }

    /// Tick every refresh interval (first tick immediately) and refresh the
    /// configured users. Failed runs wait for the next tick.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let users = this.service.config().refresh_users.clone();
            let mut ticker = tokio::time::interval(this.service.config().refresh_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(users = users.len(), "Refresh scheduler started");

            loop {
                ticker.tick().await;
                let results = this.run_all(&users).await;
                let failed = results.iter().filter(|r| r.is_err()).count();
                info!(users = users.len(), failed, "Refresh tick complete");
            }
        })
    }

    async fn execute(
        &self,
        user: &UserId,
        guard: InFlightGuard,
    ) -> Result<RefreshRun, RefreshError> {
        // Shared with the blocking detection task; the slot frees on the last drop.
        let guard = Arc::new(guard);
        let config = self.service.config();
        let run_id = Uuid::new_v4().to_string();
        let started_at = TimeMs::now();
        let started = Instant::now();
        let filter = ChainFilter::new(config.default_lookback_days, config.min_orders);

        info!(user = %user, run_id = %run_id, "Refresh started");

        let detected = tokio::time::timeout(
            config.run_timeout(),
            self.service.detect_holding(user, &filter, Arc::clone(&guard)),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match detected {
            Err(_) => Err(RefreshError::TimedOut {
                user: user.clone(),
                elapsed_ms,
            }),
            Ok(Err(e)) => Err(RefreshError::Service(e)),
            Ok(Ok(output)) => self
                .repo
                .replace_user_chains(user, &output.chains)
                .await
                .map_err(|e| RefreshError::Service(ServiceError::Store(e))),
        };

        let (status, chain_count) = match &result {
            Ok(count) => (RunStatus::Succeeded, *count),
            Err(RefreshError::TimedOut { .. }) => (RunStatus::TimedOut, 0),
            Err(_) => (RunStatus::Failed, 0),
        };
        let run = RefreshRun {
            run_id,
            user: user.clone(),
            started_at,
            finished_at: TimeMs::now(),
            status,
            chain_count,
            error: result.as_ref().err().map(|e| e.to_string()),
        };

        if let Err(e) = self.repo.record_refresh_run(&run).await {
            error!(user = %user, run_id = %run.run_id, error = %e, "Failed to record refresh run");
        }

        match result {
            Ok(count) => {
                match self.cache.invalidate_user(user).await {
                    Ok(removed) => info!(
                        user = %user,
                        chains = count,
                        evicted = removed,
                        duration_ms = elapsed_ms,
                        "Refresh succeeded"
                    ),
                    Err(e) => warn!(
                        user = %user,
                        error = %e,
                        "Refresh succeeded but cache invalidation failed"
                    ),
                }
                Ok(run)
            }
            Err(e @ RefreshError::TimedOut { .. }) => {
                warn!(
                    user = %user,
                    duration_ms = elapsed_ms,
                    "Refresh timed out; keeping previous chains"
                );
                Err(e)
            }
            Err(e) => {
                error!(user = %user, duration_ms = elapsed_ms, error = %e, "Refresh failed");
                Err(e)
            }
        }
    }
}
