//! Repository layer for the chain store.
//!
//! Methods are organized across submodules:
//! - `chains.rs` - materialized chain rows
//! - `runs.rs` - refresh run bookkeeping

mod chains;
mod runs;

use crate::domain::{Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tracing::warn;

/// Outcome of one refresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "timed_out" => Some(RunStatus::TimedOut),
            _ => None,
        }
    }
}

/// Bookkeeping row for one refresh of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRun {
    pub run_id: String,
    pub user: UserId,
    pub started_at: TimeMs,
    pub finished_at: TimeMs,
    pub status: RunStatus,
    pub chain_count: usize,
    pub error: Option<String>,
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored decimal column, defaulting to zero on corruption.
fn parse_decimal_column(column: &str, raw: &str) -> Decimal {
    Decimal::from_str_canonical(raw).unwrap_or_else(|e| {
        warn!(column, value = raw, error = %e, "Invalid stored decimal; using zero");
        Decimal::zero()
    })
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}
