//! Refresh run bookkeeping.

use crate::domain::{TimeMs, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decode_error, RefreshRun, Repository, RunStatus};

impl Repository {
    /// Record a finished run.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn record_refresh_run(&self, run: &RefreshRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO chain_refresh_runs (
                run_id, user_id, started_ms, finished_ms, status, chain_count, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(run.user.as_str())
        .bind(run.started_at.as_ms())
        .bind(run.finished_at.as_ms())
        .bind(run.status.as_str())
        .bind(run.chain_count as i64)
        .bind(run.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent succeeded run for `user`, if any.
    pub async fn last_successful_run(
        &self,
        user: &UserId,
    ) -> Result<Option<RefreshRun>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT run_id, user_id, started_ms, finished_ms, status, chain_count, error
            FROM chain_refresh_runs
            WHERE user_id = ? AND status = 'succeeded'
            ORDER BY finished_ms DESC, run_id DESC
            LIMIT 1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    /// Latest runs for `user`, newest first.
    pub async fn recent_refresh_runs(
        &self,
        user: &UserId,
        limit: u32,
    ) -> Result<Vec<RefreshRun>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, user_id, started_ms, finished_ms, status, chain_count, error
            FROM chain_refresh_runs
            WHERE user_id = ?
            ORDER BY finished_ms DESC, run_id DESC
            LIMIT ?
            "#,
        )
        .bind(user.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RefreshRun, sqlx::Error> {
    let run_id: String = row.get("run_id");
    let status_str: String = row.get("status");
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| decode_error(format!("run {run_id}: bad status {status_str}")))?;
    let chain_count: i64 = row.get("chain_count");

    Ok(RefreshRun {
        user: UserId::new(row.get::<String, _>("user_id")),
        started_at: TimeMs::new(row.get("started_ms")),
        finished_at: TimeMs::new(row.get("finished_ms")),
        status,
        chain_count: usize::try_from(chain_count).unwrap_or_default(),
        error: row.get("error"),
        run_id,
    })
}
