//! Chain store bootstrap: pool, pragmas and idempotent schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = include_str!("schema.sql");
const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) the chain store and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Could not create database directory");
            }
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    let applied = apply_schema(&pool).await?;
    info!(path = %db_path, statements = applied, "Chain store ready");
    Ok(pool)
}

/// Non-empty statements of the bundled schema, in file order.
fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Every statement is `IF NOT EXISTS`, so this is safe on each start.
async fn apply_schema(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let mut applied = 0;
    for statement in schema_statements() {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }
    debug!(statements = applied, "Chain store schema applied");
    Ok(applied)
}
