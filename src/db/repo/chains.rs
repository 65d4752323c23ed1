//! Materialized chain rows.

use crate::domain::{
    Chain, ChainFilter, ChainStatus, DetectionMethod, LatestPosition, Order, Symbol, TimeMs,
    UserId,
};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use super::{decode_error, parse_decimal_column, Repository};

const SELECT_COLUMNS: &str = r#"
    SELECT chain_id, underlying_symbol, status, detection_method, roll_count,
           total_credits_collected, total_debits_paid, net_premium, total_pnl,
           start_ms, last_activity_ms, opener_ambiguous, orders_json, latest_position_json
    FROM roll_chains
"#;

impl Repository {
    /// Replace every stored chain of `user` with `chains` in one transaction.
    ///
    /// Readers see either the previous set or the new one, never a mix.
    ///
    /// # Errors
    /// Returns an error if serialization or any statement fails; nothing is
    /// written in that case.
    pub async fn replace_user_chains(
        &self,
        user: &UserId,
        chains: &[Chain],
    ) -> Result<usize, sqlx::Error> {
        let updated_at = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM roll_chains WHERE user_id = ?")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;

        for chain in chains {
            upsert_in_tx(&mut tx, user, chain, updated_at).await?;
        }

        tx.commit().await?;
        Ok(chains.len())
    }

    /// Insert or overwrite one chain keyed by `(user, chain_id)`.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_chain(&self, user: &UserId, chain: &Chain) -> Result<(), sqlx::Error> {
        let updated_at = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;
        upsert_in_tx(&mut tx, user, chain, updated_at).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stored chains of `user` matching `filter`, ordered by start then id.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub async fn query_chains(
        &self,
        user: &UserId,
        filter: &ChainFilter,
        now: TimeMs,
    ) -> Result<Vec<Chain>, sqlx::Error> {
        let since = now.days_before(filter.lookback_days).as_ms();
        let min_orders = i64::try_from(filter.min_orders).unwrap_or(i64::MAX);
        let sql = format!(
            "{SELECT_COLUMNS}
            WHERE user_id = ?
              AND last_activity_ms >= ?
              AND order_count >= ?
              AND (? IS NULL OR underlying_symbol = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY start_ms ASC, chain_id ASC"
        );

        let symbol = filter.symbol.as_deref();
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(since)
            .bind(min_orders)
            .bind(symbol)
            .bind(symbol)
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(chain_from_row).collect()
    }

    /// Look up one stored chain.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get_chain(
        &self,
        user: &UserId,
        chain_id: &str,
    ) -> Result<Option<Chain>, sqlx::Error> {
        let sql = format!("{SELECT_COLUMNS} WHERE user_id = ? AND chain_id = ?");
        let row = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(chain_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(chain_from_row).transpose()
    }

    pub async fn count_user_chains(&self, user: &UserId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM roll_chains WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

/// JSON column payload. Encoding failures surface as `sqlx::Error::Protocol`.
fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to encode JSON column: {e}")))
}

async fn upsert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user: &UserId,
    chain: &Chain,
    updated_at: i64,
) -> Result<(), sqlx::Error> {
    let orders_json = encode_json(&chain.orders)?;
    let latest_position_json = chain.latest_position.as_ref().map(encode_json).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO roll_chains (
            user_id, chain_id, underlying_symbol, status, detection_method,
            roll_count, order_count, total_credits_collected, total_debits_paid,
            net_premium, total_pnl, start_ms, last_activity_ms, opener_ambiguous,
            orders_json, latest_position_json, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, chain_id) DO UPDATE SET
            underlying_symbol = excluded.underlying_symbol,
            status = excluded.status,
            detection_method = excluded.detection_method,
            roll_count = excluded.roll_count,
            order_count = excluded.order_count,
            total_credits_collected = excluded.total_credits_collected,
            total_debits_paid = excluded.total_debits_paid,
            net_premium = excluded.net_premium,
            total_pnl = excluded.total_pnl,
            start_ms = excluded.start_ms,
            last_activity_ms = excluded.last_activity_ms,
            opener_ambiguous = excluded.opener_ambiguous,
            orders_json = excluded.orders_json,
            latest_position_json = excluded.latest_position_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user.as_str())
    .bind(chain.chain_id.as_str())
    .bind(chain.underlying_symbol.as_str())
    .bind(chain.status.as_str())
    .bind(chain.detection_method.as_str())
    .bind(chain.roll_count as i64)
    .bind(chain.order_count() as i64)
    .bind(chain.total_credits_collected.to_canonical_string())
    .bind(chain.total_debits_paid.to_canonical_string())
    .bind(chain.net_premium.to_canonical_string())
    .bind(chain.total_pnl.to_canonical_string())
    .bind(chain.start_date.as_ms())
    .bind(chain.last_activity_date.as_ms())
    .bind(chain.opener_ambiguous)
    .bind(orders_json)
    .bind(latest_position_json)
    .bind(updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn chain_from_row(row: &SqliteRow) -> Result<Chain, sqlx::Error> {
    let chain_id: String = row.get("chain_id");

    let status_str: String = row.get("status");
    let status = ChainStatus::parse(&status_str)
        .ok_or_else(|| decode_error(format!("chain {chain_id}: bad status {status_str}")))?;
    let method_str: String = row.get("detection_method");
    let detection_method = DetectionMethod::parse(&method_str)
        .ok_or_else(|| decode_error(format!("chain {chain_id}: bad method {method_str}")))?;

    let orders_json: String = row.get("orders_json");
    let orders: Vec<Order> = serde_json::from_str(&orders_json)
        .map_err(|e| decode_error(format!("chain {chain_id}: orders: {e}")))?;
    let latest_position_json: Option<String> = row.get("latest_position_json");
    let latest_position: Option<LatestPosition> = latest_position_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| decode_error(format!("chain {chain_id}: latest position: {e}")))?;

    let roll_count: i64 = row.get("roll_count");
    let credits: String = row.get("total_credits_collected");
    let debits: String = row.get("total_debits_paid");
    let net: String = row.get("net_premium");
    let pnl: String = row.get("total_pnl");
    let symbol: String = row.get("underlying_symbol");

    Ok(Chain {
        underlying_symbol: Symbol::new(&symbol),
        orders,
        detection_method,
        status,
        roll_count: usize::try_from(roll_count).unwrap_or_default(),
        total_credits_collected: parse_decimal_column("total_credits_collected", &credits),
        total_debits_paid: parse_decimal_column("total_debits_paid", &debits),
        net_premium: parse_decimal_column("net_premium", &net),
        total_pnl: parse_decimal_column("total_pnl", &pnl),
        start_date: TimeMs::new(row.get("start_ms")),
        last_activity_date: TimeMs::new(row.get("last_activity_ms")),
        latest_position,
        opener_ambiguous: row.get("opener_ambiguous"),
        chain_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{Decimal, Direction, Leg, OptionType, PositionEffect, Side};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn test_encode_json_failure_is_protocol_error() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        let err = encode_json(&bad).unwrap_err();
        assert!(matches!(err, sqlx::Error::Protocol(ref msg) if msg.contains("JSON column")));

        assert_eq!(encode_json(&vec!["a"]).unwrap(), r#"["a"]"#);
    }

    async fn setup() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chains.db").to_string_lossy().to_string();
        let pool = init_db(&path).await.unwrap();
        (dir, Repository::new(pool))
    }

    fn order(id: &str, t: i64) -> Order {
        Order {
            id: id.to_string(),
            underlying_symbol: Symbol::new("AAPL"),
            created_at: TimeMs::new(t),
            direction: Direction::Credit,
            processed_premium: Decimal::from_str_canonical("1.25").unwrap(),
            processed_quantity: Decimal::from_str_canonical("1").unwrap(),
            legs: vec![Leg {
                option_type: OptionType::Put,
                strike_price: Decimal::from_str_canonical("150").unwrap(),
                expiration_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                side: Side::Sell,
                position_effect: PositionEffect::Open,
                quantity: Decimal::from_str_canonical("1").unwrap(),
                long_strategy_code: None,
                short_strategy_code: Some("X".to_string()),
            }],
            form_source: None,
            strategy_labels: Vec::new(),
        }
    }

    fn chain(symbol: &str, first_id: &str, start: i64, status: ChainStatus) -> Chain {
        let sym = Symbol::new(symbol);
        Chain {
            chain_id: Chain::compute_chain_id(&sym, first_id),
            underlying_symbol: sym,
            orders: vec![order(first_id, start), order(&format!("{first_id}-2"), start + 1)],
            detection_method: DetectionMethod::StrategyCode,
            status,
            roll_count: 1,
            total_credits_collected: Decimal::from_str_canonical("2.5").unwrap(),
            total_debits_paid: Decimal::zero(),
            net_premium: Decimal::from_str_canonical("2.5").unwrap(),
            total_pnl: Decimal::from_str_canonical("2.5").unwrap(),
            start_date: TimeMs::new(start),
            last_activity_date: TimeMs::new(start + 1),
            latest_position: None,
            opener_ambiguous: false,
        }
    }

    #[tokio::test]
    async fn test_replace_and_query_round_trip() {
        let (_dir, repo) = setup().await;
        let user = UserId::new("u1");
        let now = TimeMs::new(100 * DAY_MS);
        let chains = vec![
            chain("AAPL", "b", 90 * DAY_MS, ChainStatus::Active),
            chain("MSFT", "a", 95 * DAY_MS, ChainStatus::Closed),
        ];

        assert_eq!(repo.replace_user_chains(&user, &chains).await.unwrap(), 2);

        let stored = repo.query_chains(&user, &ChainFilter::new(30, 2), now).await.unwrap();
        assert_eq!(stored, chains);
    }

    #[tokio::test]
    async fn test_replace_removes_previous_set() {
        let (_dir, repo) = setup().await;
        let user = UserId::new("u1");
        let other = UserId::new("u2");
        repo.replace_user_chains(&user, &[chain("AAPL", "a", 1, ChainStatus::Active)])
            .await
            .unwrap();
        repo.replace_user_chains(&other, &[chain("AAPL", "a", 1, ChainStatus::Active)])
            .await
            .unwrap();

        repo.replace_user_chains(&user, &[chain("MSFT", "z", 2, ChainStatus::Closed)])
            .await
            .unwrap();

        assert_eq!(repo.count_user_chains(&user).await.unwrap(), 1);
        assert_eq!(repo.count_user_chains(&other).await.unwrap(), 1);
        let kept = chain("MSFT", "z", 2, ChainStatus::Closed);
        assert!(repo.get_chain(&user, &kept.chain_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_query_filters() {
        let (_dir, repo) = setup().await;
        let user = UserId::new("u1");
        let now = TimeMs::new(100 * DAY_MS);
        repo.replace_user_chains(
            &user,
            &[
                chain("AAPL", "old", 10 * DAY_MS, ChainStatus::Closed),
                chain("AAPL", "a", 90 * DAY_MS, ChainStatus::Active),
                chain("MSFT", "m", 91 * DAY_MS, ChainStatus::Closed),
            ],
        )
        .await
        .unwrap();

        let all = repo.query_chains(&user, &ChainFilter::new(365, 2), now).await.unwrap();
        assert_eq!(all.len(), 3);

        let recent = repo.query_chains(&user, &ChainFilter::new(30, 2), now).await.unwrap();
        assert_eq!(recent.len(), 2);

        let aapl = ChainFilter::new(365, 2).with_symbol(Some("aapl".to_string()));
        assert_eq!(repo.query_chains(&user, &aapl, now).await.unwrap().len(), 2);

        let closed = ChainFilter::new(365, 2).with_status(Some(ChainStatus::Closed));
        let closed = repo.query_chains(&user, &closed, now).await.unwrap();
        assert!(closed.iter().all(|c| c.status == ChainStatus::Closed));
        assert_eq!(closed.len(), 2);

        let big = repo.query_chains(&user, &ChainFilter::new(365, 3), now).await.unwrap();
        assert!(big.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_key() {
        let (_dir, repo) = setup().await;
        let user = UserId::new("u1");
        let mut c = chain("AAPL", "a", 1, ChainStatus::Active);
        repo.upsert_chain(&user, &c).await.unwrap();

        c.status = ChainStatus::Closed;
        repo.upsert_chain(&user, &c).await.unwrap();

        assert_eq!(repo.count_user_chains(&user).await.unwrap(), 1);
        let stored = repo.get_chain(&user, &c.chain_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChainStatus::Closed);
    }
}
