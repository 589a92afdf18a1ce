//! PostgreSQL-backed price store and alert log.
//!
//! Writes are batched through `UNNEST` arrays so a cycle costs one statement
//! per table regardless of how many quotes it carried. `commit_cycle` runs
//! both statements in one transaction.

pub mod pool;
pub mod retry;
pub mod schema;

pub use pool::{create_pool, DbPoolConfig};
pub use retry::{execute_with_retry, RetryPolicy};
pub use schema::ensure_schema;

use crate::error::StoreError;
use crate::models::{AlertFilter, AlertRecord, MarketType, PriceSnapshot};
use crate::store::{dedupe_last_wins, AlertLog, OddsStore, PriceStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use tracing::debug;

const SELECT_PRICES: &str =
    "SELECT market_key, price FROM last_prices WHERE market_key = ANY($1)";

const UPSERT_PRICES: &str = r#"
INSERT INTO last_prices (market_key, price, observed_at)
SELECT * FROM UNNEST($1::text[], $2::int4[], $3::timestamptz[])
ON CONFLICT (market_key) DO UPDATE
    SET price = EXCLUDED.price,
        observed_at = EXCLUDED.observed_at
"#;

const INSERT_ALERTS: &str = r#"
INSERT INTO alerts_log
    (id, market_key, league, game_id, market_type, book, old_price, new_price, delta_cents, ts)
SELECT * FROM UNNEST(
    $1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[],
    $7::int4[], $8::int4[], $9::int8[], $10::timestamptz[]
)
ON CONFLICT (id) DO NOTHING
"#;

const QUERY_ALERTS: &str = r#"
SELECT id, market_key, league, game_id, market_type, book, old_price, new_price, delta_cents, ts
FROM alerts_log
WHERE ($1::text IS NULL OR league = $1)
  AND ($2::text IS NULL OR game_id = $2)
  AND ($3::text IS NULL OR market_type = $3)
  AND ($4::text IS NULL OR book = $4)
  AND ($5::int8 IS NULL OR delta_cents >= $5)
  AND ($6::timestamptz IS NULL OR ts >= $6)
ORDER BY ts DESC, id DESC
LIMIT $7
"#;

#[derive(Debug, FromRow)]
struct AlertRow {
    id: String,
    market_key: String,
    league: String,
    game_id: String,
    market_type: String,
    book: String,
    old_price: i32,
    new_price: i32,
    delta_cents: i64,
    ts: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertRecord {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let market_type: MarketType = row.market_type.parse().map_err(|e| StoreError::CorruptRow {
            id: row.id.clone(),
            reason: format!("{}", e),
        })?;
        let delta_cents = u32::try_from(row.delta_cents).map_err(|_| StoreError::CorruptRow {
            id: row.id.clone(),
            reason: format!("delta_cents {} out of range", row.delta_cents),
        })?;
        Ok(AlertRecord {
            id: row.id,
            market_key: row.market_key,
            league: row.league,
            game_id: row.game_id,
            market_type,
            book: row.book,
            old_price: row.old_price,
            new_price: row.new_price,
            delta_cents,
            ts: row.ts,
        })
    }
}

async fn upsert_snapshots(
    conn: &mut PgConnection,
    entries: &[PriceSnapshot],
) -> Result<u64, sqlx::Error> {
    let entries = dedupe_last_wins(entries);
    if entries.is_empty() {
        return Ok(0);
    }

    let mut keys = Vec::with_capacity(entries.len());
    let mut prices = Vec::with_capacity(entries.len());
    let mut observed = Vec::with_capacity(entries.len());
    for entry in entries {
        keys.push(entry.market_key);
        prices.push(entry.price);
        observed.push(entry.observed_at);
    }

    let result = sqlx::query(UPSERT_PRICES)
        .bind(keys)
        .bind(prices)
        .bind(observed)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn insert_alerts(conn: &mut PgConnection, alerts: &[AlertRecord]) -> Result<u64, sqlx::Error> {
    if alerts.is_empty() {
        return Ok(0);
    }

    let n = alerts.len();
    let mut ids = Vec::with_capacity(n);
    let mut market_keys = Vec::with_capacity(n);
    let mut leagues = Vec::with_capacity(n);
    let mut game_ids = Vec::with_capacity(n);
    let mut market_types = Vec::with_capacity(n);
    let mut books = Vec::with_capacity(n);
    let mut old_prices = Vec::with_capacity(n);
    let mut new_prices = Vec::with_capacity(n);
    let mut deltas = Vec::with_capacity(n);
    let mut timestamps = Vec::with_capacity(n);
    for alert in alerts {
        ids.push(alert.id.clone());
        market_keys.push(alert.market_key.clone());
        leagues.push(alert.league.clone());
        game_ids.push(alert.game_id.clone());
        market_types.push(alert.market_type.as_code().to_string());
        books.push(alert.book.clone());
        old_prices.push(alert.old_price);
        new_prices.push(alert.new_price);
        deltas.push(i64::from(alert.delta_cents));
        timestamps.push(alert.ts);
    }

    let result = sqlx::query(INSERT_ALERTS)
        .bind(ids)
        .bind(market_keys)
        .bind(leagues)
        .bind(game_ids)
        .bind(market_types)
        .bind(books)
        .bind(old_prices)
        .bind(new_prices)
        .bind(deltas)
        .bind(timestamps)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// [`OddsStore`] over a Postgres pool
#[derive(Debug, Clone)]
pub struct PgOddsStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgOddsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PriceStore for PgOddsStore {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, i32>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i32)> = execute_with_retry("get_many", &self.retry, move || async move {
            sqlx::query_as::<_, (String, i32)>(SELECT_PRICES)
                .bind(keys)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn upsert_many(&self, entries: &[PriceSnapshot]) -> Result<(), StoreError> {
        let rows = execute_with_retry("upsert_many", &self.retry, move || async move {
            let mut conn = self.pool.acquire().await?;
            upsert_snapshots(&mut conn, entries)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        debug!("Upserted {} price snapshots", rows);
        Ok(())
    }
}

#[async_trait]
impl AlertLog for PgOddsStore {
    async fn append(&self, alerts: &[AlertRecord]) -> Result<(), StoreError> {
        let rows = execute_with_retry("append_alerts", &self.retry, move || async move {
            let mut conn = self.pool.acquire().await?;
            insert_alerts(&mut conn, alerts)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        debug!("Appended {} alerts ({} submitted)", rows, alerts.len());
        Ok(())
    }

    async fn query(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StoreError> {
        let market_type = filter.market_type.map(|m| m.as_code());
        let min_delta = filter.min_delta_cents.map(i64::from);
        let limit = i64::from(filter.effective_limit());

        let rows: Vec<AlertRow> = execute_with_retry("query_alerts", &self.retry, move || async move {
            sqlx::query_as::<_, AlertRow>(QUERY_ALERTS)
                .bind(filter.league.as_deref())
                .bind(filter.game_id.as_deref())
                .bind(market_type)
                .bind(filter.book.as_deref())
                .bind(min_delta)
                .bind(filter.since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        rows.into_iter().map(AlertRecord::try_from).collect()
    }
}

#[async_trait]
impl OddsStore for PgOddsStore {
    async fn commit_cycle(
        &self,
        snapshots: &[PriceSnapshot],
        alerts: &[AlertRecord],
    ) -> Result<(), StoreError> {
        if snapshots.is_empty() && alerts.is_empty() {
            return Ok(());
        }

        let (prices, logged) = execute_with_retry("commit_cycle", &self.retry, move || async move {
            let mut tx = self.pool.begin().await?;
            let prices = upsert_snapshots(&mut tx, snapshots).await?;
            let logged = insert_alerts(&mut tx, alerts).await?;
            tx.commit().await?;
            Ok::<_, StoreError>((prices, logged))
        })
        .await?;

        debug!(
            "Cycle committed: {} snapshots, {} new alerts ({} submitted)",
            prices,
            logged,
            alerts.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(market_type: &str, delta: i64) -> AlertRow {
        AlertRow {
            id: "g1:dk:ML:home:1000:-130".to_string(),
            market_key: "g1:dk:ML:home".to_string(),
            league: "NBA".to_string(),
            game_id: "g1".to_string(),
            market_type: market_type.to_string(),
            book: "dk".to_string(),
            old_price: -110,
            new_price: -130,
            delta_cents: delta,
            ts: DateTime::from_timestamp_millis(1_000).unwrap(),
        }
    }

    #[test]
    fn test_row_converts_to_alert() {
        let alert = AlertRecord::try_from(row("ML", 20)).unwrap();
        assert_eq!(alert.market_type, MarketType::Moneyline);
        assert_eq!(alert.delta_cents, 20);
        assert_eq!(alert.new_price, -130);
    }

    #[test]
    fn test_unknown_market_type_is_corrupt() {
        let err = AlertRecord::try_from(row("PROPS", 20)).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { .. }));
    }

    #[test]
    fn test_negative_delta_is_corrupt() {
        let err = AlertRecord::try_from(row("ML", -5)).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { .. }));
    }

    #[test]
    fn test_delta_beyond_int4_survives() {
        let wide = i64::from(i32::MAX) + 10;
        let alert = AlertRecord::try_from(row("ML", wide)).unwrap();
        assert_eq!(i64::from(alert.delta_cents), wide);

        let widest = AlertRecord::try_from(row("ML", i64::from(u32::MAX))).unwrap();
        assert_eq!(widest.delta_cents, u32::MAX);

        let err = AlertRecord::try_from(row("ML", i64::from(u32::MAX) + 1)).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { .. }));
    }
}
