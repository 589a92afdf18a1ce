//! Table layout for the price store and alert log
//!
//! Statements are idempotent and run one at a time at startup.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

pub const CREATE_LAST_PRICES: &str = r#"
CREATE TABLE IF NOT EXISTS last_prices (
    market_key  TEXT PRIMARY KEY,
    price       INTEGER NOT NULL,
    observed_at TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_ALERTS_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS alerts_log (
    id          TEXT PRIMARY KEY,
    market_key  TEXT NOT NULL,
    league      TEXT NOT NULL,
    game_id     TEXT NOT NULL,
    market_type TEXT NOT NULL,
    book        TEXT NOT NULL,
    old_price   INTEGER NOT NULL,
    new_price   INTEGER NOT NULL,
    delta_cents BIGINT NOT NULL CHECK (delta_cents >= 0),
    ts          TIMESTAMPTZ NOT NULL
)
"#;

/// Tables created with a 32-bit delta column are widened in place
pub const WIDEN_ALERTS_DELTA: &str =
    "ALTER TABLE alerts_log ALTER COLUMN delta_cents TYPE BIGINT";

pub const CREATE_ALERTS_TS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS alerts_log_ts_idx ON alerts_log (ts DESC, id DESC)";

pub const CREATE_ALERTS_LEAGUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS alerts_log_league_ts_idx ON alerts_log (league, ts DESC)";

const STATEMENTS: [(&str, &str); 5] = [
    ("last_prices", CREATE_LAST_PRICES),
    ("alerts_log", CREATE_ALERTS_LOG),
    ("alerts_log.delta_cents", WIDEN_ALERTS_DELTA),
    ("alerts_log_ts_idx", CREATE_ALERTS_TS_INDEX),
    ("alerts_log_league_ts_idx", CREATE_ALERTS_LEAGUE_INDEX),
];

/// Create tables and indexes that do not exist yet
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for (name, statement) in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to ensure {}", name))?;
    }
    info!("Schema ensured: last_prices, alerts_log");
    Ok(())
}
