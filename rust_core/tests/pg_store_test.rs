//! Postgres store tests
//!
//! These tests require a reachable database and should be run with
//! `DATABASE_URL=... cargo test --ignored`.

use chrono::{DateTime, Utc};
use oddswatch_core::db::{create_pool, ensure_schema, DbPoolConfig, PgOddsStore};
use oddswatch_core::models::{now_ms, AlertFilter, AlertRecord, MarketType, QuoteRecord};
use oddswatch_core::store::{AlertLog, OddsStore, PriceStore};

async fn store() -> PgOddsStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&url, &DbPoolConfig::default())
        .await
        .expect("connect");
    ensure_schema(&pool).await.expect("schema");
    PgOddsStore::new(pool)
}

/// Game id unique to this run so reruns never collide
fn game_id(tag: &str) -> String {
    format!("test-{}-{}", tag, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn quote(game: &str, price: i32, at: DateTime<Utc>) -> QuoteRecord {
    QuoteRecord::new(
        "TEST",
        game,
        MarketType::Moneyline,
        "dk",
        Some("home".to_string()),
        price,
        at,
    )
}

#[tokio::test]
#[ignore] // Requires database
async fn test_commit_cycle_round_trip() {
    let store = store().await;
    let game = game_id("commit");
    let at = now_ms();
    let q = quote(&game, -130, at);
    let alert = AlertRecord::from_move(&q, -110, 20);

    store
        .commit_cycle(&[q.to_snapshot()], &[alert.clone()])
        .await
        .unwrap();
    // Replaying the same cycle is a no-op for the log
    store
        .commit_cycle(&[q.to_snapshot()], &[alert.clone()])
        .await
        .unwrap();

    assert_eq!(store.get(&q.market_key).await.unwrap(), Some(-130));
    let found = store
        .query(&AlertFilter::new().game_id(game.as_str()))
        .await
        .unwrap();
    assert_eq!(found, vec![alert]);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_upsert_last_duplicate_wins() {
    let store = store().await;
    let game = game_id("upsert");
    let at = now_ms();
    let first = quote(&game, -110, at).to_snapshot();
    let second = quote(&game, -125, at).to_snapshot();

    store.upsert_many(&[first.clone(), second]).await.unwrap();

    let prices = store
        .get_many(&[first.market_key.clone(), "missing:key".to_string()])
        .await
        .unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices.get(&first.market_key), Some(&-125));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_query_filters_and_ordering() {
    let store = store().await;
    let game = game_id("query");
    let base = now_ms();
    let alerts: Vec<AlertRecord> = (0..3)
        .map(|i| {
            let at = base + chrono::Duration::milliseconds(i * 10);
            AlertRecord::from_move(&quote(&game, -110 - (i as i32 + 1) * 10, at), -110, (i as u32 + 1) * 10)
        })
        .collect();
    store.append(&alerts).await.unwrap();

    let found = store
        .query(&AlertFilter::new().game_id(game.as_str()))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert!(found[0].ts > found[1].ts && found[1].ts > found[2].ts);

    let big = store
        .query(&AlertFilter::new().game_id(game.as_str()).min_delta_cents(20))
        .await
        .unwrap();
    assert_eq!(big.len(), 2);

    let recent = store
        .query(
            &AlertFilter::new()
                .game_id(game.as_str())
                .since(base + chrono::Duration::milliseconds(15)),
        )
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);

    let none = store
        .query(
            &AlertFilter::new()
                .game_id(game.as_str())
                .market_type(MarketType::Total),
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_wide_delta_round_trips() {
    let store = store().await;
    let game = game_id("wide");
    let q = quote(&game, 2_000_000_000, now_ms());
    let delta = i32::MAX as u32 + 500;
    let alert = AlertRecord::from_move(&q, -2_000_000_000, delta);

    store.append(&[alert.clone()]).await.unwrap();

    let found = store
        .query(&AlertFilter::new().game_id(game.as_str()).min_delta_cents(delta))
        .await
        .unwrap();
    assert_eq!(found, vec![alert]);
    assert_eq!(found[0].delta_cents, delta);

    let above = store
        .query(&AlertFilter::new().game_id(game.as_str()).min_delta_cents(delta + 1))
        .await
        .unwrap();
    assert!(above.is_empty());
}
