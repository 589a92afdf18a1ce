mod config;

use crate::config::{Config, MAX_POLL_INTERVAL_SECS};
use anyhow::{Context, Result};
use dotenv::dotenv;
use futures_util::future::join_all;
use oddswatch_core::db::{create_pool, ensure_schema, PgOddsStore};
use oddswatch_core::{IngestResponse, IngestionOrchestrator, OddsApiClient, OddsSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Rounds in a row that failed for every sport before backoff stops growing
const MAX_BACKOFF_EXPONENT: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting odds ingest service...");

    let config = Config::from_env();

    // Upstream
    let client = OddsApiClient::new(config.odds_api.clone());
    if let Err(problem) = client.validate() {
        // Keep running: every cycle reports the problem until it is fixed
        warn!("Odds provider misconfigured: {}", problem);
    }

    // Database
    let pool = create_pool(&config.database_url, &config.db_pool)
        .await
        .context("Failed to connect to database")?;
    ensure_schema(&pool).await?;
    let store = Arc::new(PgOddsStore::new(pool));

    let orchestrator = IngestionOrchestrator::new(Arc::new(client), store)
        .with_timeouts(config.timeouts);

    info!(
        "Ingest loop started: sports={:?}, threshold={}c, interval={}s",
        config.sports,
        config.threshold_cents,
        config.poll_interval.as_secs()
    );

    let mut consecutive_failed_rounds: u32 = 0;
    loop {
        let results = join_all(
            config
                .sports
                .iter()
                .map(|sport| orchestrator.run_cycle(sport.as_deref(), config.threshold_cents)),
        )
        .await;

        let mut failures = 0;
        for (sport, result) in config.sports.iter().zip(results.iter()) {
            if result.is_err() {
                failures += 1;
            }
            let response = IngestResponse::from_result(result);
            match serde_json::to_string(&response) {
                Ok(body) => info!(
                    "Ingest response (sport={}): {}",
                    sport.as_deref().unwrap_or("upcoming"),
                    body
                ),
                Err(e) => error!("Failed to serialize ingest response: {}", e),
            }
        }

        if failures == config.sports.len() {
            consecutive_failed_rounds = consecutive_failed_rounds.saturating_add(1);
        } else {
            consecutive_failed_rounds = 0;
        }

        let delay = next_delay(config.poll_interval, consecutive_failed_rounds);
        if consecutive_failed_rounds > 0 {
            warn!(
                "All cycles failed {} round(s) in a row, next round in {}s",
                consecutive_failed_rounds,
                delay.as_secs()
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping ingest loop");
                break;
            }
        }
    }

    Ok(())
}

/// Poll interval, doubled per consecutive fully-failed round
fn next_delay(poll_interval: Duration, failed_rounds: u32) -> Duration {
    let factor = 2_u32.pow(failed_rounds.min(MAX_BACKOFF_EXPONENT));
    poll_interval
        .saturating_mul(factor)
        .min(Duration::from_secs(MAX_POLL_INTERVAL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_delay_backs_off_and_caps() {
        let base = Duration::from_secs(60);
        assert_eq!(next_delay(base, 0), base);
        assert_eq!(next_delay(base, 1), Duration::from_secs(120));
        assert_eq!(next_delay(base, 3), Duration::from_secs(480));
        assert_eq!(next_delay(base, 10), Duration::from_secs(480));
        assert_eq!(
            next_delay(Duration::from_secs(3000), 2),
            Duration::from_secs(MAX_POLL_INTERVAL_SECS)
        );
    }
}
